mod mirror_config;

pub use mirror_config::{MirrorConfig, MirrorConfigError, get_config_file_path};
