mod application;
pub mod data;
mod runtime_config;
mod tree_report;

pub use application::{Application, ApplicationError};
pub use runtime_config::RuntimeConfig;
