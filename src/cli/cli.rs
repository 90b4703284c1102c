use std::path::PathBuf;

use clap::Parser;

use crate::application::data::LogLevel;

/// Mirror a directory tree once and print what was picked up.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// The directory to mirror
    #[clap(default_value = ".")]
    pub root: PathBuf,

    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// Config file to use instead of `.pathmirror.yaml` in the root
    #[clap(long, short)]
    pub config: Option<PathBuf>,
}
