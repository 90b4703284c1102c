use std::path::PathBuf;

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub root: PathBuf,
    /// Overrides the config file otherwise looked up in `root`
    pub config: Option<PathBuf>,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            root: cli.root,
            config: cli.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    #[test]
    fn runtime_config_takes_paths_from_the_cli() {
        let cli = Cli::parse_from(["pathmirror", "some/dir", "--config", "other.yaml"]);

        let config = RuntimeConfig::from(cli);

        assert_eq!(config.root, PathBuf::from("some/dir"));
        assert_eq!(config.config, Some(PathBuf::from("other.yaml")));
    }
}
