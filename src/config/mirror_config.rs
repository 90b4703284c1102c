use std::{
    borrow::Cow,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::debug;

use crate::{ext::BestEffortPathExt, processor::DEFAULT_RETRY_BACKOFF, queue::DEFAULT_GRACE_PERIOD};

const CONFIG_FILE_NAME: &str = ".pathmirror.yaml";

pub fn get_config_file_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Per-directory settings of a mirroring run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    ignore: Vec<String>,
    retry_backoff: Duration,
    grace_period: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl MirrorConfig {
    /// Reads the config file of `root`, falling back to the defaults when
    /// there is none.
    pub async fn read(root: &Path) -> Result<Self, MirrorConfigError> {
        match Self::from_path(get_config_file_path(root)).await {
            Err(MirrorConfigError::ReadError { source, .. })
                if source.kind() == ErrorKind::NotFound =>
            {
                debug!("No config file in {}, using defaults", root.best_effort_path_display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub async fn from_path(path: PathBuf) -> Result<Self, MirrorConfigError> {
        debug!("Reading config file: {}", path.best_effort_path_display());
        let bytes = fs::read(&path).await.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        debug!("Successfully read config file: {} bytes", bytes.len());

        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        contents.as_str().try_into()
    }

    pub fn ignore(&self) -> &[String] {
        &self.ignore
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    fn parse_ignore(top_level: &LinkedHashMap<Yaml, Yaml>) -> Result<Vec<String>, MirrorConfigError> {
        let Some(ignore) = top_level.get(&key("ignore")) else {
            return Ok(Vec::new());
        };

        ignore
            .as_sequence()
            .context(IgnoreNotListSnafu)?
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .context(IgnoreEntryNotStringSnafu)
            })
            .collect()
    }

    fn parse_duration(
        top_level: &LinkedHashMap<Yaml, Yaml>,
        name: &'static str,
        default: Duration,
    ) -> Result<Duration, MirrorConfigError> {
        let Some(value) = top_level.get(&key(name)) else {
            return Ok(default);
        };

        let millis = value
            .as_integer()
            .and_then(|millis| u64::try_from(millis).ok())
            .context(InvalidDurationSnafu { key: name })?;
        Ok(Duration::from_millis(millis))
    }
}

fn key(name: &str) -> Yaml<'_> {
    Yaml::Value(Scalar::String(Cow::Borrowed(name)))
}

impl TryFrom<&str> for MirrorConfig {
    type Error = MirrorConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let Some(document) = documents.first() else {
            return Ok(Self::default());
        };

        let top_level = document.as_mapping().context(TopLevelNotMapSnafu)?;

        Ok(MirrorConfig {
            ignore: Self::parse_ignore(top_level)?,
            retry_backoff: Self::parse_duration(top_level, "retryBackoffMs", DEFAULT_RETRY_BACKOFF)?,
            grace_period: Self::parse_duration(top_level, "gracePeriodMs", DEFAULT_GRACE_PERIOD)?,
        })
    }
}

#[derive(Debug, Snafu)]
pub enum MirrorConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("The config file {} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("'ignore' should be a list"))]
    IgnoreNotList,
    #[snafu(display("Entries of 'ignore' should be strings"))]
    IgnoreEntryNotString,
    #[snafu(display("'{}' should be a non-negative number of milliseconds", key))]
    InvalidDuration { key: &'static str },
}
