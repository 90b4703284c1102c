use std::{
    hash::Hasher,
    path::{Path, PathBuf},
    time::SystemTime,
};

use compio::fs;
use metrohash::MetroHash64;
use snafu::{ResultExt, Snafu};

use crate::ext::{AsyncTryFrom, BestEffortPathExt};

/// Cheap identity of a file's contents, used as the mirrored leaf value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileFingerprint {
    ModifiedTime(SystemTime),
    Hash(u64),
}

impl AsyncTryFrom<&Path> for FileFingerprint {
    type Error = Fingerprint;

    async fn async_try_from(path: &Path) -> Result<Self, Self::Error> {
        let metadata = path.metadata().context(UnreadableSnafu { path })?;

        if metadata.is_dir() {
            return DirectorySnafu { path }.fail();
        }

        if let Ok(modified_time) = metadata.modified() {
            return Ok(FileFingerprint::ModifiedTime(modified_time));
        }

        // Some platforms and filesystems have no modification time
        let bytes = fs::read(path).await.context(UnreadableSnafu { path })?;
        Ok(FileFingerprint::Hash(content_hash(&bytes)))
    }
}

fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = MetroHash64::default();
    hasher.write(bytes);
    hasher.finish()
}

#[derive(Debug, Snafu)]
pub enum Fingerprint {
    #[snafu(display("Failed to read {}", path.best_effort_path_display()))]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Expected a file but {} is a directory", path.best_effort_path_display()))]
    Directory { path: PathBuf },
}
