use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use snafu::ResultExt;
use tracing::{debug, warn};

use crate::ext::AsyncTryInto;
use crate::filesystem::PathTree;
use crate::mirror::{FileFingerprint, Fingerprint};
use crate::path;
use crate::processor::{ChangeHandler, Commit, HandlerError, IoSnafu};

/// Mirrors a directory on disk into a [`PathTree`] of file fingerprints.
///
/// Subscribe to [`DirectoryMirror::state_mut`] to observe what the
/// processor committed.
#[derive(Debug)]
pub struct DirectoryMirror {
    root: PathBuf,
    ignore: Vec<String>,
    state: PathTree<FileFingerprint>,
    /// Entries read by the last `on_folder_added`, handed out by the next `list` of that folder
    last_listing: Option<(String, Vec<String>)>,
}

impl DirectoryMirror {
    pub fn new(root: impl Into<PathBuf>, ignore: Vec<String>) -> Self {
        Self {
            root: root.into(),
            ignore,
            state: PathTree::new(),
            last_listing: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> &PathTree<FileFingerprint> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PathTree<FileFingerprint> {
        &mut self.state
    }

    fn absolute(&self, path: &str) -> PathBuf {
        path::segments(path).fold(self.root.clone(), |absolute, segment| {
            absolute.join(segment)
        })
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|ignored| ignored == name)
    }

    fn read_names(&self, path: &str) -> Result<Vec<String>, HandlerError> {
        let entries = fs::read_dir(self.absolute(path)).context(IoSnafu { path })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.context(IoSnafu { path })?;
            match entry.file_name().into_string() {
                Ok(name) if self.is_ignored(&name) => {}
                Ok(name) => names.push(name),
                Err(name) => warn!("Skipping non UTF-8 entry {:?} in '{}'", name, path),
            }
        }

        names.sort();
        Ok(names)
    }

    async fn fingerprint(&self, path: &str) -> Result<FileFingerprint, HandlerError> {
        let absolute = self.absolute(path);
        let fingerprint: Result<FileFingerprint, Fingerprint> =
            absolute.as_path().async_try_into().await;
        fingerprint.map_err(|error| match error {
            Fingerprint::Unreadable { source, .. } => HandlerError::Io {
                path: path.to_string(),
                source,
            },
            directory @ Fingerprint::Directory { .. } => HandlerError::Unavailable {
                path: path.to_string(),
                reason: directory.to_string(),
            },
        })
    }

    fn store(&mut self, path: &str, fingerprint: FileFingerprint) {
        if self.state.is_dir(path).unwrap_or(false) {
            // A folder was replaced by a file of the same name
            self.forget(path);
        }
        if let Err(error) = self.state.set(path, fingerprint) {
            warn!("Could not record '{}': {}", path, error);
        }
    }

    fn forget(&mut self, path: &str) {
        if self.state.exists(path) {
            if let Err(error) = self.state.remove(path) {
                warn!("Could not forget '{}': {}", path, error);
            }
        }
    }

    /// Creates the folder if needed and drops children that are gone on disk.
    fn reconcile_folder(&mut self, path: &str, on_disk: &HashSet<String>) {
        if matches!(self.state.is_dir(path), Ok(false)) {
            self.forget(path);
        }
        if !self.state.exists(path) {
            if let Err(error) = self.state.mkdir(path) {
                warn!("Could not record folder '{}': {}", path, error);
                return;
            }
        }

        let stale = match self.state.list(path) {
            Ok(names) => names
                .filter(|name| !on_disk.contains(*name))
                .map(|name| path::join(path, name))
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        for child in stale {
            debug!("'{}' no longer exists, forgetting it", child);
            self.forget(&child);
        }
    }
}

impl ChangeHandler for DirectoryMirror {
    async fn on_file_added(&mut self, path: &str) -> Result<Commit<Self>, HandlerError> {
        let fingerprint = self.fingerprint(path).await?;
        let path = path.to_string();
        Ok(Box::new(move |mirror: &mut Self| {
            mirror.store(&path, fingerprint)
        }))
    }

    async fn on_file_changed(&mut self, path: &str) -> Result<Commit<Self>, HandlerError> {
        self.on_file_added(path).await
    }

    async fn on_file_removed(&mut self, path: &str) -> Result<Commit<Self>, HandlerError> {
        let path = path.to_string();
        Ok(Box::new(move |mirror: &mut Self| mirror.forget(&path)))
    }

    async fn on_folder_added(&mut self, path: &str) -> Result<Commit<Self>, HandlerError> {
        let names = self.read_names(path)?;
        let on_disk = names.iter().cloned().collect::<HashSet<_>>();
        self.last_listing = Some((path.to_string(), names));
        let path = path.to_string();
        Ok(Box::new(move |mirror: &mut Self| {
            mirror.reconcile_folder(&path, &on_disk)
        }))
    }

    async fn on_folder_removed(&mut self, path: &str) -> Result<Commit<Self>, HandlerError> {
        self.on_file_removed(path).await
    }

    async fn list(&mut self, path: &str) -> Result<Vec<String>, HandlerError> {
        match self.last_listing.take() {
            Some((listed, names)) if listed == path => Ok(names),
            _ => self.read_names(path),
        }
    }

    async fn is_dir(&mut self, path: &str) -> Result<bool, HandlerError> {
        let metadata = fs::metadata(self.absolute(path)).context(IoSnafu { path })?;
        Ok(metadata.is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::StreamExt;
    use futures::executor::block_on;
    use tempfile::TempDir;

    use crate::changes::ChangeEvent;
    use crate::processor::ChangeProcessor;
    use crate::queue::PathChangeQueue;

    fn write(root: &Path, relative: &str, content: &str) {
        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(target, content).expect("Failed to write file");
    }

    fn sample_directory() -> TempDir {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        write(temp_dir.path(), "readme.md", "# readme");
        write(temp_dir.path(), "src/lib.rs", "pub mod a;");
        write(temp_dir.path(), "src/a.rs", "");
        write(temp_dir.path(), ".git/HEAD", "ref: refs/heads/main");
        temp_dir
    }

    async fn mirror_once(mirror: &mut DirectoryMirror) -> usize {
        let queue = PathChangeQueue::new(|| {});
        queue.push(ChangeEvent::add_dir(""));
        ChangeProcessor::new(Duration::ZERO)
            .process_all(&queue, mirror)
            .await
            .expect("Mirroring failed")
    }

    #[compio::test]
    async fn full_pass_mirrors_the_directory() {
        let temp_dir = sample_directory();
        let mut mirror = DirectoryMirror::new(temp_dir.path(), vec![".git".into()]);

        let processed = mirror_once(&mut mirror).await;

        assert_eq!(processed, 5);
        assert_eq!(
            mirror.state().list_all().collect::<Vec<_>>(),
            vec!["src", "src/a.rs", "src/lib.rs", "readme.md"]
        );
        assert!(mirror.state().get("readme.md").is_ok());
        assert!(!mirror.state().exists(".git"));
    }

    #[compio::test]
    async fn resync_forgets_deleted_entries() {
        let temp_dir = sample_directory();
        let mut mirror = DirectoryMirror::new(temp_dir.path(), vec![".git".into()]);
        mirror_once(&mut mirror).await;

        fs::remove_file(temp_dir.path().join("readme.md")).unwrap();
        fs::remove_dir_all(temp_dir.path().join("src")).unwrap();
        write(temp_dir.path(), "new.txt", "fresh");
        mirror_once(&mut mirror).await;

        assert_eq!(
            mirror.state().list_all().collect::<Vec<_>>(),
            vec!["new.txt"]
        );
    }

    #[compio::test]
    async fn committed_changes_are_published() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "docs/guide.md", "guide");
        let mut mirror = DirectoryMirror::new(temp_dir.path(), Vec::new());
        let subscription = mirror.state_mut().on_change();

        mirror_once(&mut mirror).await;
        mirror.state_mut().unsubscribe(subscription.id());
        let events = block_on(subscription.collect::<Vec<_>>());

        assert_eq!(
            events,
            vec![
                ChangeEvent::add_dir("docs"),
                ChangeEvent::add("docs/guide.md")
            ]
        );
    }

    #[compio::test]
    async fn removal_is_applied_on_commit_only() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.txt", "a");
        let mut mirror = DirectoryMirror::new(temp_dir.path(), Vec::new());
        mirror_once(&mut mirror).await;

        let commit = mirror.on_file_removed("a.txt").await.unwrap();
        assert!(mirror.state().exists("a.txt"));

        commit(&mut mirror);
        assert!(!mirror.state().exists("a.txt"));
    }

    #[compio::test]
    async fn fingerprinting_a_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut mirror = DirectoryMirror::new(temp_dir.path(), Vec::new());

        let result = mirror.on_file_added("missing.txt").await;

        assert!(matches!(result, Err(HandlerError::Io { path, .. }) if path == "missing.txt"));
    }

    #[compio::test]
    async fn fingerprinting_a_folder_fails() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("folder")).unwrap();
        let mut mirror = DirectoryMirror::new(temp_dir.path(), Vec::new());

        let result = mirror.on_file_changed("folder").await;

        assert!(matches!(result, Err(HandlerError::Unavailable { .. })));
    }

    #[compio::test]
    async fn listing_is_sorted_and_skips_ignored_names() {
        let temp_dir = sample_directory();
        write(temp_dir.path(), "target/debug/app", "");
        let mut mirror =
            DirectoryMirror::new(temp_dir.path(), vec![".git".into(), "target".into()]);

        assert_eq!(mirror.list("").await.unwrap(), vec!["readme.md", "src"]);
        assert_eq!(mirror.list("src").await.unwrap(), vec!["a.rs", "lib.rs"]);
        assert!(mirror.is_dir("src").await.unwrap());
        assert!(!mirror.is_dir("src/a.rs").await.unwrap());
        assert!(mirror.is_dir("nowhere").await.is_err());
    }

    #[compio::test]
    async fn enumeration_reuses_the_reconciled_listing() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "first.txt", "");
        let mut mirror = DirectoryMirror::new(temp_dir.path(), Vec::new());

        let _commit = mirror.on_folder_added("").await.unwrap();
        write(temp_dir.path(), "late.txt", "");

        assert_eq!(mirror.list("").await.unwrap(), vec!["first.txt"]);
        assert_eq!(mirror.list("").await.unwrap(), vec!["first.txt", "late.txt"]);
    }

    #[compio::test]
    async fn listing_of_another_folder_is_read_fresh() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a/one.txt", "");
        write(temp_dir.path(), "b/two.txt", "");
        let mut mirror = DirectoryMirror::new(temp_dir.path(), Vec::new());

        let _commit = mirror.on_folder_added("a").await.unwrap();

        assert_eq!(mirror.list("b").await.unwrap(), vec!["two.txt"]);
    }

    #[compio::test]
    async fn file_replacing_a_folder_is_recorded() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "thing/inner.txt", "");
        let mut mirror = DirectoryMirror::new(temp_dir.path(), Vec::new());
        mirror_once(&mut mirror).await;

        fs::remove_dir_all(temp_dir.path().join("thing")).unwrap();
        write(temp_dir.path(), "thing", "now a file");
        let commit = mirror.on_file_added("thing").await.unwrap();
        commit(&mut mirror);

        assert_eq!(mirror.state().is_dir("thing"), Ok(false));
        assert!(!mirror.state().exists("thing/inner.txt"));
    }
}
