use derive_more::Display;

use crate::path;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ChangeKind {
    Add,
    AddDir,
    Change,
    Unlink,
    UnlinkDir,
}

impl ChangeKind {
    /// `AddDir` and `UnlinkDir` describe whole subtrees.
    pub fn is_directory(self) -> bool {
        matches!(self, ChangeKind::AddDir | ChangeKind::UnlinkDir)
    }

    /// Kinds that typically arrive in bursts while a file is being written.
    pub fn is_fast_mutating(self) -> bool {
        matches!(self, ChangeKind::Add | ChangeKind::Change)
    }
}

/// A single raw notification about a path.
///
/// The path is normalized on construction, so two events for `"./a//b"`
/// and `"a/b"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{kind}({path:?})")]
pub struct ChangeEvent {
    kind: ChangeKind,
    path: String,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl AsRef<str>) -> Self {
        Self {
            kind,
            path: path::normalize(path.as_ref()),
        }
    }

    pub fn add(path: impl AsRef<str>) -> Self {
        Self::new(ChangeKind::Add, path)
    }

    pub fn add_dir(path: impl AsRef<str>) -> Self {
        Self::new(ChangeKind::AddDir, path)
    }

    pub fn change(path: impl AsRef<str>) -> Self {
        Self::new(ChangeKind::Change, path)
    }

    pub fn unlink(path: impl AsRef<str>) -> Self {
        Self::new(ChangeKind::Unlink, path)
    }

    pub fn unlink_dir(path: impl AsRef<str>) -> Self {
        Self::new(ChangeKind::UnlinkDir, path)
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
