//! A [`ChangeHandler`](crate::processor::ChangeHandler) that keeps an
//! in-memory copy of a directory tree on disk.

mod directory_mirror;
mod file_fingerprint;

pub use directory_mirror::DirectoryMirror;
pub use file_fingerprint::{FileFingerprint, Fingerprint};
