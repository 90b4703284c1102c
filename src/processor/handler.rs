use snafu::Snafu;

/// Deferred mutation produced by a handler step.
///
/// It runs at most once, and only after the processor confirmed that the
/// step was neither made obsolete nor overtaken by a newer change.
pub type Commit<H> = Box<dyn FnOnce(&mut H)>;

/// The consumer side of a change queue.
///
/// Each `on_*` method does the (possibly slow) work for one event and
/// returns the mutation to apply once that work turned out to still be
/// valid. `list` and `is_dir` are used to enumerate a newly added folder.
pub trait ChangeHandler: Sized {
    async fn on_file_added(&mut self, path: &str) -> Result<Commit<Self>, HandlerError>;
    async fn on_file_changed(&mut self, path: &str) -> Result<Commit<Self>, HandlerError>;
    async fn on_file_removed(&mut self, path: &str) -> Result<Commit<Self>, HandlerError>;
    async fn on_folder_added(&mut self, path: &str) -> Result<Commit<Self>, HandlerError>;
    async fn on_folder_removed(&mut self, path: &str) -> Result<Commit<Self>, HandlerError>;

    /// Names of the entries directly inside the folder at `path`
    async fn list(&mut self, path: &str) -> Result<Vec<String>, HandlerError>;
    async fn is_dir(&mut self, path: &str) -> Result<bool, HandlerError>;
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HandlerError {
    #[snafu(display("Failed to access '{}'", path))]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("Unable to handle '{}': {}", path, reason))]
    Unavailable { path: String, reason: String },
}
