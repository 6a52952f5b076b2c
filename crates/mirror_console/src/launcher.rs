use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("no opener available: {0}")]
    Unavailable(String),
    #[error("failed to launch {url}: {reason}")]
    Failed { url: String, reason: String },
}

/// Hands addresses to whatever shows or saves them outside this process.
///
/// Both calls return as soon as the hand-off happened; what the opener or
/// download manager does afterwards is not observable here.
pub trait Launcher: Send + Sync {
    /// Opens `url` in a fresh context that keeps no link back to us.
    fn open_detached(&self, url: &str) -> Result<(), LaunchError>;

    /// Starts a download of `url`, suggesting `file_name` for the saved copy.
    fn save_as(&self, url: &str, file_name: &str) -> Result<(), LaunchError>;
}
