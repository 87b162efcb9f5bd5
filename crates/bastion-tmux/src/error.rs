//! Error types for the tmux boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("tmux binary not found")]
    BinaryNotFound,

    /// tmux reported that the addressed session, window or pane does not exist.
    #[error("tmux target not found: {0}")]
    TargetNotFound(String),

    #[error("tmux command failed: exit code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("session already exists: {0}")]
    SessionExists(String),

    #[error("tmux io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TmuxError {
    /// True when the failure means "nothing there" rather than a broken tool.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TargetNotFound(_))
    }
}
