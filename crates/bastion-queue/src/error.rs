//! Error types for the on-disk queue and the inbox watcher.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("message {id} not found in mailbox {recipient}")]
    MessageNotFound { recipient: String, id: String },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// A stored file exists but does not parse.
    #[error("corrupt record at {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Names become file names, so anything that could leave the queue
    /// directory is refused.
    #[error("invalid {kind} name: {name:?}")]
    InvalidName { kind: &'static str, name: String },

    #[error("failed to serialize record: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("queue io error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueueError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::MessageNotFound { .. } | Self::CommandNotFound(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("watcher already started")]
    AlreadyStarted,

    #[error("watcher is stopped")]
    Stopped,

    #[error("watcher must be started inside a tokio runtime")]
    NoRuntime,

    #[error("filesystem notification error: {0}")]
    Notify(#[from] notify::Error),
}
