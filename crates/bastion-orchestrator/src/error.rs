//! Orchestrator error type.

use bastion_queue::{QueueError, WatchError};
use bastion_tmux::TmuxError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// One agent failed to launch; startup stopped there.
    #[error("failed to start {role}: {source}")]
    AgentStart {
        role: String,
        #[source]
        source: TmuxError,
    },

    #[error("failed to wake {role}: {source}")]
    Wake {
        role: String,
        #[source]
        source: TmuxError,
    },

    #[error(transparent)]
    Tmux(#[from] TmuxError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A blocking tmux task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
