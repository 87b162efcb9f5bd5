//! bastion-orchestrator: starts agents in their panes, turns inbox changes
//! into wake-ups and escalates against agents that leave mail unread.

pub mod config;
pub mod error;
pub mod escalation;
pub mod orchestrator;
pub mod waker;

pub use config::{
    CONFIG_FILE_NAME, ConfigError, ENVOY, EscalationConfig, MARSHALL, OrchestratorConfig,
    RoleRoute, SPECIALIST,
};
pub use error::OrchestratorError;
pub use escalation::{
    EscalationPhase, EscalationPolicy, EscalationSupervisor, LastEscalation, TimeoutLadder,
};
pub use orchestrator::{BASTION_BIN, Orchestrator, recipient_for};
pub use waker::AgentWaker;
