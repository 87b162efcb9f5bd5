//! bastion-tmux: tmux backend IO boundary.
//! Provides subprocess execution, session/window/pane control and the
//! deterministic session layout. No business logic, pure IO boundary.

pub mod error;
pub mod executor;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod layout;
pub mod session;

pub use error::TmuxError;
pub use executor::{TmuxCommandRunner, TmuxExecutor, classify_failure};
#[cfg(any(test, feature = "test-util"))]
pub use fake::{FakeTmux, SentKeys};
pub use layout::{PRIMARY_PANE_COUNT, PaneLabel, SessionLayout};
pub use session::{DEFAULT_SESSION_NAME, PANE_LABEL_OPTION, SessionManager};
