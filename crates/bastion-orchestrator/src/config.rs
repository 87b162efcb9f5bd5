//! Orchestrator configuration, loaded from `<project_root>/bastion.toml`.
//!
//! Every field has a default, so a missing file (or an empty one) yields the
//! standard layout: envoy and marshall in the primary window, the inbox
//! watcher between them, and the specialists tiled in their own window.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bastion_tmux::{DEFAULT_SESSION_NAME, PRIMARY_PANE_COUNT, PaneLabel, SessionLayout};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "bastion.toml";

/// Coordinator role: talks to the human.
pub const ENVOY: &str = "envoy";
/// Dispatcher role: turns commands into specialist work.
pub const MARSHALL: &str = "marshall";
/// Worker role; every worker pane runs one.
pub const SPECIALIST: &str = "specialist";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which pane a role lives in. `target` is `window.pane-index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRoute {
    pub role: String,
    pub target: String,
}

impl RoleRoute {
    pub fn new(role: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EscalationConfig {
    /// Time a recipient may leave mail pending before each escalation step.
    pub step_secs: u64,
    /// How often the supervisor re-reads mailboxes.
    pub poll_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            step_secs: 30,
            poll_secs: 5,
        }
    }
}

impl EscalationConfig {
    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Shared project root. Not read from the file; set by the loader.
    #[serde(skip)]
    pub project_root: PathBuf,
    /// Per-role working directories; relative paths resolve against the root.
    pub agents_dir: PathBuf,
    /// Queue root holding `inbox/`, `tasks/` and `archive/`.
    pub queue_dir: PathBuf,
    pub session_name: String,
    pub primary_window: String,
    pub worker_window: String,
    /// Pane that runs `bastion watch`.
    pub watcher_target: String,
    pub worker_count: usize,
    /// Assistant executable launched in every agent pane.
    pub agent_command: String,
    /// Literal text typed to wake an agent. Empty sends a bare Enter.
    pub wake_token: String,
    /// Text typed at escalation phase 3 to reset the agent's session.
    pub reset_command: String,
    pub routes: Vec<RoleRoute>,
    /// Repeated inbox events for one recipient within this window wake once.
    pub wake_debounce_ms: u64,
    pub escalation: EscalationConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            agents_dir: PathBuf::from("agents"),
            queue_dir: PathBuf::from("queue"),
            session_name: DEFAULT_SESSION_NAME.to_string(),
            primary_window: "main".to_string(),
            worker_window: "specialists".to_string(),
            watcher_target: "main.1".to_string(),
            worker_count: 4,
            agent_command: "claude".to_string(),
            wake_token: "inbox".to_string(),
            reset_command: "/clear".to_string(),
            routes: vec![RoleRoute::new(ENVOY, "main.0"), RoleRoute::new(MARSHALL, "main.2")],
            wake_debounce_ms: 300,
            escalation: EscalationConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Defaults rooted at `project_root`.
    pub fn for_root(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    /// Read `<project_root>/bastion.toml` if present, else use defaults.
    /// The result is validated.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = project_root.as_ref();
        let path = root.join(CONFIG_FILE_NAME);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let parsed: Self =
                    toml::from_str(&content).map_err(|source| ConfigError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                tracing::debug!(path = %path.display(), "loaded config");
                parsed
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        config.project_root = root.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.session_name.is_empty() || self.session_name.contains([':', '.']) {
            return invalid(format!(
                "session_name {:?} must be non-empty without ':' or '.'",
                self.session_name
            ));
        }
        for (field, window) in [
            ("primary_window", &self.primary_window),
            ("worker_window", &self.worker_window),
        ] {
            if window.is_empty() || window.contains([':', '.']) {
                return invalid(format!("{field} {window:?} must be non-empty without ':' or '.'"));
            }
        }
        if self.primary_window == self.worker_window {
            return invalid("primary_window and worker_window must differ".to_string());
        }
        if self.agent_command.trim().is_empty() {
            return invalid("agent_command must not be empty".to_string());
        }
        if self.escalation.step_secs == 0 || self.escalation.poll_secs == 0 {
            return invalid("escalation step_secs and poll_secs must be positive".to_string());
        }

        self.check_primary_target("watcher_target", &self.watcher_target)?;
        let mut roles = HashSet::new();
        let mut targets = HashSet::new();
        targets.insert(self.watcher_target.as_str());
        for route in &self.routes {
            if route.role.is_empty() || route.role.contains(['/', '\\', '.']) {
                return invalid(format!("route role {:?} is not a valid mailbox name", route.role));
            }
            if route.role == SPECIALIST {
                return invalid(format!("role {SPECIALIST:?} is reserved for worker panes"));
            }
            self.check_primary_target(&format!("route {}", route.role), &route.target)?;
            if !roles.insert(route.role.as_str()) {
                return invalid(format!("role {:?} is routed twice", route.role));
            }
            if !targets.insert(route.target.as_str()) {
                return invalid(format!("target {:?} is assigned twice", route.target));
            }
        }
        Ok(())
    }

    /// Routed and watcher panes live in the primary window and must exist
    /// right after setup; worker panes are sized later by the grid.
    fn check_primary_target(&self, what: &str, target: &str) -> Result<(), ConfigError> {
        let Some((window, pane)) = target.rsplit_once('.') else {
            return Err(ConfigError::Invalid(format!(
                "{what} target {target:?} must look like window.pane-index"
            )));
        };
        let Ok(pane) = pane.parse::<usize>() else {
            return Err(ConfigError::Invalid(format!(
                "{what} target {target:?} must look like window.pane-index"
            )));
        };
        if window != self.primary_window {
            return Err(ConfigError::Invalid(format!(
                "{what} target {target:?} must be in the primary window {:?}",
                self.primary_window
            )));
        }
        if pane >= PRIMARY_PANE_COUNT {
            return Err(ConfigError::Invalid(format!(
                "{what} target {target:?} names a pane the primary window does not have \
                 (panes 0-{})",
                PRIMARY_PANE_COUNT - 1
            )));
        }
        Ok(())
    }

    pub fn agents_path(&self) -> PathBuf {
        self.project_root.join(&self.agents_dir)
    }

    pub fn queue_path(&self) -> PathBuf {
        self.project_root.join(&self.queue_dir)
    }

    /// Working directory for `role`.
    pub fn agent_dir(&self, role: &str) -> PathBuf {
        self.agents_path().join(role)
    }

    pub fn route_for(&self, role: &str) -> Option<&RoleRoute> {
        self.routes.iter().find(|r| r.role == role)
    }

    /// `worker_window.i` for every worker, in launch order.
    pub fn worker_targets(&self) -> Vec<String> {
        (0..self.worker_count)
            .map(|i| format!("{}.{i}", self.worker_window))
            .collect()
    }

    pub fn wake_debounce(&self) -> Duration {
        Duration::from_millis(self.wake_debounce_ms)
    }

    /// Topology for `SessionManager::setup_session`. Only panes that exist
    /// right after setup are labelled; worker labels follow the grid.
    pub fn session_layout(&self) -> SessionLayout {
        let mut labels: Vec<PaneLabel> = self
            .routes
            .iter()
            .map(|r| PaneLabel {
                target: r.target.clone(),
                label: r.role.clone(),
            })
            .collect();
        labels.push(PaneLabel {
            target: self.watcher_target.clone(),
            label: "watcher".to_string(),
        });
        SessionLayout {
            primary_window: self.primary_window.clone(),
            worker_window: self.worker_window.clone(),
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = OrchestratorConfig::default();
        cfg.validate().expect("valid");
        assert_eq!(cfg.route_for(ENVOY).map(|r| r.target.as_str()), Some("main.0"));
        assert_eq!(cfg.route_for(MARSHALL).map(|r| r.target.as_str()), Some("main.2"));
        assert_eq!(cfg.worker_targets(), vec![
            "specialists.0",
            "specialists.1",
            "specialists.2",
            "specialists.3"
        ]);
    }

    #[test]
    fn missing_file_yields_defaults_rooted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = OrchestratorConfig::load(dir.path()).expect("load");
        assert_eq!(cfg.project_root, dir.path());
        assert_eq!(cfg.queue_path(), dir.path().join("queue"));
        assert_eq!(cfg.agent_dir(ENVOY), dir.path().join("agents/envoy"));
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
worker_count = 2
wake_token = ""
queue_dir = "/var/bastion/queue"

[[routes]]
role = "envoy"
target = "main.0"

[escalation]
step_secs = 10
"#,
        )
        .expect("write");

        let cfg = OrchestratorConfig::load(dir.path()).expect("load");
        assert_eq!(cfg.worker_count, 2);
        assert_eq!(cfg.wake_token, "");
        assert_eq!(cfg.routes.len(), 1);
        assert_eq!(cfg.escalation.step_secs, 10);
        assert_eq!(cfg.escalation.poll_secs, 5);
        assert_eq!(cfg.session_name, "bastion");
        assert_eq!(cfg.queue_path(), PathBuf::from("/var/bastion/queue"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "worker_count = \"many\"").expect("write");
        assert!(matches!(
            OrchestratorConfig::load(dir.path()),
            Err(ConfigError::Parse { .. })
        ));

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "unknown_key = 1").expect("write");
        assert!(OrchestratorConfig::load(dir.path()).is_err());
    }

    #[test]
    fn validation_rejects_bad_routes() {
        let mut cfg = OrchestratorConfig::default();
        cfg.routes.push(RoleRoute::new("auditor", "main.0"));
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = OrchestratorConfig::default();
        cfg.routes.push(RoleRoute::new(ENVOY, "main.3"));
        assert!(cfg.validate().is_err());

        let mut cfg = OrchestratorConfig::default();
        cfg.routes[0].target = "main".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = OrchestratorConfig::default();
        cfg.routes.push(RoleRoute::new("../etc", "main.3"));
        assert!(cfg.validate().is_err());

        let mut cfg = OrchestratorConfig::default();
        cfg.worker_window = cfg.primary_window.clone();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_targets_setup_does_not_build() {
        let mut cfg = OrchestratorConfig::default();
        cfg.routes[1].target = "main.5".to_string();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("main.5"), "{err}");

        let mut cfg = OrchestratorConfig::default();
        cfg.routes[1].target = "specialists.0".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = OrchestratorConfig::default();
        cfg.watcher_target = "other.1".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = OrchestratorConfig::default();
        cfg.primary_window = "lead".to_string();
        cfg.watcher_target = "lead.1".to_string();
        cfg.routes = vec![RoleRoute::new(ENVOY, "lead.0"), RoleRoute::new(MARSHALL, "lead.2")];
        cfg.validate().expect("renamed primary window");
    }

    #[test]
    fn layout_labels_routed_panes_and_watcher() {
        let layout = OrchestratorConfig::default().session_layout();
        assert_eq!(layout.primary_window, "main");
        assert_eq!(layout.worker_window, "specialists");
        let labels: Vec<(&str, &str)> = layout
            .labels
            .iter()
            .map(|l| (l.target.as_str(), l.label.as_str()))
            .collect();
        assert_eq!(labels, vec![
            ("main.0", "envoy"),
            ("main.2", "marshall"),
            ("main.1", "watcher")
        ]);
    }
}
