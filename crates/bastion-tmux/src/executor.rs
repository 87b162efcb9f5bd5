//! TmuxCommandRunner trait and TmuxExecutor (sync subprocess wrapper).
//! The trait is the seam for mock injection in tests.

use std::sync::Arc;

use crate::error::TmuxError;

/// Trait for executing tmux commands. Enables mock injection for testing.
pub trait TmuxCommandRunner: Send + Sync {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError>;
}

impl<T: TmuxCommandRunner + ?Sized> TmuxCommandRunner for &T {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        (**self).run(args)
    }
}

impl<T: TmuxCommandRunner + ?Sized> TmuxCommandRunner for Arc<T> {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        (**self).run(args)
    }
}

/// stderr fragments tmux prints when the addressed object is absent.
const NOT_FOUND_MARKERS: &[&str] = &[
    "can't find",
    "no server running",
    "session not found",
    "window not found",
    "pane not found",
    "no such file or directory",
];

/// Map a non-zero tmux exit into a typed error.
///
/// tmux exits with 1 for every failure, so the diagnostic text decides
/// between `TargetNotFound` and a generic `CommandFailed`.
pub fn classify_failure(code: i32, stderr: &str) -> TmuxError {
    let stderr = stderr.trim();
    let lower = stderr.to_ascii_lowercase();
    if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        return TmuxError::TargetNotFound(stderr.to_string());
    }
    TmuxError::CommandFailed {
        code,
        stderr: stderr.to_string(),
    }
}

/// Real tmux executor using `std::process::Command`.
///
/// Each call spawns a new `tmux` process, so the executor is `Send + Sync`
/// without interior mutability.
#[derive(Debug, Clone)]
pub struct TmuxExecutor {
    tmux_bin: String,
    socket_path: Option<String>,
    socket_name: Option<String>,
}

impl TmuxExecutor {
    pub fn new(tmux_bin: impl Into<String>) -> Self {
        Self {
            tmux_bin: tmux_bin.into(),
            socket_path: None,
            socket_name: None,
        }
    }

    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = Some(name.into());
        self
    }

    pub fn tmux_bin(&self) -> &str {
        &self.tmux_bin
    }

    /// Global arguments (`-S`/`-L`) that select the tmux server.
    /// Used when handing the terminal to an interactive `tmux attach`.
    pub fn server_args(&self) -> Vec<String> {
        // Socket path takes precedence over socket name
        if let Some(ref path) = self.socket_path {
            vec!["-S".to_string(), path.clone()]
        } else if let Some(ref name) = self.socket_name {
            vec!["-L".to_string(), name.clone()]
        } else {
            Vec::new()
        }
    }
}

impl Default for TmuxExecutor {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl TmuxCommandRunner for TmuxExecutor {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        let mut cmd = std::process::Command::new(&self.tmux_bin);
        cmd.args(self.server_args());
        cmd.args(args);
        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TmuxError::BinaryNotFound
            } else {
                TmuxError::Io(e)
            }
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            tracing::debug!(?args, code, stderr = %stderr.trim(), "tmux command failed");
            return Err(classify_failure(code, &stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
