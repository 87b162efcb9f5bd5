//! Deterministic session topology.
//!
//! ```text
//! primary window            worker window
//! +---------+---------+     +-----+-----+
//! |         |  .1     |     | .0  | .1  |
//! |   .0    +---------+     +-----+-----+
//! |         |  .2     |     | .2  | ... |   (tiled, one pane per worker)
//! +---------+---------+     +-----+-----+
//! ```

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;
use crate::session::SessionManager;

/// Panes in the primary window once `setup_session` returns.
pub const PRIMARY_PANE_COUNT: usize = 3;

/// A label to attach to one pane after the topology is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneLabel {
    /// `window.pane-index` inside the session.
    pub target: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    pub primary_window: String,
    pub worker_window: String,
    pub labels: Vec<PaneLabel>,
}

impl Default for SessionLayout {
    fn default() -> Self {
        Self {
            primary_window: "main".to_string(),
            worker_window: "specialists".to_string(),
            labels: Vec::new(),
        }
    }
}

impl SessionLayout {
    /// Window names in creation order.
    pub fn windows(&self) -> Vec<&str> {
        vec![self.primary_window.as_str(), self.worker_window.as_str()]
    }
}

impl<R: TmuxCommandRunner> SessionManager<R> {
    /// Destroy any live session with this name, then build the layout and
    /// leave the primary pane (`<primary>.0`) selected.
    pub fn setup_session(&self, layout: &SessionLayout) -> Result<(), TmuxError> {
        if self.session_exists()? {
            tracing::info!(session = %self.session_name(), "replacing existing session");
            self.kill_session()?;
        }

        let primary = layout.primary_window.as_str();
        self.create_session(primary)?;

        // Left | right, then split the right column top/bottom.
        self.split_pane_horizontal(primary)?;
        self.select_pane(&format!("{primary}.1"))?;
        self.split_pane_vertical(primary)?;

        self.create_window(&layout.worker_window)?;

        if !layout.labels.is_empty() {
            for window in layout.windows() {
                self.enable_pane_borders(window)?;
            }
            for label in &layout.labels {
                self.set_pane_title(&label.target, &label.label)?;
            }
        }

        self.select_pane(&format!("{primary}.0"))?;
        self.select_window(primary)?;
        Ok(())
    }

    /// Grow `window` to `count` panes and tile them. The window's first pane
    /// already exists, so `count <= 1` changes nothing.
    pub fn setup_worker_grid(&self, window: &str, count: usize) -> Result<(), TmuxError> {
        if count <= 1 {
            return Ok(());
        }
        for _ in 1..count {
            self.split_pane_horizontal(window)?;
            // Re-tile after every split so tmux never runs out of room.
            self.set_tiled_layout(window)?;
        }
        Ok(())
    }
}
