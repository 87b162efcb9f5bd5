//! Orchestrator: composes the pane controller, the mailboxes and the inbox
//! watcher into one multi-agent session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bastion_queue::{InboxWatcher, MailboxStore, WatchStreams, is_record_file};
use bastion_tmux::{SessionManager, TmuxCommandRunner, TmuxError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::{OrchestratorConfig, SPECIALIST};
use crate::error::OrchestratorError;
use crate::escalation::{EscalationPhase, EscalationSupervisor, TimeoutLadder};
use crate::waker::AgentWaker;

/// Name of the CLI binary started in the watcher pane.
pub const BASTION_BIN: &str = "bastion";

struct RunningWatcher {
    watcher: InboxWatcher,
    consumer: JoinHandle<()>,
}

pub struct Orchestrator<R> {
    config: OrchestratorConfig,
    session: Arc<SessionManager<R>>,
    waker: Arc<AgentWaker<R>>,
    watcher: Mutex<Option<RunningWatcher>>,
}

impl<R: TmuxCommandRunner + 'static> Orchestrator<R> {
    pub fn new(runner: R, config: OrchestratorConfig) -> Self {
        let session = Arc::new(SessionManager::new(runner, config.session_name.clone()));
        let waker = Arc::new(AgentWaker::new(
            Arc::clone(&session),
            config.wake_token.clone(),
            config.reset_command.clone(),
        ));
        Self {
            config,
            session,
            waker,
            watcher: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionManager<R> {
        &self.session
    }

    pub fn waker(&self) -> Arc<AgentWaker<R>> {
        Arc::clone(&self.waker)
    }

    /// Kill any previous session and build the configured topology.
    pub fn setup_session(&self) -> Result<(), OrchestratorError> {
        self.session.setup_session(&self.config.session_layout())?;
        tracing::info!(session = %self.session.session_name(), "session ready");
        Ok(())
    }

    /// Size the worker grid, then launch every routed role followed by the
    /// workers. The first agent that fails to launch aborts the rest.
    pub fn start_all(&self) -> Result<(), OrchestratorError> {
        let worker_window = &self.config.worker_window;
        self.session
            .setup_worker_grid(worker_window, self.config.worker_count)?;

        for route in &self.config.routes {
            self.start_agent(&route.role, &route.target)
                .map_err(|source| OrchestratorError::AgentStart {
                    role: route.role.clone(),
                    source,
                })?;
        }

        for (i, target) in self.config.worker_targets().iter().enumerate() {
            let name = format!("{SPECIALIST}-{}", i + 1);
            self.session
                .set_pane_title(target, &name)
                .and_then(|()| self.start_agent(SPECIALIST, target))
                .map_err(|source| OrchestratorError::AgentStart { role: name, source })?;
        }

        tracing::info!(
            routed = self.config.routes.len(),
            workers = self.config.worker_count,
            "all agents started"
        );
        Ok(())
    }

    /// Launch `role`'s assistant in `target`, working in the role's own
    /// directory with the project root granted.
    pub fn start_agent(&self, role: &str, target: &str) -> Result<(), TmuxError> {
        let command = self.launch_command(role);
        self.session.send_keys(target, &command, true)?;
        tracing::info!(role, target, "agent launched");
        Ok(())
    }

    /// Shell line that starts `role`.
    pub fn launch_command(&self, role: &str) -> String {
        format!(
            "cd {} && {} --add-dir {}",
            shell_quote(&self.config.agent_dir(role).to_string_lossy()),
            self.config.agent_command,
            shell_quote(&self.config.project_root.to_string_lossy()),
        )
    }

    pub fn wakeup(&self, role: &str, target: &str) -> Result<(), TmuxError> {
        self.waker.wakeup(role, target)
    }

    /// Wake every routed role, stopping at the first failure.
    pub fn wakeup_all(&self) -> Result<(), OrchestratorError> {
        for route in &self.config.routes {
            self.waker
                .wakeup(&route.role, &route.target)
                .map_err(|source| OrchestratorError::Wake {
                    role: route.role.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Execute escalation `level` (1-3) against `target`; any other level
    /// behaves like 1.
    pub fn wakeup_with_escalation(&self, role: &str, target: &str, level: u8) -> Result<(), TmuxError> {
        self.waker
            .wakeup_with_escalation(role, target, EscalationPhase::from_level(level))
    }

    /// How panes should invoke the CLI: `bastion` when it is on `PATH`,
    /// else the binary at the project root.
    pub fn bastion_command(&self) -> PathBuf {
        resolve_bastion_command(&self.config.project_root)
    }

    /// Start `bastion watch` in the watcher pane.
    pub fn start_watcher_window(&self) -> Result<(), TmuxError> {
        let bastion = self.bastion_command();
        let command = format!(
            "cd {} && {} watch",
            shell_quote(&self.config.project_root.to_string_lossy()),
            shell_quote(&bastion.to_string_lossy()),
        );
        self.session
            .send_keys(&self.config.watcher_target, &command, true)
    }

    /// Watch the inbox and wake routed recipients when their mailbox changes.
    /// The inbox directory is created if missing.
    pub async fn start_watcher(&self) -> Result<(), OrchestratorError> {
        let mut slot = self.watcher.lock().await;
        if slot.is_some() {
            return Err(bastion_queue::WatchError::AlreadyStarted.into());
        }

        let queue_dir = self.config.queue_path();
        let inbox = MailboxStore::new(&queue_dir).inbox_dir().to_path_buf();
        std::fs::create_dir_all(&inbox).map_err(bastion_queue::QueueError::from)?;

        let watcher = InboxWatcher::watch_inbox(&queue_dir)?;
        let streams = watcher
            .take_streams()
            .ok_or(bastion_queue::WatchError::AlreadyStarted)?;

        let dispatch = InboxDispatch::new(
            Arc::clone(&self.waker),
            self.config
                .routes
                .iter()
                .map(|r| (r.role.clone(), r.target.clone()))
                .collect(),
            self.config.wake_debounce(),
        );
        let consumer = tokio::spawn(dispatch.run(streams));

        tracing::info!(path = %inbox.display(), "inbox watcher started");
        *slot = Some(RunningWatcher {
            watcher,
            consumer,
        });
        Ok(())
    }

    /// Stop the inbox watcher and wait for its consumer to drain. No-op when
    /// no watcher is running.
    pub async fn stop_watcher(&self) -> Result<(), OrchestratorError> {
        let Some(running) = self.watcher.lock().await.take() else {
            return Ok(());
        };
        running.watcher.stop().await?;
        running.consumer.await?;
        tracing::info!("inbox watcher stopped");
        Ok(())
    }

    pub async fn is_watching(&self) -> bool {
        self.watcher.lock().await.is_some()
    }

    /// Default escalation supervisor over the routed roles.
    pub fn escalation_supervisor(&self) -> EscalationSupervisor<R, TimeoutLadder> {
        EscalationSupervisor::new(
            Arc::clone(&self.waker),
            Arc::new(MailboxStore::new(self.config.queue_path())),
            self.config.routes.clone(),
            TimeoutLadder::new(self.config.escalation.step()),
            self.config.escalation.poll_interval(),
        )
    }
}

/// Mailbox file → recipient name: the file stem of a `<recipient>.yaml`
/// record. Only the store's own `.yaml` extension maps to a recipient; hidden
/// temp files and files with any other extension have none.
pub fn recipient_for(path: &Path) -> Option<&str> {
    if !is_record_file(path) {
        return None;
    }
    path.file_stem().and_then(|s| s.to_str())
}

/// Consumes watcher streams and turns mailbox changes into wake-ups.
///
/// Events inside a recipient's debounce window are not dropped: they leave a
/// deferred wake-up that fires once the window closes.
struct InboxDispatch<R> {
    waker: Arc<AgentWaker<R>>,
    routes: HashMap<String, String>,
    debounce: Duration,
    last_wake: HashMap<String, Instant>,
    deferred: HashMap<String, Instant>,
}

impl<R: TmuxCommandRunner + 'static> InboxDispatch<R> {
    fn new(waker: Arc<AgentWaker<R>>, routes: HashMap<String, String>, debounce: Duration) -> Self {
        Self {
            waker,
            routes,
            debounce,
            last_wake: HashMap::new(),
            deferred: HashMap::new(),
        }
    }

    /// Runs until both streams close. Deferred wake-ups still pending at
    /// that point are dropped.
    async fn run(mut self, mut streams: WatchStreams) {
        let mut events_open = true;
        let mut errors_open = true;
        while events_open || errors_open {
            let next_due = self.next_deferred();
            let deadline = tokio::time::Instant::from_std(next_due.unwrap_or_else(Instant::now));
            tokio::select! {
                event = streams.events.recv(), if events_open => match event {
                    Some(event) => {
                        tracing::debug!(path = %event.path.display(), op = %event.operation, "inbox event");
                        self.handle(&event.path).await;
                    }
                    None => events_open = false,
                },
                err = streams.errors.recv(), if errors_open => match err {
                    Some(e) => tracing::warn!("inbox watcher error: {e}"),
                    None => errors_open = false,
                },
                _ = tokio::time::sleep_until(deadline), if next_due.is_some() => {
                    self.flush_deferred(Instant::now()).await;
                }
            }
        }
        if !self.deferred.is_empty() {
            tracing::debug!(pending = self.deferred.len(), "dropping deferred wake-ups");
        }
        tracing::debug!("inbox dispatch finished");
    }

    async fn handle(&mut self, path: &Path) {
        let Some(recipient) = recipient_for(path) else {
            tracing::debug!(path = %path.display(), "ignoring non-mailbox file");
            return;
        };
        let Some(target) = self.routes.get(recipient).cloned() else {
            tracing::info!(recipient, "no pane routed for recipient, skipping");
            return;
        };
        if !self.should_wake(recipient, Instant::now()) {
            tracing::debug!(recipient, "wake-up debounced, deferred to end of window");
            return;
        }
        self.wake(recipient.to_string(), target).await;
    }

    /// Admit a wake-up for `recipient` at `now`, or defer it to the end of the
    /// current debounce window.
    fn should_wake(&mut self, recipient: &str, now: Instant) -> bool {
        match self.last_wake.get(recipient) {
            Some(&last) if now.saturating_duration_since(last) < self.debounce => {
                self.deferred
                    .entry(recipient.to_string())
                    .or_insert(last + self.debounce);
                false
            }
            _ => {
                self.last_wake.insert(recipient.to_string(), now);
                self.deferred.remove(recipient);
                true
            }
        }
    }

    fn next_deferred(&self) -> Option<Instant> {
        self.deferred.values().min().copied()
    }

    /// Fire every deferred wake-up due at `now`.
    async fn flush_deferred(&mut self, now: Instant) {
        let due: Vec<String> = self
            .deferred
            .iter()
            .filter(|&(_, &at)| at <= now)
            .map(|(recipient, _)| recipient.clone())
            .collect();
        for recipient in due {
            self.deferred.remove(&recipient);
            let Some(target) = self.routes.get(&recipient).cloned() else {
                continue;
            };
            self.last_wake.insert(recipient.clone(), now);
            self.wake(recipient, target).await;
        }
    }

    async fn wake(&self, recipient: String, target: String) {
        let waker = Arc::clone(&self.waker);
        let role = recipient.clone();
        let result =
            tokio::task::spawn_blocking(move || waker.wakeup(&role, &target)).await;
        match result {
            Ok(Ok(())) => tracing::info!(recipient = %recipient, "woke recipient"),
            Ok(Err(e)) => tracing::warn!(recipient = %recipient, "wake-up failed: {e}"),
            Err(e) => tracing::warn!(recipient = %recipient, "wake-up task failed: {e}"),
        }
    }
}

fn resolve_bastion_command(project_root: &Path) -> PathBuf {
    let on_path = std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(BASTION_BIN).is_file())
    });
    if on_path {
        PathBuf::from(BASTION_BIN)
    } else {
        project_root.join(BASTION_BIN)
    }
}

/// Quote for POSIX shells unless the word is plainly safe.
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:@%,".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
