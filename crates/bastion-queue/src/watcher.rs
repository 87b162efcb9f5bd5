//! Inbox watcher: turns filesystem notifications into `FileEvent`s.
//!
//! Lifecycle is `Created → Watching → Stopped`. `watch` registers
//! directories, `start` spawns the single dispatch task, `stop` is
//! idempotent, waits for the task to exit and leaves both output streams
//! closed (receivers yield `None`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;
use crate::mailbox::INBOX_DIR;

/// Capacity of the classified event stream.
pub const EVENT_BUFFER: usize = 100;
/// Capacity of the error stream.
pub const ERROR_BUFFER: usize = 10;
/// Capacity of the bridge from the notify thread into the dispatch task.
const RAW_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOperation {
    Write,
    Create,
    Rename,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Write => "write",
            Self::Create => "create",
            Self::Rename => "rename",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub operation: FileOperation,
}

/// Classify a raw notification. Removals, access and metadata-only changes
/// are dropped. Renames count: editors and atomic writers save by renaming
/// a temp file over the target.
pub fn classify(kind: &EventKind) -> Option<FileOperation> {
    match kind {
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileOperation::Rename),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FileOperation::Write),
        EventKind::Create(_) => Some(FileOperation::Create),
        _ => None,
    }
}

/// Receiving halves of the watcher's output, handed out once.
#[derive(Debug)]
pub struct WatchStreams {
    pub events: mpsc::Receiver<FileEvent>,
    pub errors: mpsc::Receiver<notify::Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Created,
    Watching,
    Stopped,
}

struct Lifecycle {
    state: WatcherState,
    backend: Option<RecommendedWatcher>,
    raw_rx: Option<mpsc::Receiver<notify::Result<Event>>>,
    event_tx: Option<mpsc::Sender<FileEvent>>,
    error_tx: Option<mpsc::Sender<notify::Error>>,
    task: Option<JoinHandle<()>>,
    watched: Vec<PathBuf>,
}

pub struct InboxWatcher {
    lifecycle: Mutex<Lifecycle>,
    streams: StdMutex<Option<WatchStreams>>,
    cancel: CancellationToken,
    stopped: AtomicBool,
}

impl InboxWatcher {
    pub fn new() -> Result<Self, WatchError> {
        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<Event>>(RAW_BUFFER);
        // notify calls back on its own thread; blocking_send is safe there and
        // fails fast once the dispatch task has dropped the receiver.
        let backend = notify::recommended_watcher(move |res| {
            let _ = raw_tx.blocking_send(res);
        })?;

        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (error_tx, errors) = mpsc::channel(ERROR_BUFFER);

        Ok(Self {
            lifecycle: Mutex::new(Lifecycle {
                state: WatcherState::Created,
                backend: Some(backend),
                raw_rx: Some(raw_rx),
                event_tx: Some(event_tx),
                error_tx: Some(error_tx),
                task: None,
                watched: Vec::new(),
            }),
            streams: StdMutex::new(Some(WatchStreams { events, errors })),
            cancel: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        })
    }

    /// Watch `<queue_dir>/inbox` and start dispatching.
    pub fn watch_inbox(queue_dir: impl AsRef<Path>) -> Result<Self, WatchError> {
        let mut watcher = Self::new()?;
        watcher.watch(queue_dir.as_ref().join(INBOX_DIR))?;
        watcher.start()?;
        Ok(watcher)
    }

    /// Subscribe to changes directly inside `dir` (non-recursive).
    pub fn watch(&mut self, dir: impl AsRef<Path>) -> Result<(), WatchError> {
        let dir = dir.as_ref();
        let lc = self.lifecycle.get_mut();
        if lc.state == WatcherState::Stopped {
            return Err(WatchError::Stopped);
        }
        if !dir.is_dir() {
            return Err(WatchError::DirectoryNotFound(dir.to_path_buf()));
        }
        let backend = lc.backend.as_mut().ok_or(WatchError::Stopped)?;
        backend.watch(dir, RecursiveMode::NonRecursive)?;
        lc.watched.push(dir.to_path_buf());
        tracing::info!(path = %dir.display(), "watching directory");
        Ok(())
    }

    /// Spawn the dispatch task on the current tokio runtime.
    pub fn start(&mut self) -> Result<(), WatchError> {
        let lc = self.lifecycle.get_mut();
        match lc.state {
            WatcherState::Created => {}
            WatcherState::Watching => return Err(WatchError::AlreadyStarted),
            WatcherState::Stopped => return Err(WatchError::Stopped),
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

        let (Some(raw_rx), Some(event_tx), Some(error_tx)) =
            (lc.raw_rx.take(), lc.event_tx.take(), lc.error_tx.take())
        else {
            return Err(WatchError::AlreadyStarted);
        };
        let cancel = self.cancel.clone();
        lc.task = Some(runtime.spawn(dispatch(raw_rx, event_tx, error_tx, cancel)));
        lc.state = WatcherState::Watching;
        tracing::debug!(dirs = lc.watched.len(), "watcher dispatch started");
        Ok(())
    }

    /// Hand out the event and error receivers. `None` after the first call.
    pub fn take_streams(&self) -> Option<WatchStreams> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn watched_dirs(&mut self) -> &[PathBuf] {
        &self.lifecycle.get_mut().watched
    }

    /// Stop watching. Safe to call repeatedly and concurrently: every caller
    /// returns only after the dispatch task has exited.
    pub async fn stop(&self) -> Result<(), WatchError> {
        let mut lc = self.lifecycle.lock().await;
        if lc.state == WatcherState::Stopped {
            return Ok(());
        }

        self.cancel.cancel();
        // Dropping the backend unregisters the OS watches.
        lc.backend.take();
        if let Some(task) = lc.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("watcher dispatch task ended abnormally: {e}");
            }
        }
        // Never started: the senders are still parked here.
        lc.event_tx.take();
        lc.error_tx.take();
        lc.raw_rx.take();

        lc.state = WatcherState::Stopped;
        self.stopped.store(true, Ordering::Release);
        tracing::info!("watcher stopped");
        Ok(())
    }
}

impl Drop for InboxWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn dispatch(
    mut raw_rx: mpsc::Receiver<notify::Result<Event>>,
    event_tx: mpsc::Sender<FileEvent>,
    error_tx: mpsc::Sender<notify::Error>,
    cancel: CancellationToken,
) {
    loop {
        let raw = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            raw = raw_rx.recv() => raw,
        };
        match raw {
            None => break,
            Some(Ok(event)) => {
                let Some(operation) = classify(&event.kind) else {
                    continue;
                };
                for path in event.paths {
                    let event = FileEvent { path, operation };
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return,
                        sent = event_tx.send(event) => {
                            if sent.is_err() {
                                tracing::debug!("event receiver dropped; discarding event");
                            }
                        }
                    }
                }
            }
            Some(Err(e)) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    sent = error_tx.send(e) => {
                        if let Err(mpsc::error::SendError(e)) = sent {
                            tracing::warn!("watcher error with no receiver: {e}");
                        }
                    }
                }
            }
        }
    }
    tracing::debug!("watcher dispatch loop exited");
}
