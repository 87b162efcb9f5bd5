//! In-memory model of the subset of tmux that `SessionManager` drives.
//!
//! Answers with the same typed errors the real executor produces, so
//! topology properties can be asserted without a tmux server.

use std::sync::Mutex;

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentKeys {
    /// Fully qualified `=session:window.pane` target as passed to tmux.
    pub target: String,
    pub keys: String,
    /// True for `send-keys -l` (literal text), false for key names.
    pub literal: bool,
}

#[derive(Debug, Clone)]
struct FakeWindow {
    name: String,
    panes: usize,
    active_pane: usize,
    layout: Option<String>,
}

#[derive(Debug, Clone)]
struct FakeSession {
    name: String,
    windows: Vec<FakeWindow>,
    active_window: usize,
}

#[derive(Debug, Default)]
struct FakeState {
    sessions: Vec<FakeSession>,
    sent: Vec<SentKeys>,
    calls: Vec<Vec<String>>,
    fail_matching: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FakeTmux {
    state: Mutex<FakeState>,
}

impl FakeTmux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any later call whose joined arguments contain `needle` fails with
    /// `CommandFailed`.
    pub fn fail_matching(&self, needle: impl Into<String>) {
        self.lock().fail_matching.push(needle.into());
    }

    pub fn session_names(&self) -> Vec<String> {
        self.lock().sessions.iter().map(|s| s.name.clone()).collect()
    }

    pub fn window_names(&self, session: &str) -> Vec<String> {
        self.lock()
            .sessions
            .iter()
            .find(|s| s.name == session)
            .map(|s| s.windows.iter().map(|w| w.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn pane_count(&self, session: &str, window: &str) -> Option<usize> {
        let st = self.lock();
        let s = st.sessions.iter().find(|s| s.name == session)?;
        s.windows.iter().find(|w| w.name == window).map(|w| w.panes)
    }

    pub fn layout(&self, session: &str, window: &str) -> Option<String> {
        let st = self.lock();
        let s = st.sessions.iter().find(|s| s.name == session)?;
        s.windows
            .iter()
            .find(|w| w.name == window)
            .and_then(|w| w.layout.clone())
    }

    /// `window.pane` currently selected in the session.
    pub fn active_target(&self, session: &str) -> Option<String> {
        let st = self.lock();
        let s = st.sessions.iter().find(|s| s.name == session)?;
        let w = s.windows.get(s.active_window)?;
        Some(format!("{}.{}", w.name, w.active_pane))
    }

    pub fn sent_keys(&self) -> Vec<SentKeys> {
        self.lock().sent.clone()
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TmuxCommandRunner for FakeTmux {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        let mut st = self.lock();
        st.calls.push(args.iter().map(|s| s.to_string()).collect());

        let joined = args.join(" ");
        if st.fail_matching.iter().any(|n| joined.contains(n.as_str())) {
            return Err(TmuxError::CommandFailed {
                code: 1,
                stderr: format!("injected failure: {joined}"),
            });
        }

        let Some((&cmd, rest)) = args.split_first() else {
            return Err(TmuxError::CommandFailed {
                code: 1,
                stderr: "no command".into(),
            });
        };
        let target = flag_value(rest, "-t").unwrap_or_default();

        match cmd {
            "has-session" => {
                find_session(&st, target)?;
                Ok(String::new())
            }
            "new-session" => {
                let name = flag_value(rest, "-s").unwrap_or("0").to_string();
                if st.sessions.iter().any(|s| s.name == name) {
                    return Err(TmuxError::CommandFailed {
                        code: 1,
                        stderr: format!("duplicate session: {name}"),
                    });
                }
                let window = flag_value(rest, "-n").unwrap_or("0").to_string();
                st.sessions.push(FakeSession {
                    name,
                    windows: vec![new_window(window)],
                    active_window: 0,
                });
                Ok(String::new())
            }
            "new-window" => {
                let name = flag_value(rest, "-n").unwrap_or("0").to_string();
                let (sess, _, _) = parse_target(target);
                let idx = find_session(&st, sess)?;
                let session = &mut st.sessions[idx];
                session.windows.push(new_window(name));
                session.active_window = session.windows.len() - 1;
                Ok(String::new())
            }
            "split-window" => {
                let window = find_window_mut(&mut st, target)?;
                window.panes += 1;
                window.active_pane = window.panes - 1;
                window.layout = None;
                Ok(String::new())
            }
            "select-pane" => {
                let (_, _, pane) = parse_target(target);
                let window = find_window_mut(&mut st, target)?;
                let pane = pane.unwrap_or(window.active_pane);
                if pane >= window.panes {
                    return Err(TmuxError::TargetNotFound(format!("can't find pane: {pane}")));
                }
                window.active_pane = pane;
                Ok(String::new())
            }
            "select-window" => {
                let (sess, window, _) = parse_target(target);
                let idx = find_session(&st, sess)?;
                let session = &mut st.sessions[idx];
                let w = session
                    .windows
                    .iter()
                    .position(|w| Some(w.name.as_str()) == window)
                    .ok_or_else(|| {
                        TmuxError::TargetNotFound(format!("can't find window: {}", window.unwrap_or("")))
                    })?;
                session.active_window = w;
                Ok(String::new())
            }
            "select-layout" => {
                let layout = rest.last().map(|s| s.to_string());
                let window = find_window_mut(&mut st, target)?;
                window.layout = layout;
                Ok(String::new())
            }
            "send-keys" => {
                let (_, _, pane) = parse_target(target);
                let window = find_window_mut(&mut st, target)?;
                if let Some(p) = pane {
                    if p >= window.panes {
                        return Err(TmuxError::TargetNotFound(format!("can't find pane: {p}")));
                    }
                }
                let literal = rest.contains(&"-l");
                let keys = rest.last().map(|s| s.to_string()).unwrap_or_default();
                st.sent.push(SentKeys {
                    target: target.to_string(),
                    keys,
                    literal,
                });
                Ok(String::new())
            }
            "list-windows" => {
                let idx = find_session(&st, target)?;
                let names: Vec<&str> = st.sessions[idx]
                    .windows
                    .iter()
                    .map(|w| w.name.as_str())
                    .collect();
                Ok(format!("{}\n", names.join("\n")))
            }
            "list-panes" => {
                let window = find_window_mut(&mut st, target)?;
                let lines: Vec<String> = (0..window.panes).map(|i| i.to_string()).collect();
                Ok(format!("{}\n", lines.join("\n")))
            }
            "kill-session" => {
                let idx = find_session(&st, target)?;
                st.sessions.remove(idx);
                Ok(String::new())
            }
            "set-option" | "bind-key" | "resize-pane" => Ok(String::new()),
            other => Err(TmuxError::CommandFailed {
                code: 1,
                stderr: format!("unknown command: {other}"),
            }),
        }
    }
}

fn new_window(name: String) -> FakeWindow {
    FakeWindow {
        name,
        panes: 1,
        active_pane: 0,
        layout: None,
    }
}

fn flag_value<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| *a == flag)
        .and_then(|i| args.get(i + 1))
        .copied()
}

/// Split `session:window.pane` into its parts.
fn parse_target(target: &str) -> (&str, Option<&str>, Option<usize>) {
    let Some((session, rest)) = target.split_once(':') else {
        return (target, None, None);
    };
    if rest.is_empty() {
        return (session, None, None);
    }
    match rest.rsplit_once('.') {
        Some((window, pane)) => match pane.parse() {
            Ok(p) => (session, Some(window), Some(p)),
            Err(_) => (session, Some(rest), None),
        },
        None => (session, Some(rest), None),
    }
}

/// `=name` matches exactly. A bare name matches exactly or, failing that,
/// as the prefix of a single session, the way tmux resolves it.
fn find_session(st: &FakeState, name: &str) -> Result<usize, TmuxError> {
    if st.sessions.is_empty() {
        return Err(TmuxError::TargetNotFound(
            "no server running on /tmp/tmux-fake/default".into(),
        ));
    }
    let found = match name.strip_prefix('=') {
        Some(exact) => st.sessions.iter().position(|s| s.name == exact),
        None => st.sessions.iter().position(|s| s.name == name).or_else(|| {
            let mut prefixed = st
                .sessions
                .iter()
                .enumerate()
                .filter(|(_, s)| s.name.starts_with(name));
            match (prefixed.next(), prefixed.next()) {
                (Some((i, _)), None) => Some(i),
                _ => None,
            }
        }),
    };
    found.ok_or_else(|| TmuxError::TargetNotFound(format!("can't find session: {name}")))
}

fn find_window_mut<'a>(st: &'a mut FakeState, target: &str) -> Result<&'a mut FakeWindow, TmuxError> {
    let (sess, window, _) = parse_target(target);
    let idx = find_session(st, sess)?;
    let session = &mut st.sessions[idx];
    let active = session.active_window;
    match window {
        Some(name) => session
            .windows
            .iter_mut()
            .find(|w| w.name == name)
            .ok_or_else(|| TmuxError::TargetNotFound(format!("can't find window: {name}"))),
        None => session
            .windows
            .get_mut(active)
            .ok_or_else(|| TmuxError::TargetNotFound("can't find window".into())),
    }
}
