//! SessionManager: addresses one named tmux session and drives its
//! windows and panes. Targets are `=session:window[.pane-index]`; the `=`
//! makes tmux match the session name exactly instead of by prefix.

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;

/// Session name used when none is configured.
pub const DEFAULT_SESSION_NAME: &str = "bastion";

/// Custom pane option holding a label that running programs cannot overwrite
/// (unlike `pane_title`, which shells and TUIs rewrite freely).
pub const PANE_LABEL_OPTION: &str = "@pane_label";

pub struct SessionManager<R> {
    runner: R,
    session_name: String,
}

impl<R: TmuxCommandRunner> SessionManager<R> {
    pub fn new(runner: R, session_name: impl Into<String>) -> Self {
        Self {
            runner,
            session_name: session_name.into(),
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Exact-match target for the session itself.
    pub fn session_target(&self) -> String {
        format!("={}", self.session_name)
    }

    /// Fully qualified target for a `window` or `window.pane` inside this session.
    pub fn target(&self, sub: &str) -> String {
        format!("={}:{sub}", self.session_name)
    }

    /// `Ok(false)` when tmux reports the session (or the server) missing;
    /// every other failure is propagated.
    pub fn session_exists(&self) -> Result<bool, TmuxError> {
        let target = self.session_target();
        match self.runner.run(&["has-session", "-t", &target]) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create the session detached, with `first_window` as its initial window.
    /// Fails with `SessionExists` when a session with this name is live.
    pub fn create_session(&self, first_window: &str) -> Result<(), TmuxError> {
        if self.session_exists()? {
            return Err(TmuxError::SessionExists(self.session_name.clone()));
        }
        self.runner.run(&[
            "new-session",
            "-d",
            "-s",
            &self.session_name,
            "-n",
            first_window,
        ])?;
        tracing::debug!(session = %self.session_name, first_window, "created tmux session");
        Ok(())
    }

    pub fn create_window(&self, name: &str) -> Result<(), TmuxError> {
        let target = self.target("");
        self.runner.run(&["new-window", "-t", &target, "-n", name])?;
        Ok(())
    }

    /// Split the active pane of `window` side by side.
    pub fn split_pane_horizontal(&self, window: &str) -> Result<(), TmuxError> {
        let target = self.target(window);
        self.runner.run(&["split-window", "-h", "-t", &target])?;
        Ok(())
    }

    /// Split the active pane of `window` top/bottom.
    pub fn split_pane_vertical(&self, window: &str) -> Result<(), TmuxError> {
        let target = self.target(window);
        self.runner.run(&["split-window", "-v", "-t", &target])?;
        Ok(())
    }

    pub fn select_pane(&self, target: &str) -> Result<(), TmuxError> {
        let target = self.target(target);
        self.runner.run(&["select-pane", "-t", &target])?;
        Ok(())
    }

    pub fn select_window(&self, window: &str) -> Result<(), TmuxError> {
        let target = self.target(window);
        self.runner.run(&["select-window", "-t", &target])?;
        Ok(())
    }

    pub fn set_tiled_layout(&self, window: &str) -> Result<(), TmuxError> {
        let target = self.target(window);
        self.runner
            .run(&["select-layout", "-t", &target, "tiled"])?;
        Ok(())
    }

    /// Type `text` literally into the pane. With `press_enter`, Enter goes out
    /// as a second `send-keys` so text such as `Escape` is never read as a key name.
    pub fn send_keys(&self, target: &str, text: &str, press_enter: bool) -> Result<(), TmuxError> {
        let full = self.target(target);
        self.runner.run(&["send-keys", "-t", &full, "-l", text])?;
        if press_enter {
            self.runner.run(&["send-keys", "-t", &full, "Enter"])?;
        }
        Ok(())
    }

    /// Send a tmux key name (`Escape`, `Enter`, `C-c`, ...) to the pane.
    pub fn send_key(&self, target: &str, key: &str) -> Result<(), TmuxError> {
        let full = self.target(target);
        self.runner.run(&["send-keys", "-t", &full, key])?;
        Ok(())
    }

    pub fn list_windows(&self) -> Result<Vec<String>, TmuxError> {
        let target = self.session_target();
        let output = self
            .runner
            .run(&["list-windows", "-t", &target, "-F", "#{window_name}"])?;
        Ok(non_empty_lines(&output))
    }

    /// Pane indices of `window`, in tmux order.
    pub fn list_panes(&self, window: &str) -> Result<Vec<String>, TmuxError> {
        let target = self.target(window);
        let output = self
            .runner
            .run(&["list-panes", "-t", &target, "-F", "#{pane_index}"])?;
        Ok(non_empty_lines(&output))
    }

    pub fn set_pane_title(&self, target: &str, label: &str) -> Result<(), TmuxError> {
        let full = self.target(target);
        self.runner
            .run(&["set-option", "-p", "-t", &full, PANE_LABEL_OPTION, label])?;
        Ok(())
    }

    /// Show each pane's label in its top border for `window`.
    pub fn enable_pane_borders(&self, window: &str) -> Result<(), TmuxError> {
        let full = self.target(window);
        self.runner
            .run(&["set-option", "-w", "-t", &full, "pane-border-status", "top"])?;
        let format = format!(" #{{{PANE_LABEL_OPTION}}} ");
        self.runner
            .run(&["set-option", "-w", "-t", &full, "pane-border-format", &format])?;
        Ok(())
    }

    /// Bind `prefix q` to a confirmed `<bastion_cmd> stop`.
    pub fn bind_stop_key(&self, bastion_cmd: &str) -> Result<(), TmuxError> {
        let action = format!("run-shell '{bastion_cmd} stop'");
        self.runner.run(&[
            "bind-key",
            "-T",
            "prefix",
            "q",
            "confirm-before",
            "-p",
            "Stop Bastion session? (y/n)",
            &action,
        ])?;
        Ok(())
    }

    /// Resize a pane to `percent` of the window width.
    pub fn resize_pane(&self, target: &str, percent: u8) -> Result<(), TmuxError> {
        let full = self.target(target);
        let width = format!("{}%", percent.min(100));
        self.runner
            .run(&["resize-pane", "-t", &full, "-x", &width])?;
        Ok(())
    }

    /// Kill the session. Killing a session that does not exist is a no-op.
    pub fn kill_session(&self) -> Result<(), TmuxError> {
        if !self.session_exists()? {
            return Ok(());
        }
        let target = self.session_target();
        match self.runner.run(&["kill-session", "-t", &target]) {
            Ok(_) => {
                tracing::debug!(session = %self.session_name, "killed tmux session");
                Ok(())
            }
            // Vanished between the check and the kill.
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn non_empty_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records every argument vector and answers from a scripted closure.
    struct Recorder {
        calls: Mutex<Vec<Vec<String>>>,
        reply: Box<dyn Fn(&[&str]) -> Result<String, TmuxError> + Send + Sync>,
    }

    impl Recorder {
        fn new(reply: impl Fn(&[&str]) -> Result<String, TmuxError> + Send + Sync + 'static) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply: Box::new(reply),
            }
        }

        fn ok() -> Self {
            Self::new(|_| Ok(String::new()))
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl TmuxCommandRunner for Recorder {
        fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
            self.calls
                .lock()
                .expect("lock")
                .push(args.iter().map(|s| s.to_string()).collect());
            (self.reply)(args)
        }
    }

    fn missing(args: &[&str]) -> Result<String, TmuxError> {
        if args[0] == "has-session" {
            Err(TmuxError::TargetNotFound("can't find session: bastion".into()))
        } else {
            Ok(String::new())
        }
    }

    #[test]
    fn session_exists_true_on_success() {
        let sm = SessionManager::new(Recorder::ok(), "bastion");
        assert!(sm.session_exists().expect("exists"));
        assert_eq!(sm.runner().calls()[0], vec!["has-session", "-t", "=bastion"]);
    }

    #[test]
    fn session_exists_false_on_not_found() {
        let sm = SessionManager::new(Recorder::new(missing), "bastion");
        assert!(!sm.session_exists().expect("no error"));
    }

    #[test]
    fn session_exists_propagates_other_failures() {
        let sm = SessionManager::new(
            Recorder::new(|_| Err(TmuxError::BinaryNotFound)),
            "bastion",
        );
        assert!(matches!(sm.session_exists(), Err(TmuxError::BinaryNotFound)));
    }

    #[test]
    fn create_session_refuses_duplicate() {
        let sm = SessionManager::new(Recorder::ok(), "bastion");
        let err = sm.create_session("main").unwrap_err();
        assert!(matches!(err, TmuxError::SessionExists(ref n) if n == "bastion"));
        assert_eq!(sm.runner().calls().len(), 1, "no new-session after the check");
    }

    #[test]
    fn create_session_runs_detached() {
        let sm = SessionManager::new(Recorder::new(missing), "bastion");
        sm.create_session("main").expect("create");
        let calls = sm.runner().calls();
        assert_eq!(
            calls[1],
            vec!["new-session", "-d", "-s", "bastion", "-n", "main"]
        );
    }

    #[test]
    fn send_keys_sends_enter_separately() {
        let sm = SessionManager::new(Recorder::ok(), "bastion");
        sm.send_keys("main.0", "Escape now", true).expect("send");
        let calls = sm.runner().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            vec!["send-keys", "-t", "=bastion:main.0", "-l", "Escape now"]
        );
        assert_eq!(calls[1], vec!["send-keys", "-t", "=bastion:main.0", "Enter"]);
    }

    #[test]
    fn send_keys_without_enter() {
        let sm = SessionManager::new(Recorder::ok(), "bastion");
        sm.send_keys("main.2", "inbox", false).expect("send");
        assert_eq!(sm.runner().calls().len(), 1);
    }

    #[test]
    fn send_key_uses_key_name() {
        let sm = SessionManager::new(Recorder::ok(), "bastion");
        sm.send_key("main.0", "Escape").expect("send");
        assert_eq!(
            sm.runner().calls()[0],
            vec!["send-keys", "-t", "=bastion:main.0", "Escape"]
        );
    }

    #[test]
    fn list_windows_parses_lines() {
        let sm = SessionManager::new(
            Recorder::new(|_| Ok("main\nspecialists\n".to_string())),
            "bastion",
        );
        assert_eq!(sm.list_windows().expect("list"), vec!["main", "specialists"]);
    }

    #[test]
    fn list_panes_empty_output_is_empty() {
        let sm = SessionManager::new(Recorder::new(|_| Ok("\n".to_string())), "bastion");
        assert!(sm.list_panes("main").expect("list").is_empty());
    }

    #[test]
    fn structural_ops_surface_missing_session() {
        let sm = SessionManager::new(
            Recorder::new(|_| Err(TmuxError::TargetNotFound("can't find window: main".into()))),
            "bastion",
        );
        assert!(sm.split_pane_horizontal("main").unwrap_err().is_not_found());
        assert!(sm.set_tiled_layout("main").unwrap_err().is_not_found());
        assert!(sm.select_pane("main.1").unwrap_err().is_not_found());
    }

    #[test]
    fn kill_missing_session_is_noop() {
        let sm = SessionManager::new(Recorder::new(missing), "bastion");
        sm.kill_session().expect("no-op");
        let calls = sm.runner().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], "has-session");
    }

    #[test]
    fn kill_existing_session() {
        let sm = SessionManager::new(Recorder::ok(), "bastion");
        sm.kill_session().expect("kill");
        assert_eq!(
            sm.runner().calls()[1],
            vec!["kill-session", "-t", "=bastion"]
        );
    }

    #[test]
    fn every_target_matches_the_session_name_exactly() {
        let sm = SessionManager::new(Recorder::ok(), "bastion");
        sm.session_exists().expect("exists");
        sm.list_windows().expect("windows");
        sm.create_window("extra").expect("window");
        sm.list_panes("main").expect("panes");
        sm.kill_session().expect("kill");

        let targets: Vec<String> = sm
            .runner()
            .calls()
            .iter()
            .filter_map(|c| c.iter().position(|a| a == "-t").map(|i| c[i + 1].clone()))
            .collect();
        assert_eq!(
            targets,
            vec!["=bastion", "=bastion", "=bastion:", "=bastion:main", "=bastion", "=bastion"]
        );
    }

    #[test]
    fn pane_border_format_references_label_option() {
        let sm = SessionManager::new(Recorder::ok(), "bastion");
        sm.enable_pane_borders("main").expect("borders");
        let calls = sm.runner().calls();
        assert_eq!(calls[1].last().map(String::as_str), Some(" #{@pane_label} "));
    }

    #[test]
    fn resize_clamps_percent() {
        let sm = SessionManager::new(Recorder::ok(), "bastion");
        sm.resize_pane("main.0", 150).expect("resize");
        assert_eq!(sm.runner().calls()[0].last().map(String::as_str), Some("100%"));
    }
}
