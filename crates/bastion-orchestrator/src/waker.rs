//! Wake-up signalling into agent panes.
//!
//! `AgentWaker` is the synchronous half of the orchestrator that the inbox
//! dispatch task and the escalation supervisor share. Callers in async code
//! run it inside `spawn_blocking`.

use std::sync::Arc;

use bastion_tmux::{SessionManager, TmuxCommandRunner, TmuxError};

use crate::escalation::EscalationPhase;

/// tmux key name that cancels a half-typed prompt.
const INTERRUPT_KEY: &str = "Escape";
const CONFIRM_KEY: &str = "Enter";

pub struct AgentWaker<R> {
    session: Arc<SessionManager<R>>,
    wake_token: String,
    reset_command: String,
}

impl<R: TmuxCommandRunner> AgentWaker<R> {
    pub fn new(
        session: Arc<SessionManager<R>>,
        wake_token: impl Into<String>,
        reset_command: impl Into<String>,
    ) -> Self {
        Self {
            session,
            wake_token: wake_token.into(),
            reset_command: reset_command.into(),
        }
    }

    /// Nudge the agent in `target` to re-read its inbox.
    pub fn wakeup(&self, role: &str, target: &str) -> Result<(), TmuxError> {
        if self.wake_token.is_empty() {
            self.session.send_key(target, CONFIRM_KEY)?;
        } else {
            self.session.send_keys(target, &self.wake_token, true)?;
        }
        tracing::debug!(role, target, "wake-up sent");
        Ok(())
    }

    /// Run one rung of the escalation ladder. Never advances on its own.
    pub fn wakeup_with_escalation(
        &self,
        role: &str,
        target: &str,
        phase: EscalationPhase,
    ) -> Result<(), TmuxError> {
        match phase {
            EscalationPhase::Nudge => self.wakeup(role, target),
            EscalationPhase::Interrupt => {
                self.session.send_key(target, INTERRUPT_KEY)?;
                self.session.send_key(target, INTERRUPT_KEY)?;
                self.wakeup(role, target)
            }
            EscalationPhase::Reset => {
                tracing::warn!(role, target, "resetting unresponsive agent");
                self.session.send_keys(target, &self.reset_command, true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bastion_tmux::{FakeTmux, SentKeys, SessionLayout};

    use super::*;

    fn waker(token: &str) -> (Arc<FakeTmux>, AgentWaker<Arc<FakeTmux>>) {
        let fake = Arc::new(FakeTmux::new());
        let session = Arc::new(SessionManager::new(Arc::clone(&fake), "bastion"));
        session
            .setup_session(&SessionLayout::default())
            .expect("setup");
        (fake, AgentWaker::new(session, token, "/clear"))
    }

    fn keys(sent: &[SentKeys]) -> Vec<(&str, bool)> {
        sent.iter().map(|s| (s.keys.as_str(), s.literal)).collect()
    }

    #[test]
    fn wakeup_types_token_then_enter() {
        let (fake, waker) = waker("inbox");
        waker.wakeup("envoy", "main.0").expect("wake");
        let sent = fake.sent_keys();
        assert_eq!(keys(&sent), vec![("inbox", true), ("Enter", false)]);
        assert!(sent.iter().all(|s| s.target == "=bastion:main.0"));
    }

    #[test]
    fn empty_token_sends_bare_enter() {
        let (fake, waker) = waker("");
        waker.wakeup("envoy", "main.0").expect("wake");
        assert_eq!(keys(&fake.sent_keys()), vec![("Enter", false)]);
    }

    #[test]
    fn interrupt_sends_two_escapes_before_wakeup() {
        let (fake, waker) = waker("inbox");
        waker
            .wakeup_with_escalation("marshall", "main.2", EscalationPhase::Interrupt)
            .expect("escalate");
        assert_eq!(keys(&fake.sent_keys()), vec![
            ("Escape", false),
            ("Escape", false),
            ("inbox", true),
            ("Enter", false),
        ]);
    }

    #[test]
    fn reset_sends_reset_command_only() {
        let (fake, waker) = waker("inbox");
        waker
            .wakeup_with_escalation("marshall", "main.2", EscalationPhase::Reset)
            .expect("escalate");
        assert_eq!(keys(&fake.sent_keys()), vec![("/clear", true), ("Enter", false)]);
    }

    #[test]
    fn missing_pane_is_not_found() {
        let (_fake, waker) = waker("inbox");
        let err = waker.wakeup("ghost", "main.9").unwrap_err();
        assert!(err.is_not_found());
    }
}
