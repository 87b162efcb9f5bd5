//! Escalation ladder for agents that leave mail unread.
//!
//! The orchestrator only executes a requested phase. Deciding *when* to move
//! up the ladder belongs to an `EscalationPolicy`, driven by the
//! `EscalationSupervisor`, which polls mailboxes on a fixed interval.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bastion_queue::MailboxStore;
use bastion_tmux::TmuxCommandRunner;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::RoleRoute;
use crate::waker::AgentWaker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EscalationPhase {
    /// Plain wake-up.
    Nudge = 1,
    /// Clear a stuck prompt, then wake up.
    Interrupt = 2,
    /// Reset the agent's session. The top of the ladder.
    Reset = 3,
}

impl EscalationPhase {
    /// Unknown levels fall back to a plain nudge.
    pub fn from_level(level: u8) -> Self {
        match level {
            2 => Self::Interrupt,
            3 => Self::Reset,
            _ => Self::Nudge,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Nudge => Some(Self::Interrupt),
            Self::Interrupt => Some(Self::Reset),
            Self::Reset => None,
        }
    }
}

impl fmt::Display for EscalationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nudge => "nudge",
            Self::Interrupt => "interrupt",
            Self::Reset => "reset",
        };
        write!(f, "phase {} ({name})", self.level())
    }
}

/// The last phase fired for a recipient and how long ago.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastEscalation {
    pub phase: EscalationPhase,
    pub elapsed: Duration,
}

pub trait EscalationPolicy: Send {
    /// Phase to fire now for a recipient whose oldest pending message has
    /// waited `waiting`, or `None` to leave it alone this round.
    fn next_phase(&self, waiting: Duration, last: Option<LastEscalation>) -> Option<EscalationPhase>;
}

/// Climb one rung per `step` while mail stays pending; stay quiet after
/// `Reset` until the mailbox drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutLadder {
    pub step: Duration,
}

impl TimeoutLadder {
    pub fn new(step: Duration) -> Self {
        Self { step }
    }
}

impl EscalationPolicy for TimeoutLadder {
    fn next_phase(&self, waiting: Duration, last: Option<LastEscalation>) -> Option<EscalationPhase> {
        match last {
            None if waiting >= self.step => Some(EscalationPhase::Nudge),
            None => None,
            Some(l) if l.elapsed >= self.step => l.phase.next(),
            Some(_) => None,
        }
    }
}

/// Polls routed mailboxes and fires escalation phases through the waker.
pub struct EscalationSupervisor<R, P = TimeoutLadder> {
    waker: Arc<AgentWaker<R>>,
    mailboxes: Arc<MailboxStore>,
    routes: Vec<RoleRoute>,
    policy: P,
    poll_interval: Duration,
    fired: HashMap<String, (EscalationPhase, Instant)>,
}

impl<R, P> EscalationSupervisor<R, P>
where
    R: TmuxCommandRunner + 'static,
    P: EscalationPolicy,
{
    pub fn new(
        waker: Arc<AgentWaker<R>>,
        mailboxes: Arc<MailboxStore>,
        routes: Vec<RoleRoute>,
        policy: P,
        poll_interval: Duration,
    ) -> Self {
        Self {
            waker,
            mailboxes,
            routes,
            policy,
            poll_interval,
            fired: HashMap::new(),
        }
    }

    /// Phase each recipient should receive at `now`. Records the decision;
    /// recipients whose mailbox has drained start over at phase 1. Reads the
    /// mailboxes on the calling thread.
    pub fn evaluate(&mut self, wall_now: DateTime<Utc>, now: Instant) -> Vec<(RoleRoute, EscalationPhase)> {
        let snapshot = read_oldest(&self.mailboxes, &self.routes);
        self.decide(snapshot, wall_now, now)
    }

    fn decide(
        &mut self,
        snapshot: Vec<(RoleRoute, Option<DateTime<Utc>>)>,
        wall_now: DateTime<Utc>,
        now: Instant,
    ) -> Vec<(RoleRoute, EscalationPhase)> {
        let mut due = Vec::new();
        for (route, oldest) in snapshot {
            let Some(oldest) = oldest else {
                if self.fired.remove(&route.role).is_some() {
                    tracing::debug!(role = %route.role, "mailbox drained, escalation reset");
                }
                continue;
            };

            let waiting = (wall_now - oldest).to_std().unwrap_or(Duration::ZERO);
            let last = self.fired.get(&route.role).map(|&(phase, at)| LastEscalation {
                phase,
                elapsed: now.saturating_duration_since(at),
            });
            if let Some(phase) = self.policy.next_phase(waiting, last) {
                self.fired.insert(route.role.clone(), (phase, now));
                due.push((route, phase));
            }
        }
        due
    }

    /// One poll round: evaluate, then fire every due phase. Pane failures
    /// are logged; they never stop the supervisor.
    pub async fn tick(&mut self) {
        let mailboxes = Arc::clone(&self.mailboxes);
        let routes = self.routes.clone();
        let snapshot = match tokio::task::spawn_blocking(move || read_oldest(&mailboxes, &routes)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("mailbox poll task failed: {e}");
                return;
            }
        };
        let due = self.decide(snapshot, Utc::now(), Instant::now());
        for (route, phase) in due {
            tracing::info!(role = %route.role, target = %route.target, %phase, "escalating");
            let waker = Arc::clone(&self.waker);
            let result = tokio::task::spawn_blocking(move || {
                waker.wakeup_with_escalation(&route.role, &route.target, phase)
            })
            .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("escalation failed: {e}"),
                Err(e) => tracing::warn!("escalation task failed: {e}"),
            }
        }
    }

    /// Poll until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            routes = self.routes.len(),
            poll_interval = ?self.poll_interval,
            "escalation supervisor started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        tracing::info!("escalation supervisor stopped");
    }
}

/// Oldest pending timestamp per route. Unreadable mailboxes are logged and
/// left out so they neither escalate nor reset.
fn read_oldest(
    mailboxes: &MailboxStore,
    routes: &[RoleRoute],
) -> Vec<(RoleRoute, Option<DateTime<Utc>>)> {
    routes
        .iter()
        .filter_map(|route| match mailboxes.oldest_pending(&route.role) {
            Ok(oldest) => Some((route.clone(), oldest)),
            Err(e) => {
                tracing::warn!(role = %route.role, "cannot read mailbox: {e}");
                None
            }
        })
        .collect()
}
