//! Reconnection supervisor.
//!
//! Every `check_interval` the supervisor runs a connectivity probe. A failed
//! probe while the session is Degraded spends one relogin attempt:
//!
//! ```text
//!  probe ok ─────────────────────────────> Healthy
//!  probe failed, session not Degraded ───> Ignored
//!  probe failed, session Degraded
//!     ├─ no attempts left ──> abandon() ─> Err(ReconnectExhausted)
//!     └─ reconnect()
//!          ├─ ok ─> budget restored ─────> Reconnected (heartbeat restarted)
//!          └─ failed ────────────────────> ReconnectFailed { remaining }
//! ```

mod probe;

pub use probe::{from_config as probe_from_config, ConnectivityProbe, HttpProbe, TcpProbe};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::ReconnectPolicy;
use crate::error::{DrcomError, Result};
use crate::heartbeat::{shutdown_requested, Heartbeat};
use crate::session::{SessionState, SharedSession};

/// Result of one supervisor tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Probe succeeded
    Healthy,
    /// Probe failed but the session is not Degraded
    Ignored,
    /// Relogin succeeded; the budget is full again
    Reconnected,
    /// Relogin failed
    ReconnectFailed {
        /// Attempts left before giving up
        remaining: u32,
    },
}

/// Watches connectivity and logs in again after heartbeat failures.
pub struct Supervisor {
    session: SharedSession,
    probe: Box<dyn ConnectivityProbe>,
    heartbeat: Arc<Heartbeat>,
    policy: ReconnectPolicy,
    remaining: u32,
}

impl Supervisor {
    /// Create a supervisor with a full attempt budget.
    pub fn new(
        session: SharedSession,
        probe: Box<dyn ConnectivityProbe>,
        heartbeat: Arc<Heartbeat>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            session,
            probe,
            heartbeat,
            remaining: policy.max_relogin_attempts,
            policy,
        }
    }

    /// Relogin attempts left
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Probe once and react.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let failure = match self.probe.check().await {
            Ok(()) => return Ok(TickOutcome::Healthy),
            Err(e) => e,
        };
        tracing::warn!("Connectivity probe ({}) failed: {}", self.probe.name(), failure);

        let mut session = self.session.lock().await;
        if session.state() != SessionState::Degraded {
            return Ok(TickOutcome::Ignored);
        }

        if self.remaining == 0 {
            let err = DrcomError::ReconnectExhausted {
                attempts: self.policy.max_relogin_attempts,
            };
            tracing::error!(session = %session.id(), "{}", err);
            session.abandon()?;
            return Err(session.report(err));
        }

        self.remaining -= 1;
        tracing::info!(
            session = %session.id(),
            "Reconnecting ({} attempt(s) left after this one)",
            self.remaining
        );

        match session.reconnect().await {
            Ok(()) => {
                self.remaining = self.policy.max_relogin_attempts;
                Ok(TickOutcome::Reconnected)
            },
            Err(e) => {
                tracing::warn!("Reconnect failed: {}", e);
                Ok(TickOutcome::ReconnectFailed {
                    remaining: self.remaining,
                })
            },
        }
    }

    /// Tick every `check_interval` until shutdown or a fatal error.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.policy.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the session was just checked
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = shutdown_requested(&mut shutdown) => return Ok(()),
                _ = ticker.tick() => {},
            }

            match self.tick().await {
                Ok(TickOutcome::Reconnected) => self.heartbeat.start().await,
                Ok(outcome) => tracing::debug!("Supervisor tick: {:?}", outcome),
                Err(e) if e.is_fatal() => {
                    self.heartbeat.stop().await;
                    return Err(e);
                },
                Err(e) => tracing::warn!("Supervisor tick failed: {}", e),
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("probe", &self.probe.name())
            .field("policy", &self.policy)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}
