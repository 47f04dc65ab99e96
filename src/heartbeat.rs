//! Background heartbeat scheduler.
//!
//! While the session is Online, one heartbeat round runs per interval
//! (the first immediately). A failed round demotes the session to Degraded
//! and ends the task; the reconnection supervisor starts a fresh one after
//! a successful relogin.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::DrcomError;
use crate::session::{SessionState, SharedSession};

/// Why a heartbeat task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// Shutdown was signalled or the exchange was interrupted
    Stopped,
    /// A round failed and the session was degraded
    Degraded,
    /// The session left Online for some other reason
    NotOnline(SessionState),
}

/// Run heartbeat rounds until shutdown or failure.
pub async fn run(
    session: SharedSession,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> HeartbeatExit {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = shutdown_requested(&mut shutdown) => return HeartbeatExit::Stopped,
            _ = ticker.tick() => {},
        }

        let mut session = session.lock().await;
        let state = session.state();
        if state != SessionState::Online {
            tracing::debug!("Heartbeat ending, session is {}", state);
            return HeartbeatExit::NotOnline(state);
        }

        match session.heartbeat_round().await {
            Ok(()) => {},
            Err(DrcomError::TransportTimeout {
                interrupted: true, ..
            }) => return HeartbeatExit::Stopped,
            Err(e) => {
                if let Err(t) = session.degrade(&e) {
                    tracing::warn!("Could not degrade session: {}", t);
                }
                return HeartbeatExit::Degraded;
            },
        }
    }
}

/// Restartable heartbeat task shared by the client and the supervisor.
#[derive(Debug)]
pub struct Heartbeat {
    session: SharedSession,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
    handle: Mutex<Option<JoinHandle<HeartbeatExit>>>,
}

impl Heartbeat {
    /// Create a stopped heartbeat
    pub fn new(
        session: SharedSession,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            interval,
            shutdown,
            handle: Mutex::new(None),
        })
    }

    /// Spawn a new task unless one is still running.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("Heartbeat already running");
            return;
        }
        *handle = Some(tokio::spawn(run(
            Arc::clone(&self.session),
            self.interval,
            self.shutdown.clone(),
        )));
        tracing::debug!("Heartbeat started (every {:?})", self.interval);
    }

    /// Wait for the task to return. `None` if it was not running.
    ///
    /// The task only returns between rounds, on shutdown, or when an
    /// interrupted exchange fails; signal one of those first.
    pub async fn stop(&self) -> Option<HeartbeatExit> {
        let handle = self.handle.lock().await.take()?;
        match handle.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                tracing::warn!("Heartbeat task failed: {}", e);
                None
            },
        }
    }

    /// Whether a task exists and has not finished
    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

/// Resolve once `shutdown` reads `true` or its sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
