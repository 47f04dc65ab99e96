//! High-level client.
//!
//! [`Client`] wires configuration, identity, transport and session together
//! and owns the two background tasks (heartbeat and supervisor).
//!
//! ```rust,ignore
//! use drcom::{Client, Config, Credentials};
//!
//! let config = Config::load(None)?.with_env_overrides();
//! let credentials = Credentials::new(&config.account.username, &config.account.password)?;
//!
//! let mut client = Client::connect(config).await?;
//! client.login(&credentials).await?;
//! // ... Online, heartbeating in the background ...
//! client.logout().await?;
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::Result;
use crate::heartbeat::Heartbeat;
use crate::identity::{Credentials, LocalIdentity};
use crate::reconnect::{self, Supervisor};
use crate::session::{Discovery, Session, SessionEvent, SessionState, SharedSession};
use crate::transport::{Interrupt, StatsSummary, Transport, TransportStats};

/// DrCOM client
pub struct Client {
    config: Config,
    session: SharedSession,
    events: broadcast::Sender<SessionEvent>,
    state: watch::Receiver<SessionState>,
    interrupt: Interrupt,
    stats: Arc<TransportStats>,
    shutdown: watch::Sender<bool>,
    heartbeat: Arc<Heartbeat>,
    supervisor: Option<JoinHandle<Result<()>>>,
}

impl Client {
    /// Validate `config`, resolve the local identity and bind the socket.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;

        let identity = LocalIdentity::resolve(&config.network).await?;
        let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.network.local_port));
        let transport = Transport::bind(bind).await?;
        let interrupt = transport.interrupt();
        let stats = transport.stats();

        let session = Session::new(transport, identity, &config);
        tracing::info!(session = %session.id(), "Client ready on {}", bind);
        let events = session.event_sender();
        let state = session.watch_state();
        let session = Arc::new(Mutex::new(session));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let heartbeat = Heartbeat::new(
            Arc::clone(&session),
            config.heartbeat.interval(),
            shutdown_rx,
        );

        Ok(Self {
            config,
            session,
            events,
            state,
            interrupt,
            stats,
            shutdown,
            heartbeat,
            supervisor: None,
        })
    }

    /// Discover a server without logging in.
    pub async fn discover(&self) -> Result<Discovery> {
        self.session.lock().await.discover().await
    }

    /// Discover, authenticate and start the background tasks.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        self.stop_tasks().await;
        self.interrupt.clear();
        self.shutdown.send_replace(false);

        {
            let mut session = self.session.lock().await;
            // A refused login leaves the session in Authenticating
            if session.state() == SessionState::Authenticating {
                session.abandon()?;
            }
            session.discover().await?;
            session.authenticate(credentials).await?;
        }

        self.heartbeat.start().await;
        if self.config.reconnect.enabled {
            let probe = reconnect::probe_from_config(&self.config.probe)?;
            let supervisor = Supervisor::new(
                Arc::clone(&self.session),
                probe,
                Arc::clone(&self.heartbeat),
                self.config.reconnect.clone(),
            );
            self.supervisor = Some(tokio::spawn(supervisor.run(self.shutdown.subscribe())));
        }
        Ok(())
    }

    /// Stop the background tasks and log out.
    ///
    /// An exchange in flight is interrupted, not cancelled, so it restores
    /// its own state first. A session caught mid-handshake is abandoned.
    pub async fn logout(&mut self) -> Result<()> {
        self.interrupt.set();
        self.stop_tasks().await;
        self.interrupt.clear();

        let mut session = self.session.lock().await;
        match session.state() {
            SessionState::Discovering | SessionState::Authenticating => session.abandon(),
            _ => session.logout().await,
        }
    }

    /// Stop everything; log out first if a session was started.
    pub async fn shutdown(mut self) -> Result<()> {
        match self.state() {
            SessionState::Idle | SessionState::Offline => {
                self.interrupt.set();
                self.stop_tasks().await;
                Ok(())
            },
            _ => self.logout().await,
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Shared session, for callers that drive exchanges directly
    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    /// Transport counters
    pub fn stats(&self) -> StatsSummary {
        self.stats.summary()
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the supervisor task is alive
    pub fn supervisor_running(&self) -> bool {
        self.supervisor.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal shutdown and wait for both tasks to return on their own.
    async fn stop_tasks(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.supervisor.take() {
            match handle.await {
                Ok(Err(e)) => tracing::warn!("Supervisor ended with error: {}", e),
                Ok(Ok(())) => {},
                Err(e) => tracing::warn!("Supervisor task failed: {}", e),
            }
        }
        if let Some(exit) = self.heartbeat.stop().await {
            tracing::debug!("Heartbeat ended: {:?}", exit);
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("supervisor_running", &self.supervisor_running())
            .finish_non_exhaustive()
    }
}
