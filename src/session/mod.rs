//! DrCOM session state machine.
//!
//! A [`Session`] owns the transport and every value learned from the
//! server, and runs each protocol exchange end to end.
//!
//! ```text
//!                 discover()                authenticate()
//!   [Idle] ───────────────> [Discovering] ───────────────> [Authenticating]
//!     ^                          │  │                          │
//!     └──────── exhausted ───────┘  │                          │ 04
//!                                   │                          v
//!   [Offline] <── logout() ── [LoggingOut] <── logout() ── [Online]
//!       ^                          ^                           │
//!       │ abandon()                │ logout()                  │ degrade()
//!       └──────────────────── [Degraded] <─────────────────────┘
//!                                  │  ^
//!                     reconnect()  │  │ failure
//!                                  └──┘
//! ```
//!
//! Callers share a session through `Arc<tokio::sync::Mutex<Session>>`;
//! holding the lock for the whole exchange keeps at most one exchange in
//! flight. Every state change is published as a [`SessionEvent`] and on a
//! `watch` channel.

mod context;
mod event;

pub use context::{Discovery, SessionContext};
pub use event::SessionEvent;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};

use crate::codec::{self, HeartbeatClass, ResponseKind};
use crate::config::{Config, ProtocolProfile, RetryPolicy};
use crate::error::{DrcomError, Result};
use crate::identity::{Credentials, LocalIdentity};
use crate::transport::{Interrupt, Transport};

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 64;

/// Session behind the exchange mutex
pub type SharedSession = Arc<Mutex<Session>>;

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing attempted yet
    Idle,
    /// Probing candidate servers
    Discovering,
    /// Login record sent, waiting for the verdict
    Authenticating,
    /// Logged in and heartbeating
    Online,
    /// Heartbeat failed; reconnect pending
    Degraded,
    /// Logout exchange in progress
    LoggingOut,
    /// Logged out or given up
    Offline,
}

impl SessionState {
    /// Whether the transition table allows `self -> to`.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle | Offline | Degraded, Discovering)
                | (Discovering, Authenticating | Idle | Offline | Degraded)
                | (Degraded, Authenticating | LoggingOut | Offline)
                | (Authenticating, Online | Degraded | Offline)
                | (Online, Degraded | LoggingOut)
                | (LoggingOut, Offline)
        )
    }

    /// Lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Authenticating => "authenticating",
            Self::Online => "online",
            Self::Degraded => "degraded",
            Self::LoggingOut => "logging_out",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// DrCOM session
pub struct Session {
    /// Session ID for log correlation
    id: String,
    /// Current state
    state: SessionState,
    /// Server-derived values
    context: SessionContext,
    /// Credentials of the last successful login
    credentials: Option<Credentials>,
    identity: LocalIdentity,
    profile: ProtocolProfile,
    servers: Vec<SocketAddr>,
    retry: RetryPolicy,
    transport: Transport,
    events: broadcast::Sender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    /// Create an idle session over `transport`.
    pub fn new(transport: Transport, identity: LocalIdentity, config: &Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::Idle,
            context: SessionContext::new(),
            credentials: None,
            identity,
            profile: config.profile.clone(),
            servers: config.server.addrs(),
            retry: config.retry,
            transport,
            events,
            state_tx,
        }
    }

    /// Get session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Server-derived values
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Local identity used in every record
    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// Underlying transport
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Interrupt flag of the underlying transport
    pub fn interrupt(&self) -> Interrupt {
        self.transport.interrupt()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Watch the current state
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    /// Move to `to` if the transition table allows it.
    pub(crate) fn transition(&mut self, to: SessionState) -> Result<()> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(DrcomError::InvalidTransition { from, to });
        }

        self.state = to;
        tracing::info!(session = %self.id, "State {} -> {}", from, to);
        self.state_tx.send_replace(to);
        self.emit(SessionEvent::StateChanged { from, to });
        Ok(())
    }

    /// Probe candidate servers with a random nonce.
    pub async fn discover(&mut self) -> Result<Discovery> {
        self.discover_with_nonce(rand::random()).await
    }

    /// Probe candidate servers in order; the first matching reply wins.
    ///
    /// Running it again from Discovering replaces the earlier result.
    pub async fn discover_with_nonce(&mut self, nonce: u16) -> Result<Discovery> {
        let previous = self.state;
        if previous != SessionState::Discovering {
            self.transition(SessionState::Discovering)?;
        }
        self.context.clear();

        let probe = codec::build_discovery(nonce);
        for server in self.servers.clone() {
            tracing::debug!(session = %self.id, "Discovery probe to {} (nonce {:04x})", server, nonce);

            match self.transport.send_and_receive(&probe, server, &self.retry).await {
                Ok((reply, source)) => match codec::discovery_salt(&reply, nonce) {
                    Some(salt) => {
                        let discovery = Discovery {
                            server: source,
                            salt,
                        };
                        self.context.set_discovery(discovery);
                        tracing::info!(session = %self.id, "Discovered server {}", source);
                        self.emit(SessionEvent::status(format!(
                            "Authentication server found at {source}"
                        )));
                        return Ok(discovery);
                    },
                    None => {
                        tracing::warn!(
                            "Ignoring unrelated reply from {}: {}",
                            source,
                            hex::encode(&reply)
                        );
                    },
                },
                Err(DrcomError::TransportTimeout {
                    interrupted: false, ..
                }) => {
                    tracing::warn!("No discovery reply from {}", server);
                },
                Err(e) => {
                    self.return_to(previous)?;
                    return Err(self.report(e));
                },
            }
        }

        self.return_to(previous)?;
        Err(self.report(DrcomError::DiscoveryExhausted {
            last_packet: probe.to_vec(),
        }))
    }

    /// Send the login record. Requires a completed discovery.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let discovery = self.context.discovery().ok_or_else(|| {
            DrcomError::Precondition("login requires a discovered server and salt".to_string())
        })?;

        if self.state != SessionState::Authenticating {
            self.transition(SessionState::Authenticating)?;
        }

        let packet = codec::build_login(&self.profile, &self.identity, credentials, &discovery.salt);
        let auth_info = match self.exchange(&packet, discovery.server).await {
            Ok(reply) => codec::expect_login(&reply),
            Err(e) => Err(e),
        }
        .map_err(|e| self.report(e))?;

        self.context.set_auth_info(auth_info);
        self.credentials = Some(credentials.clone());
        tracing::info!(session = %self.id, "Logged in as {}", credentials.username());
        self.emit(SessionEvent::status(format!(
            "Logged in as {}",
            credentials.username()
        )));
        self.transition(SessionState::Online)
    }

    /// One keep-alive round: probe, class-1 and class-3 heartbeats.
    pub async fn heartbeat_round(&mut self) -> Result<()> {
        if self.state != SessionState::Online {
            return Err(DrcomError::Precondition(format!(
                "heartbeat requires an online session, state is {}",
                self.state
            )));
        }
        let (discovery, auth_info) = self.authenticated_context()?;
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            DrcomError::Precondition("heartbeat requires stored credentials".to_string())
        })?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let probe = codec::build_heartbeat_probe(credentials, &discovery.salt, &auth_info, timestamp);
        let reply = self.exchange(&probe, discovery.server).await?;
        codec::expect_kind(&reply, ResponseKind::Heartbeat)?;

        // Committed only once both classes are acknowledged
        let sequence = self.context.sequence();
        let mut key = self.context.key();
        for class in [HeartbeatClass::One, HeartbeatClass::Three] {
            let packet =
                codec::build_heartbeat(&self.profile, sequence, &key, class, self.identity.ip());
            let reply = self.exchange(&packet, discovery.server).await?;
            key = codec::expect_heartbeat(&reply)?;
        }

        self.context.set_key(key);
        self.context.advance_round();
        tracing::debug!(
            session = %self.id,
            "Heartbeat round ok (seq {} key {})",
            sequence,
            hex::encode(self.context.key())
        );
        Ok(())
    }

    /// Demote an online session after a failed heartbeat.
    pub fn degrade(&mut self, reason: &DrcomError) -> Result<()> {
        tracing::warn!(session = %self.id, "Connection degraded: {}", reason);
        self.emit(SessionEvent::from(reason));
        self.transition(SessionState::Degraded)
    }

    /// Log out. Best effort: always ends Offline.
    pub async fn logout(&mut self) -> Result<()> {
        if !matches!(self.state, SessionState::Online | SessionState::Degraded) {
            return Err(DrcomError::Precondition(format!(
                "logout requires an authenticated session, state is {}",
                self.state
            )));
        }

        self.transition(SessionState::LoggingOut)?;

        match self.logout_exchange().await {
            Ok(()) => {
                tracing::info!(session = %self.id, "Logged out");
                self.emit(SessionEvent::status("Logged out"));
            },
            Err(e) => {
                tracing::warn!(session = %self.id, "Logout incomplete: {}", e);
                self.emit(SessionEvent::status(format!("Logout incomplete: {e}")));
            },
        }

        self.context.clear();
        self.credentials = None;
        self.transition(SessionState::Offline)
    }

    /// Log in again from Degraded with the stored credentials.
    ///
    /// On failure the session is back in Degraded.
    pub async fn reconnect(&mut self) -> Result<()> {
        if self.state != SessionState::Degraded {
            return Err(DrcomError::Precondition(format!(
                "reconnect requires a degraded session, state is {}",
                self.state
            )));
        }
        let credentials = self.credentials.clone().ok_or_else(|| {
            DrcomError::Precondition("reconnect requires stored credentials".to_string())
        })?;

        // Release the stale server-side session first
        if let Err(e) = self.logout_exchange().await {
            tracing::debug!("Pre-reconnect logout skipped: {}", e);
        }

        self.discover().await?;
        if let Err(e) = self.authenticate(&credentials).await {
            self.transition(SessionState::Degraded)?;
            return Err(e);
        }
        Ok(())
    }

    /// Drop all session values and go Offline.
    pub fn abandon(&mut self) -> Result<()> {
        self.context.clear();
        self.credentials = None;
        if self.state == SessionState::Offline {
            return Ok(());
        }
        self.transition(SessionState::Offline)
    }

    /// Go back to `previous` unless already there.
    fn return_to(&mut self, previous: SessionState) -> Result<()> {
        if self.state == previous {
            return Ok(());
        }
        self.transition(previous)
    }

    /// Prelude and logout record, without touching the state.
    async fn logout_exchange(&self) -> Result<()> {
        let (discovery, auth_info) = self.authenticated_context()?;
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            DrcomError::Precondition("logout requires stored credentials".to_string())
        })?;

        let reply = self
            .exchange(&codec::build_logout_prelude(), discovery.server)
            .await?;
        codec::expect_logout_challenge(&reply)?;

        let packet = codec::build_logout(
            &self.profile,
            &self.identity,
            credentials,
            &discovery.salt,
            &auth_info,
        );
        let reply = self.exchange(&packet, discovery.server).await?;
        codec::expect_kind(&reply, ResponseKind::Success)
    }

    fn authenticated_context(&self) -> Result<(Discovery, [u8; 16])> {
        match (self.context.discovery(), self.context.auth_info()) {
            (Some(discovery), Some(auth_info)) => Ok((discovery, auth_info)),
            _ => Err(DrcomError::Precondition(
                "no authenticated session context".to_string(),
            )),
        }
    }

    async fn exchange(&self, packet: &[u8], server: SocketAddr) -> Result<Vec<u8>> {
        let (reply, _) = self
            .transport
            .send_and_receive(packet, server, &self.retry)
            .await?;
        Ok(reply)
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Publish `err` as an event and hand it back.
    pub(crate) fn report(&self, err: DrcomError) -> DrcomError {
        self.emit(SessionEvent::from(&err));
        err
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("context", &self.context)
            .field("servers", &self.servers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    use SessionState::*;

    const ALL: [SessionState; 7] = [
        Idle,
        Discovering,
        Authenticating,
        Online,
        Degraded,
        LoggingOut,
        Offline,
    ];

    async fn session_against(server: SocketAddr) -> Session {
        let transport = Transport::bind((Ipv4Addr::LOCALHOST, 0).into()).await.unwrap();
        let identity =
            LocalIdentity::new("lab-pc", [0, 0x1a, 0x26, 0x4a, 0x7b, 0x0d], Ipv4Addr::new(10, 0, 0, 2))
                .unwrap();
        let mut config = Config::default();
        config.server.candidates = vec![Ipv4Addr::LOCALHOST];
        config.server.port = server.port();
        config.retry = RetryPolicy::new(1, Duration::from_millis(100));
        Session::new(transport, identity, &config)
    }

    #[test]
    fn test_transition_table() {
        let legal = [
            (Idle, Discovering),
            (Offline, Discovering),
            (Degraded, Discovering),
            (Discovering, Authenticating),
            (Discovering, Idle),
            (Discovering, Offline),
            (Discovering, Degraded),
            (Degraded, Authenticating),
            (Authenticating, Online),
            (Authenticating, Degraded),
            (Authenticating, Offline),
            (Online, Degraded),
            (Online, LoggingOut),
            (Degraded, LoggingOut),
            (Degraded, Offline),
            (LoggingOut, Offline),
        ];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&LoggingOut).unwrap(), r#""logging_out""#);
        assert_eq!(LoggingOut.to_string(), "logging_out");
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let mut session = session_against(silent.local_addr().unwrap()).await;
        let mut events = session.subscribe();

        let err = session.transition(Online).unwrap_err();
        assert!(matches!(err, DrcomError::InvalidTransition { from: Idle, to: Online }));
        assert_eq!(session.state(), Idle);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transition_publishes() {
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let mut session = session_against(silent.local_addr().unwrap()).await;
        let mut events = session.subscribe();
        let state = session.watch_state();

        session.transition(Discovering).unwrap();
        assert_eq!(*state.borrow(), Discovering);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::StateChanged {
                from: Idle,
                to: Discovering
            }
        );
    }

    #[tokio::test]
    async fn test_discovery_exhaustion_restores_state() {
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let mut session = session_against(silent.local_addr().unwrap()).await;

        let err = session.discover_with_nonce(0x1234).await.unwrap_err();
        match err {
            DrcomError::DiscoveryExhausted { last_packet } => {
                assert_eq!(&last_packet[..4], &[0x01, 0x02, 0x34, 0x12]);
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.state(), Idle);
        assert!(session.context().discovery().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_requires_discovery() {
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let mut session = session_against(silent.local_addr().unwrap()).await;
        let creds = Credentials::new("20210001", "secret").unwrap();

        let err = session.authenticate(&creds).await.unwrap_err();
        assert!(matches!(err, DrcomError::Precondition(_)));
        assert_eq!(session.state(), Idle);
        assert_eq!(session.transport().stats().sent(), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_requires_online() {
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let mut session = session_against(silent.local_addr().unwrap()).await;
        assert!(matches!(
            session.heartbeat_round().await,
            Err(DrcomError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_requires_login() {
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let mut session = session_against(silent.local_addr().unwrap()).await;
        assert!(matches!(session.logout().await, Err(DrcomError::Precondition(_))));
        assert_eq!(session.state(), Idle);
    }

    #[tokio::test]
    async fn test_abandon_from_idle_is_illegal() {
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let mut session = session_against(silent.local_addr().unwrap()).await;
        assert!(session.abandon().is_err());

        session.transition(Discovering).unwrap();
        session.abandon().unwrap();
        assert_eq!(session.state(), Offline);
        // Idempotent once Offline
        session.abandon().unwrap();
    }
}
