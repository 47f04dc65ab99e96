//! # drcom - DrCOM Campus Network Authentication
//!
//! Client-side protocol engine for the DrCOM UDP authentication handshake
//! used by many campus networks: server discovery, challenge-response
//! login, periodic heartbeats and logout, plus a supervisor that logs in
//! again when connectivity drops.
//!
//! ## Protocol Overview
//!
//! ```text
//! Client (udp/61440)                               Auth server (udp/61440)
//!    |                                                  |
//!    |------ 01 02 <nonce> (discovery) ---------------->|
//!    |<----- 02 02 <nonce> <salt> ----------------------|
//!    |                                                  |
//!    |------ 03 01 ... (330-byte login record) -------->|
//!    |<----- 04 ... <auth_info> | 05 ... <reason> ------|
//!    |                                                  |
//!    |------ ff ... (probe) ---------------------------->|  every interval
//!    |<----- 07 ----------------------------------------|
//!    |------ 07 <seq> ... cls 1 / cls 3 <key> --------->|
//!    |<----- 07 ... <next key> -------------------------|
//!    |                                                  |
//!    |------ 01 03 (logout prelude) ------------------->|
//!    |<----- 02 03 -------------------------------------|
//!    |------ 06 01 ... <auth_info> -------------------->|
//!    |<----- 04 ----------------------------------------|
//! ```
//!
//! ### State Machine
//!
//! | From                       | To                                  |
//! |----------------------------|-------------------------------------|
//! | Idle, Offline, Degraded    | Discovering                         |
//! | Discovering                | Authenticating, Idle, Offline, Degraded |
//! | Degraded                   | Authenticating, LoggingOut, Offline |
//! | Authenticating             | Online, Degraded, Offline           |
//! | Online                     | Degraded, LoggingOut                |
//! | LoggingOut                 | Offline                             |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use drcom::{Client, Config, Credentials};
//!
//! let config = Config::load(None)?.with_env_overrides();
//! let credentials = Credentials::new("20210001", "secret")?;
//!
//! let mut client = Client::connect(config).await?;
//! let mut events = client.subscribe();
//! client.login(&credentials).await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: packet builders, response classification, checksums
//! - [`transport`]: retrying UDP exchange with stale-datagram draining
//! - [`session`]: the state machine and its events
//! - [`heartbeat`]: background keep-alive task
//! - [`reconnect`]: connectivity probes and the relogin supervisor
//! - [`client`]: facade tying it all to a [`Config`]

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod identity;
pub mod reconnect;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use client::Client;
pub use config::{Config, ProtocolProfile, ReconnectPolicy, RetryPolicy};
pub use error::{AuthFailure, DrcomError, ErrorKind, Result};
pub use heartbeat::{Heartbeat, HeartbeatExit};
pub use identity::{Credentials, LocalIdentity};
pub use reconnect::{ConnectivityProbe, Supervisor, TickOutcome};
pub use session::{Discovery, Session, SessionContext, SessionEvent, SessionState, SharedSession};
pub use transport::{Interrupt, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
