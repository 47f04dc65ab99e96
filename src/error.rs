//! DrCOM client error types.
//!
//! Every failure the protocol engine can raise is a variant of [`DrcomError`].
//! Variants carry exactly the diagnostic payload they need (the packet that
//! was last sent, or the raw bytes that were received) so callers can
//! pattern-match instead of inspecting strings.
//!
//! # Propagation
//!
//! | Raised by          | Variants                                           |
//! |--------------------|----------------------------------------------------|
//! | Transport          | `TransportTimeout`, `Io`                           |
//! | Packet codec       | `Protocol`, `Auth`, `InvalidInput`                 |
//! | Session            | `DiscoveryExhausted`, `Precondition`, `InvalidTransition` |
//! | Supervisor         | `ReconnectExhausted`, `Network`                    |
//! | Client setup       | `Identity`, `Config`                               |

use serde::Serialize;
use thiserror::Error;

use crate::session::SessionState;

/// Reason a login was refused by the server (`0x05` response).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Detail byte `0x31`.
    #[error("wrong username")]
    BadUsername,

    /// Detail byte `0x33`.
    #[error("wrong password")]
    BadPassword,

    /// Any other detail byte, or none at all.
    #[error("login rejected (code {code:?})")]
    Rejected {
        /// Detail byte at offset 32, if the response was long enough.
        code: Option<u8>,
    },
}

/// DrCOM client errors.
#[derive(Error, Debug)]
pub enum DrcomError {
    /// Retry budget exhausted, or the exchange was interrupted mid-retry.
    #[error("Transport timeout after {attempts} attempt(s){}", interrupted_suffix(.interrupted))]
    TransportTimeout {
        /// Number of datagrams actually sent.
        attempts: u32,
        /// Set when the interrupt flag aborted the retry loop.
        interrupted: bool,
        /// The packet that was being exchanged.
        last_packet: Vec<u8>,
    },

    /// Unexpected discriminator, or a response too short to interpret.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Short description of what was expected.
        message: String,
        /// Raw bytes received.
        packet: Vec<u8>,
    },

    /// The server refused the credentials.
    #[error("Authentication failed: {0}")]
    Auth(AuthFailure),

    /// No candidate server acknowledged the discovery probe.
    #[error("No authentication server answered discovery")]
    DiscoveryExhausted {
        /// The discovery probe that went unanswered.
        last_packet: Vec<u8>,
    },

    /// Relogin attempts exhausted after repeated connectivity loss.
    #[error("Reconnect attempts exhausted ({attempts} used)")]
    ReconnectExhausted {
        /// Number of relogin attempts consumed before giving up.
        attempts: u32,
    },

    /// Operation invoked before its inputs exist (e.g. login before discovery).
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// State machine refused a transition.
    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },

    /// Caller-supplied value cannot be encoded (non-ASCII, too long, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Connectivity probe failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Local hostname/MAC/IP could not be resolved.
    #[error("Identity error: {0}")]
    Identity(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn interrupted_suffix(interrupted: &bool) -> &'static str {
    if *interrupted {
        " (interrupted)"
    } else {
        ""
    }
}

/// Result type alias for DrCOM operations
pub type Result<T> = std::result::Result<T, DrcomError>;

/// Stable, serializable tag for a [`DrcomError`], used in session events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`DrcomError::TransportTimeout`].
    TransportTimeout,
    /// See [`DrcomError::Protocol`].
    Protocol,
    /// See [`DrcomError::Auth`].
    Auth,
    /// See [`DrcomError::DiscoveryExhausted`].
    DiscoveryExhausted,
    /// See [`DrcomError::ReconnectExhausted`].
    ReconnectExhausted,
    /// Precondition, transition and input errors.
    Usage,
    /// Identity, config, network and I/O errors.
    Environment,
}

impl DrcomError {
    /// Shorthand for a protocol error over received bytes.
    pub fn protocol(message: impl Into<String>, packet: &[u8]) -> Self {
        DrcomError::Protocol {
            message: message.into(),
            packet: packet.to_vec(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DrcomError::TransportTimeout { .. } => ErrorKind::TransportTimeout,
            DrcomError::Protocol { .. } => ErrorKind::Protocol,
            DrcomError::Auth(_) => ErrorKind::Auth,
            DrcomError::DiscoveryExhausted { .. } => ErrorKind::DiscoveryExhausted,
            DrcomError::ReconnectExhausted { .. } => ErrorKind::ReconnectExhausted,
            DrcomError::Precondition(_)
            | DrcomError::InvalidTransition { .. }
            | DrcomError::InvalidInput(_) => ErrorKind::Usage,
            DrcomError::Network(_)
            | DrcomError::Identity(_)
            | DrcomError::Config(_)
            | DrcomError::Io(_) => ErrorKind::Environment,
        }
    }

    /// Diagnostic bytes attached to this error, if any.
    pub fn packet(&self) -> Option<&[u8]> {
        match self {
            DrcomError::TransportTimeout { last_packet, .. }
            | DrcomError::DiscoveryExhausted { last_packet } => Some(last_packet),
            DrcomError::Protocol { packet, .. } => Some(packet),
            _ => None,
        }
    }

    /// Whether the session can no longer recover on its own.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DrcomError::ReconnectExhausted { .. } | DrcomError::Identity(_) | DrcomError::Config(_)
        )
    }
}

impl From<reqwest::Error> for DrcomError {
    fn from(err: reqwest::Error) -> Self {
        DrcomError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for DrcomError {
    fn from(err: toml::de::Error) -> Self {
        DrcomError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DrcomError {
    fn from(err: toml::ser::Error) -> Self {
        DrcomError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_carries_last_packet() {
        let err = DrcomError::TransportTimeout {
            attempts: 3,
            interrupted: false,
            last_packet: vec![0x01, 0x02],
        };
        assert_eq!(err.kind(), ErrorKind::TransportTimeout);
        assert_eq!(err.packet(), Some(&[0x01, 0x02][..]));
        assert_eq!(err.to_string(), "Transport timeout after 3 attempt(s)");
    }

    #[test]
    fn test_interrupted_timeout_message() {
        let err = DrcomError::TransportTimeout {
            attempts: 1,
            interrupted: true,
            last_packet: Vec::new(),
        };
        assert!(err.to_string().ends_with("(interrupted)"));
    }

    #[test]
    fn test_auth_failure_display() {
        let err = DrcomError::Auth(AuthFailure::BadPassword);
        assert_eq!(err.to_string(), "Authentication failed: wrong password");
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.packet().is_none());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DrcomError::ReconnectExhausted { attempts: 3 }.is_fatal());
        assert!(!DrcomError::protocol("bad", &[0x09]).is_fatal());
    }
}
