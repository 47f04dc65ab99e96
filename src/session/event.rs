//! Observable session events.

use serde::Serialize;

use super::SessionState;
use crate::error::{DrcomError, ErrorKind};

/// Event published on the session's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A state transition took place
    StateChanged {
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },

    /// Human-readable progress message
    Status {
        /// Message text
        message: String,
    },

    /// An error was raised or absorbed
    Error {
        /// Error classification
        kind: ErrorKind,
        /// Display text
        message: String,
        /// Diagnostic bytes, hex encoded
        #[serde(skip_serializing_if = "Option::is_none")]
        packet_hex: Option<String>,
    },
}

impl SessionEvent {
    /// Status event
    pub fn status(message: impl Into<String>) -> Self {
        SessionEvent::Status {
            message: message.into(),
        }
    }
}

impl From<&DrcomError> for SessionEvent {
    fn from(err: &DrcomError) -> Self {
        SessionEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
            packet_hex: err.packet().map(hex::encode),
        }
    }
}
