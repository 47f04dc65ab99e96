//! Session-scoped protocol values.

use std::net::SocketAddr;

/// Result of a successful discovery exchange.
///
/// Server address and salt only ever exist together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discovery {
    /// Address the discovery reply came from
    pub server: SocketAddr,
    /// Salt for the login and logout hashes
    pub salt: [u8; 4],
}

/// Values learned from the server over the life of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    discovery: Option<Discovery>,
    auth_info: Option<[u8; 16]>,
    sequence: u32,
    key: [u8; 4],
}

impl SessionContext {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovered server and salt
    pub fn discovery(&self) -> Option<Discovery> {
        self.discovery
    }

    /// Token from the last login success
    pub fn auth_info(&self) -> Option<[u8; 16]> {
        self.auth_info
    }

    /// Heartbeat counter
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Rolling heartbeat key
    pub fn key(&self) -> [u8; 4] {
        self.key
    }

    pub(crate) fn set_discovery(&mut self, discovery: Discovery) {
        self.discovery = Some(discovery);
    }

    /// Store a fresh token and restart the heartbeat counters.
    pub(crate) fn set_auth_info(&mut self, auth_info: [u8; 16]) {
        self.auth_info = Some(auth_info);
        self.sequence = 0;
        self.key = [0; 4];
    }

    pub(crate) fn set_key(&mut self, key: [u8; 4]) {
        self.key = key;
    }

    /// A round sends two status heartbeats under one sequence value.
    pub(crate) fn advance_round(&mut self) {
        self.sequence = self.sequence.wrapping_add(2);
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_auth_info_resets_counters() {
        let mut ctx = SessionContext::new();
        ctx.set_key([1, 2, 3, 4]);
        ctx.advance_round();
        ctx.set_auth_info([7; 16]);
        assert_eq!(ctx.sequence(), 0);
        assert_eq!(ctx.key(), [0; 4]);
        assert_eq!(ctx.auth_info(), Some([7; 16]));
    }

    #[test]
    fn test_clear() {
        let mut ctx = SessionContext::new();
        ctx.set_discovery(Discovery {
            server: (Ipv4Addr::LOCALHOST, 61440).into(),
            salt: [1, 2, 3, 4],
        });
        ctx.set_auth_info([7; 16]);
        ctx.clear();
        assert_eq!(ctx, SessionContext::default());
    }

    #[test]
    fn test_sequence_wraps() {
        let mut ctx = SessionContext {
            sequence: u32::MAX - 1,
            ..SessionContext::default()
        };
        ctx.advance_round();
        assert_eq!(ctx.sequence(), 0);
    }
}
