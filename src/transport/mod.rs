//! UDP transport for DrCOM exchanges.
//!
//! Every exchange is a single request datagram answered by a single
//! response. [`Transport::send_and_receive`] wraps that in a bounded retry
//! loop:
//!
//! ```text
//!  attempt 1..=max_attempts
//!    ├─ interrupt set?  ──────────────> TransportTimeout { interrupted }
//!    ├─ drain stale datagrams (non-blocking)
//!    ├─ send_to(destination)
//!    └─ recv_from  ─┬─ datagram ─────> Ok((bytes, source))
//!                   ├─ timeout / error / empty → next attempt
//!                   └─ interrupt ────> TransportTimeout { interrupted }
//!  exhausted ───────────────────────> TransportTimeout { attempts, last_packet }
//! ```
//!
//! The transport does no locking of its own; callers serialize exchanges
//! through the session's exchange mutex. The [`Interrupt`] lives outside
//! that mutex so a blocked exchange can be aborted from another task.

mod stats;

pub use stats::{StatsSummary, TransportStats};

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::config::RetryPolicy;
use crate::error::{DrcomError, Result};

/// Receive buffer size; server replies are well under this.
const RECV_BUFFER: usize = 2048;

/// Cancellation flag for in-flight exchanges.
///
/// Clones share state. Setting the flag makes the current and every later
/// exchange fail fast until it is cleared.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
}

impl Interrupt {
    /// New, cleared flag
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Abort in-flight and future exchanges
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Allow exchanges again
    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    /// Whether the flag is raised
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the flag is raised.
    pub async fn raised(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this can only return Ok
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

/// UDP socket with retrying request/response exchanges.
#[derive(Debug)]
pub struct Transport {
    socket: UdpSocket,
    interrupt: Interrupt,
    stats: Arc<TransportStats>,
}

impl Transport {
    /// Bind to `addr` (normally `0.0.0.0:61440`).
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::debug!("Transport bound to {}", socket.local_addr()?);
        Ok(Self {
            socket,
            interrupt: Interrupt::new(),
            stats: Arc::new(TransportStats::new()),
        })
    }

    /// Local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Handle to this transport's interrupt flag
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Shared statistics
    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    /// Send `packet` to `destination` and wait for one response.
    ///
    /// Returns the response bytes and the address they came from.
    pub async fn send_and_receive(
        &self,
        packet: &[u8],
        destination: SocketAddr,
        policy: &RetryPolicy,
    ) -> Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; RECV_BUFFER];
        let mut sent = 0u32;

        for attempt in 1..=policy.max_attempts {
            if self.interrupt.is_set() {
                return Err(self.timeout(sent, true, packet));
            }

            self.drain_stale(&mut buf);

            if let Err(e) = self.socket.send_to(packet, destination).await {
                tracing::warn!("Send to {} failed (attempt {}): {}", destination, attempt, e);
                self.stats.record_timeout();
                continue;
            }
            sent += 1;
            self.stats.record_sent(packet.len());
            tracing::debug!(
                "-> {} [{} bytes] attempt {}/{}",
                destination,
                packet.len(),
                attempt,
                policy.max_attempts
            );

            let received = tokio::select! {
                () = self.interrupt.raised() => {
                    return Err(self.timeout(sent, true, packet));
                },
                result = tokio::time::timeout(
                    policy.per_attempt_timeout(),
                    self.socket.recv_from(&mut buf),
                ) => result,
            };

            match received {
                Ok(Ok((len, source))) if len > 0 => {
                    self.stats.record_received(len);
                    tracing::debug!("<- {} [{} bytes]", source, len);
                    return Ok((buf[..len].to_vec(), source));
                },
                Ok(Ok((_, source))) => {
                    tracing::warn!("Empty datagram from {} (attempt {})", source, attempt);
                },
                Ok(Err(e)) => {
                    tracing::warn!("Receive failed (attempt {}): {}", attempt, e);
                },
                Err(_) => {
                    tracing::warn!(
                        "No reply from {} within {:?} (attempt {}/{})",
                        destination,
                        policy.per_attempt_timeout(),
                        attempt,
                        policy.max_attempts
                    );
                },
            }
            self.stats.record_timeout();
        }

        Err(self.timeout(sent, false, packet))
    }

    /// Discard anything already queued on the socket.
    fn drain_stale(&self, buf: &mut [u8]) {
        loop {
            match self.socket.try_recv_from(buf) {
                Ok((len, source)) => {
                    self.stats.record_stale();
                    tracing::debug!("Dropped stale datagram from {} [{} bytes]", source, len);
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::debug!("Drain stopped: {}", e);
                    break;
                },
            }
        }
    }

    fn timeout(&self, attempts: u32, interrupted: bool, packet: &[u8]) -> DrcomError {
        DrcomError::TransportTimeout {
            attempts,
            interrupted,
            last_packet: packet.to_vec(),
        }
    }
}
