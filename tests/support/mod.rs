//! Shared test harness: a scripted DrCOM authentication server.
//!
//! `MockServer` answers every request kind the client sends and records
//! each datagram it receives, so tests can assert on exact wire content.
//! Behaviour can be changed while the server runs (go silent, refuse a
//! login, reject a logout).

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use drcom::config::{Config, RetryPolicy};
use drcom::{LocalIdentity, Session, SharedSession, Transport};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Salt handed out in discovery replies.
pub const SALT: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

/// Token handed out in login replies.
pub const AUTH_INFO: [u8; 16] = [
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
];

/// MAC of the test identity.
pub const MAC: [u8; 6] = [0x00, 0x1a, 0x26, 0x4a, 0x7b, 0x0d];

/// Server-side knobs.
#[derive(Debug, Clone)]
pub struct Script {
    /// Drop every request without answering
    pub silent: bool,
    /// Answer logins with `05` and this detail byte
    pub login_failure: Option<u8>,
    /// First byte of the logout-record reply
    pub logout_ack: u8,
    /// Heartbeat replies sent so far (drives the rolling key)
    pub heartbeat_replies: u8,
    /// Stop answering heartbeats once this many replies were sent
    pub heartbeat_limit: Option<u8>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            silent: false,
            login_failure: None,
            logout_ack: 0x04,
            heartbeat_replies: 0,
            heartbeat_limit: None,
        }
    }
}

/// Key carried by the `n`th heartbeat reply.
pub fn key_for(n: u8) -> [u8; 4] {
    [0xa0 ^ n, 0xb0 ^ n, 0xc0 ^ n, n]
}

/// Compute the reply for one request.
fn respond(script: &mut Script, request: &[u8]) -> Option<Vec<u8>> {
    if script.silent || request.len() < 2 {
        return None;
    }

    match (request[0], request[1]) {
        (0x01, 0x02) => {
            let mut reply = vec![0u8; 32];
            reply[..4].copy_from_slice(&[0x02, 0x02, request[2], request[3]]);
            reply[4..8].copy_from_slice(&SALT);
            Some(reply)
        },
        (0x03, 0x01) => {
            let mut reply = vec![0u8; 48];
            match script.login_failure {
                Some(code) => {
                    reply[0] = 0x05;
                    reply[32] = code;
                },
                None => {
                    reply[0] = 0x04;
                    reply[23..39].copy_from_slice(&AUTH_INFO);
                },
            }
            Some(reply)
        },
        (0xff, _) => {
            let mut reply = vec![0u8; 32];
            reply[0] = 0x07;
            Some(reply)
        },
        (0x07, _) => {
            if script
                .heartbeat_limit
                .is_some_and(|limit| script.heartbeat_replies >= limit)
            {
                return None;
            }
            let mut reply = vec![0u8; 40];
            reply[0] = 0x07;
            reply[16..20].copy_from_slice(&key_for(script.heartbeat_replies));
            script.heartbeat_replies = script.heartbeat_replies.wrapping_add(1);
            Some(reply)
        },
        (0x01, 0x03) => {
            let mut reply = vec![0u8; 32];
            reply[..2].copy_from_slice(&[0x02, 0x03]);
            Some(reply)
        },
        (0x06, 0x01) => {
            let mut reply = vec![0u8; 32];
            reply[0] = script.logout_ack;
            Some(reply)
        },
        _ => None,
    }
}

/// Running mock server.
pub struct MockServer {
    addr: SocketAddr,
    script: Arc<Mutex<Script>>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Start on an ephemeral loopback port.
    pub async fn start() -> Self {
        Self::start_with(Script::default()).await
    }

    /// Start with a custom script.
    pub async fn start_with(script: Script) -> Self {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = socket.local_addr().unwrap();
        let script = Arc::new(Mutex::new(script));
        let received = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let script = Arc::clone(&script);
            let received = Arc::clone(&received);
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                loop {
                    let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                        continue;
                    };
                    let request = buf[..len].to_vec();
                    let reply = respond(&mut script.lock().unwrap(), &request);
                    received.lock().unwrap().push(request);
                    if let Some(reply) = reply {
                        let _ = socket.send_to(&reply, from).await;
                    }
                }
            })
        };

        Self {
            addr,
            script,
            received,
            task,
        }
    }

    /// Listening address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every datagram received so far
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }

    /// Number of datagrams received so far
    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    /// Datagrams received since index `from`
    pub fn received_since(&self, from: usize) -> Vec<Vec<u8>> {
        self.received.lock().unwrap()[from..].to_vec()
    }

    /// Change the script in place
    pub fn update(&self, change: impl FnOnce(&mut Script)) {
        change(&mut self.script.lock().unwrap());
    }

    /// Config pointing at this server with fast retries.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.server.candidates = vec![Ipv4Addr::LOCALHOST];
        config.server.port = self.addr.port();
        config.network.local_port = 0;
        config.network.local_ip = Some(Ipv4Addr::new(10, 0, 0, 2));
        config.network.local_mac = Some(hex::encode(MAC));
        config.network.hostname = Some("lab-pc".to_string());
        config.retry = RetryPolicy::new(2, Duration::from_millis(200));
        config
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Test identity matching [`MockServer::config`].
pub fn identity() -> LocalIdentity {
    LocalIdentity::new("lab-pc", MAC, Ipv4Addr::new(10, 0, 0, 2)).unwrap()
}

/// Idle session bound to an ephemeral port.
pub async fn session(config: &Config) -> Session {
    let transport = Transport::bind((Ipv4Addr::LOCALHOST, 0).into()).await.unwrap();
    Session::new(transport, identity(), config)
}

/// Idle session behind the exchange mutex.
pub async fn shared_session(config: &Config) -> SharedSession {
    Arc::new(tokio::sync::Mutex::new(session(config).await))
}
