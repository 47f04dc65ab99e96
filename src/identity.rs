//! Credentials and local network identity.
//!
//! The protocol encodes usernames, passwords and host names as raw ASCII,
//! so everything here is validated once at construction and can be used by
//! the packet codec without further checks.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use tokio::net::UdpSocket;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{parse_mac, NetworkConfig};
use crate::error::{DrcomError, Result};

/// Width of the username field in login and logout records.
pub const USERNAME_FIELD_LEN: usize = 36;

/// Width of the host name field in the login record.
pub const HOSTNAME_FIELD_LEN: usize = 32;

/// Well-known address used to find the outbound interface. Nothing is sent.
const ROUTE_PROBE: (Ipv4Addr, u16) = (Ipv4Addr::new(114, 114, 114, 114), 80);

/// Username and password, validated as ASCII.
///
/// The buffers are wiped when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Validate and wrap credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();

        if !username.is_ascii() {
            return Err(DrcomError::InvalidInput(
                "username must be ASCII".to_string(),
            ));
        }
        if !password.is_ascii() {
            return Err(DrcomError::InvalidInput(
                "password must be ASCII".to_string(),
            ));
        }
        if username.len() > USERNAME_FIELD_LEN {
            return Err(DrcomError::InvalidInput(format!(
                "username is {} bytes, the field holds {}",
                username.len(),
                USERNAME_FIELD_LEN
            )));
        }

        Ok(Self { username, password })
    }

    /// Login name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password bytes as sent on the wire
    pub(crate) fn password_bytes(&self) -> &[u8] {
        self.password.as_bytes()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Host name, MAC and IPv4 address of the interface that authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    hostname: String,
    mac: [u8; 6],
    ip: Ipv4Addr,
}

impl LocalIdentity {
    /// Build an identity from known values
    pub fn new(hostname: impl Into<String>, mac: [u8; 6], ip: Ipv4Addr) -> Result<Self> {
        let hostname = hostname.into();
        if hostname.is_empty() || !hostname.is_ascii() {
            return Err(DrcomError::Identity(format!(
                "host name '{hostname}' must be non-empty ASCII"
            )));
        }
        Ok(Self { hostname, mac, ip })
    }

    /// Resolve the identity, preferring configured overrides over detection.
    pub async fn resolve(network: &NetworkConfig) -> Result<Self> {
        let hostname = match &network.hostname {
            Some(name) => name.clone(),
            None => detect_hostname()?,
        };

        let mac = match &network.local_mac {
            Some(text) => parse_mac(text)?,
            None => detect_mac()?,
        };

        let ip = match network.local_ip {
            Some(ip) => ip,
            None => detect_ip().await?,
        };

        let identity = Self::new(hostname, mac, ip)?;
        tracing::debug!(
            "Local identity: host={} mac={} ip={}",
            identity.hostname,
            hex::encode(identity.mac),
            identity.ip
        );
        Ok(identity)
    }

    /// Host name sent in the login record
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Raw MAC bytes
    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    /// Local IPv4 address
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }
}

fn detect_hostname() -> Result<String> {
    gethostname::gethostname()
        .into_string()
        .map_err(|_| not_wired("host name is not valid UTF-8"))
}

fn detect_mac() -> Result<[u8; 6]> {
    match mac_address::get_mac_address() {
        Ok(Some(mac)) => Ok(mac.bytes()),
        Ok(None) => Err(not_wired("no MAC address found")),
        Err(e) => Err(not_wired(&format!("MAC lookup failed: {e}"))),
    }
}

async fn detect_ip() -> Result<Ipv4Addr> {
    // connect() on UDP only selects a route
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket
        .connect(ROUTE_PROBE)
        .await
        .map_err(|e| not_wired(&format!("no route to the network: {e}")))?;

    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
        other => Err(not_wired(&format!("unusable local address {other}"))),
    }
}

fn not_wired(detail: &str) -> DrcomError {
    DrcomError::Identity(format!(
        "{detail}; make sure the wired network is connected"
    ))
}
