//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`DRCOM_*`)
//! - CLI arguments (for the `drcom` binary)
//!
//! Every section has documented defaults, so an empty file is a valid
//! configuration apart from the account credentials.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DrcomError, Result};

/// UDP port used by both ends of every DrCOM exchange.
pub const DRCOM_PORT: u16 = 61440;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Account credentials
    #[serde(default)]
    pub account: AccountConfig,

    /// Local network identity overrides
    #[serde(default)]
    pub network: NetworkConfig,

    /// Authentication server candidates
    #[serde(default)]
    pub server: ServerConfig,

    /// Server-variant wire constants
    #[serde(default)]
    pub profile: ProtocolProfile,

    /// Per-exchange retry policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Heartbeat scheduling
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Reconnection supervisor policy
    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Connectivity probe used by the supervisor
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| DrcomError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| DrcomError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config location (`<config_dir>/drcom/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("drcom").join("config.toml"))
    }

    /// Load from `path`, or from [`Config::default_path`] if it exists, or fall
    /// back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Apply `DRCOM_*` environment variables on top of this config
    pub fn with_env_overrides(self) -> Self {
        self.apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(username) = lookup("DRCOM_USERNAME") {
            self.account.username = username;
        }
        if let Some(password) = lookup("DRCOM_PASSWORD") {
            self.account.password = password;
        }
        if let Some(ip) = lookup("DRCOM_LOCAL_IP") {
            match ip.parse() {
                Ok(ip) => self.network.local_ip = Some(ip),
                Err(_) => tracing::warn!("Ignoring invalid DRCOM_LOCAL_IP: {}", ip),
            }
        }
        if let Some(mac) = lookup("DRCOM_LOCAL_MAC") {
            self.network.local_mac = Some(mac);
        }
        if let Some(server) = lookup("DRCOM_SERVER") {
            match server.parse::<Ipv4Addr>() {
                Ok(ip) => {
                    // Primary candidate goes first, fallbacks stay behind it
                    self.server.candidates.retain(|c| *c != ip);
                    self.server.candidates.insert(0, ip);
                },
                Err(_) => tracing::warn!("Ignoring invalid DRCOM_SERVER: {}", server),
            }
        }
        self
    }

    /// Render as TOML with the password masked
    pub fn to_toml_redacted(&self) -> Result<String> {
        let mut shown = self.clone();
        if !shown.account.password.is_empty() {
            shown.account.password = "<redacted>".to_string();
        }
        Ok(toml::to_string_pretty(&shown)?)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(DrcomError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.timeout_ms == 0 {
            return Err(DrcomError::Config(
                "retry.timeout_ms must be positive".to_string(),
            ));
        }
        if self.server.candidates.is_empty() {
            return Err(DrcomError::Config(
                "server.candidates must list at least one address".to_string(),
            ));
        }
        if self.heartbeat.interval_secs == 0 {
            return Err(DrcomError::Config(
                "heartbeat.interval_secs must be positive".to_string(),
            ));
        }
        if self.reconnect.check_interval_secs == 0 {
            return Err(DrcomError::Config(
                "reconnect.check_interval_secs must be positive".to_string(),
            ));
        }
        if let Some(mac) = &self.network.local_mac {
            parse_mac(mac)?;
        }
        match self.probe.kind {
            ProbeKind::Tcp => {
                self.probe.tcp_target()?;
            },
            ProbeKind::Http => {
                if !self.probe.target.starts_with("http://")
                    && !self.probe.target.starts_with("https://")
                {
                    return Err(DrcomError::Config(format!(
                        "probe.target '{}' must be an http(s) URL",
                        self.probe.target
                    )));
                }
            },
        }
        Ok(())
    }
}

/// Parse a MAC written as 12 hex digits, optionally separated by `:` or `-`.
pub fn parse_mac(text: &str) -> Result<[u8; 6]> {
    let digits: String = text.chars().filter(|c| *c != ':' && *c != '-').collect();
    let bytes = hex::decode(&digits)
        .map_err(|e| DrcomError::Config(format!("Invalid MAC address '{text}': {e}")))?;
    bytes
        .try_into()
        .map_err(|_| DrcomError::Config(format!("MAC address '{text}' must be 6 bytes")))
}

/// Account credentials as loaded from config
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Login name (ASCII)
    pub username: String,

    /// Password (ASCII)
    pub password: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Local network identity overrides; anything unset is auto-detected
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local IPv4 address, e.g. `192.168.100.123`
    pub local_ip: Option<Ipv4Addr>,

    /// Local MAC, e.g. `001a264a7b0d`
    pub local_mac: Option<String>,

    /// Host name sent in the login record
    pub hostname: Option<String>,

    /// Local UDP port to bind
    pub local_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            local_ip: None,
            local_mac: None,
            hostname: None,
            local_port: DRCOM_PORT,
        }
    }
}

/// Authentication server candidates, tried in order during discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Primary address followed by fallbacks
    pub candidates: Vec<Ipv4Addr>,

    /// Server UDP port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            candidates: vec![
                Ipv4Addr::new(192, 168, 211, 3),
                Ipv4Addr::new(1, 1, 1, 1),
                Ipv4Addr::new(202, 1, 1, 1),
            ],
            port: DRCOM_PORT,
        }
    }
}

impl ServerConfig {
    /// Candidate socket addresses in discovery order
    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.candidates
            .iter()
            .map(|ip| SocketAddr::from((*ip, self.port)))
            .collect()
    }
}

/// Server-variant constants embedded in login and heartbeat packets.
///
/// Defaults match the campus-specific dialect. Other deployments differ
/// mostly in the suffixes and version bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolProfile {
    /// Control check status byte (offset 56)
    pub control_check_status: u8,
    /// Adapter number byte (offset 57)
    pub adapter_number: u8,
    /// IP dog byte (offset 105)
    pub ip_dog: u8,
    /// Auth version (offset 310)
    pub auth_version: [u8; 2],
    /// Keep-alive version used in heartbeats after the first
    pub keep_alive_version: [u8; 2],
    /// DHCP server advertised in the login record
    pub dhcp_server: Ipv4Addr,
    /// Primary DNS advertised in the login record
    pub primary_dns: Ipv4Addr,
    /// Secondary DNS advertised in the login record
    pub secondary_dns: Ipv4Addr,
    /// Appended to the record before computing the 8-byte hash A
    pub hash_suffix: [u8; 4],
    /// Appended (with the MAC) to the record before the custom checksum
    pub checksum_suffix: [u8; 6],
    /// OS major version
    pub os_major: u32,
    /// OS minor version
    pub os_minor: u32,
    /// OS build number
    pub os_build: u32,
    /// OS platform id
    pub os_platform: u32,
    /// OS name, padded to 32 bytes
    pub os_name: String,
}

impl Default for ProtocolProfile {
    fn default() -> Self {
        Self {
            control_check_status: 0x20,
            adapter_number: 0x01,
            ip_dog: 0x01,
            auth_version: [0x0a, 0x00],
            keep_alive_version: [0xdc, 0x02],
            dhcp_server: Ipv4Addr::new(211, 68, 32, 204),
            primary_dns: Ipv4Addr::new(114, 114, 114, 114),
            secondary_dns: Ipv4Addr::new(8, 8, 8, 8),
            hash_suffix: [0x14, 0x00, 0x07, 0x0b],
            checksum_suffix: [0x01, 0x26, 0x07, 0x11, 0x00, 0x00],
            os_major: 6,
            os_minor: 1,
            os_build: 7601,
            os_platform: 2,
            os_name: "WINDOWS".to_string(),
        }
    }
}

/// Retry policy for a single logical exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Datagrams sent before giving up
    pub max_attempts: u32,

    /// Wait per attempt, in milliseconds
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_ms: 3000,
        }
    }
}

impl RetryPolicy {
    /// Create a policy from an attempt count and per-attempt timeout
    pub fn new(max_attempts: u32, per_attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            timeout_ms: per_attempt_timeout.as_millis() as u64,
        }
    }

    /// Per-attempt receive timeout
    pub fn per_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Heartbeat scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Seconds between heartbeat rounds
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

impl HeartbeatConfig {
    /// Interval between rounds
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Reconnection supervisor policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Run the supervisor at all
    pub enabled: bool,

    /// Relogin attempts allowed per outage
    pub max_relogin_attempts: u32,

    /// Seconds between connectivity probes
    pub check_interval_secs: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_relogin_attempts: 3,
            check_interval_secs: 30,
        }
    }
}

impl ReconnectPolicy {
    /// Interval between probes
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Connectivity probe flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// TCP connect to `host:port`
    #[default]
    Tcp,
    /// HTTP HEAD against a URL
    Http,
}

/// Connectivity probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe flavour
    pub kind: ProbeKind,

    /// `host:port` for TCP, URL for HTTP
    pub target: String,

    /// Probe timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            kind: ProbeKind::Tcp,
            target: "114.114.114.114:53".to_string(),
            timeout_ms: 1000,
        }
    }
}

impl ProbeConfig {
    /// Probe timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse `target` as a socket address
    pub fn tcp_target(&self) -> Result<SocketAddr> {
        self.target
            .parse()
            .map_err(|e| DrcomError::Config(format!("Invalid probe target '{}': {e}", self.target)))
    }
}
