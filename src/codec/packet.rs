//! Packet builders.
//!
//! Layouts are fixed by the server; offsets below are byte positions in the
//! finished datagram. Inputs are validated by [`Credentials`] and
//! [`LocalIdentity`] at construction, so the builders are infallible.

use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};

use super::checksum::{checksum, hash_a, md5};
use crate::config::ProtocolProfile;
use crate::error::{DrcomError, Result};
use crate::identity::{Credentials, LocalIdentity, HOSTNAME_FIELD_LEN, USERNAME_FIELD_LEN};

/// Length of the discovery probe and logout prelude.
pub const PROBE_LEN: usize = 20;

/// Length of a login record.
pub const LOGIN_LEN: usize = 330;

/// Length of either heartbeat class.
pub const HEARTBEAT_LEN: usize = 40;

/// Length of the `0xff` heartbeat probe.
pub const HEARTBEAT_PROBE_LEN: usize = 41;

/// Length of a logout record.
pub const LOGOUT_LEN: usize = 80;

const LOGIN_CODE: [u8; 2] = [0x03, 0x01];
const LOGOUT_CODE: [u8; 2] = [0x06, 0x01];

/// Sequence byte pair used in the very first heartbeat of a session.
const FIRST_HEARTBEAT_VERSION: [u8; 2] = [0xdc, 0x02];

/// Trailing payload variant of a status heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeartbeatClass {
    /// Padding only
    One = 1,
    /// Carries the local IP
    Three = 3,
}

impl HeartbeatClass {
    /// Wire value
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for HeartbeatClass {
    type Error = DrcomError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(HeartbeatClass::One),
            3 => Ok(HeartbeatClass::Three),
            other => Err(DrcomError::InvalidInput(format!(
                "heartbeat class must be 1 or 3, got {other}"
            ))),
        }
    }
}

/// Discovery probe: `01 02 <nonce LE> 0a` + 15 zero bytes.
pub fn build_discovery(nonce: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(PROBE_LEN);
    buf.put_slice(&[0x01, 0x02]);
    buf.put_u16_le(nonce);
    buf.put_u8(0x0a);
    buf.put_bytes(0, 15);
    buf.freeze()
}

/// Logout prelude; same shape as discovery with a fixed zero nonce.
pub fn build_logout_prelude() -> Bytes {
    let mut buf = BytesMut::with_capacity(PROBE_LEN);
    buf.put_slice(&[0x01, 0x03, 0x00, 0x00, 0x0a]);
    buf.put_bytes(0, 15);
    buf.freeze()
}

/// Login record (330 bytes).
pub fn build_login(
    profile: &ProtocolProfile,
    identity: &LocalIdentity,
    credentials: &Credentials,
    salt: &[u8; 4],
) -> Bytes {
    let password = credentials.password_bytes();
    let mac = identity.mac();

    let mut buf = BytesMut::with_capacity(LOGIN_LEN);
    // 0..64
    put_record_head(&mut buf, LOGIN_CODE, profile, identity, credentials, salt);
    // 64..80 MD5_B
    buf.put_slice(&md5(&[&[0x01], password, salt, &[0u8; 4]]));
    // 80..97 NIC count, local IP, three unused IPs
    buf.put_u8(0x01);
    buf.put_slice(&identity.ip().octets());
    buf.put_bytes(0, 12);
    // 97..105
    let hash = hash_a(&[&buf, &profile.hash_suffix]);
    buf.put_slice(&hash);
    // 105..110
    buf.put_u8(profile.ip_dog);
    buf.put_bytes(0, 4);
    // 110..142
    put_padded(&mut buf, identity.hostname().as_bytes(), HOSTNAME_FIELD_LEN);
    // 142..162
    buf.put_slice(&profile.primary_dns.octets());
    buf.put_slice(&profile.dhcp_server.octets());
    buf.put_slice(&profile.secondary_dns.octets());
    buf.put_bytes(0, 8);
    // 162..182 OS info block
    buf.put_u32_le(0x94);
    buf.put_u32_le(profile.os_major);
    buf.put_u32_le(profile.os_minor);
    buf.put_u32_le(profile.os_build);
    buf.put_u32_le(profile.os_platform);
    // 182..310
    put_padded(&mut buf, profile.os_name.as_bytes(), 32);
    buf.put_bytes(0, 96);
    // 310..314
    buf.put_slice(&profile.auth_version);
    buf.put_slice(&[0x02, 0x0c]);
    // 314..318
    let sum = checksum(&[&buf[..], &profile.checksum_suffix, &mac].concat());
    buf.put_slice(&sum);
    // 318..330
    buf.put_bytes(0, 2);
    buf.put_slice(&mac);
    buf.put_u8(0x00); // auto logout
    buf.put_u8(0x00); // broadcast mode
    buf.put_slice(&[0x17, 0x77]);

    debug_assert_eq!(buf.len(), LOGIN_LEN);
    buf.freeze()
}

/// Status heartbeat of the given class (40 bytes).
///
/// `sequence` is the session counter; only its low byte goes on the wire.
pub fn build_heartbeat(
    profile: &ProtocolProfile,
    sequence: u32,
    key: &[u8; 4],
    class: HeartbeatClass,
    ip: Ipv4Addr,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEARTBEAT_LEN);
    buf.put_u8(0x07);
    buf.put_u8((sequence % 256) as u8);
    buf.put_slice(&[0x28, 0x00, 0x0b]);
    buf.put_u8(class.as_byte());
    if sequence == 0 {
        buf.put_slice(&FIRST_HEARTBEAT_VERSION);
    } else {
        buf.put_slice(&profile.keep_alive_version);
    }
    buf.put_slice(&[0x2f, 0x79]);
    buf.put_bytes(0, 6);
    // 16..20
    buf.put_slice(key);
    buf.put_bytes(0, 4);

    match class {
        HeartbeatClass::One => buf.put_bytes(0, 16),
        HeartbeatClass::Three => {
            buf.put_bytes(0, 4); // crc, always zero
            buf.put_slice(&ip.octets());
            buf.put_bytes(0, 8);
        },
    }

    buf.freeze()
}

/// `0xff` keep-alive probe sent before each pair of status heartbeats.
pub fn build_heartbeat_probe(
    credentials: &Credentials,
    salt: &[u8; 4],
    auth_info: &[u8; 16],
    timestamp: u64,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEARTBEAT_PROBE_LEN);
    buf.put_u8(0xff);
    buf.put_slice(&md5(&[&LOGIN_CODE, salt, credentials.password_bytes()]));
    buf.put_bytes(0, 3);
    buf.put_slice(auth_info);
    buf.put_u16((timestamp % 0xffff) as u16);
    buf.put_bytes(0, 3);
    buf.freeze()
}

/// Logout record: login head with code `06 01`, then `auth_info`.
pub fn build_logout(
    profile: &ProtocolProfile,
    identity: &LocalIdentity,
    credentials: &Credentials,
    salt: &[u8; 4],
    auth_info: &[u8; 16],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(LOGOUT_LEN);
    put_record_head(&mut buf, LOGOUT_CODE, profile, identity, credentials, salt);
    buf.put_slice(auth_info);
    buf.freeze()
}

/// Shared first 64 bytes of login and logout records.
fn put_record_head(
    buf: &mut BytesMut,
    code: [u8; 2],
    profile: &ProtocolProfile,
    identity: &LocalIdentity,
    credentials: &Credentials,
    salt: &[u8; 4],
) {
    let username = credentials.username().as_bytes();

    // 0..4 code, type, EOF, username length + 20
    buf.put_slice(&code);
    buf.put_u8(0x00);
    buf.put_u8((username.len() + 20) as u8);
    // 4..20 MD5_A
    let md5_a = md5(&[&code, salt, credentials.password_bytes()]);
    buf.put_slice(&md5_a);
    // 20..56
    put_padded(buf, username, USERNAME_FIELD_LEN);
    // 56..58
    buf.put_u8(profile.control_check_status);
    buf.put_u8(profile.adapter_number);
    // 58..64 MD5_A[..6] xor MAC
    for (a, m) in md5_a.iter().zip(identity.mac()) {
        buf.put_u8(a ^ m);
    }
}

/// Write `value` zero-padded (or truncated) to exactly `width` bytes.
fn put_padded(buf: &mut BytesMut, value: &[u8], width: usize) {
    let take = value.len().min(width);
    buf.put_slice(&value[..take]);
    buf.put_bytes(0, width - take);
}
