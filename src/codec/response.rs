//! Response classification.
//!
//! The first byte of every server datagram selects its meaning. The
//! `expect_*` helpers turn a raw datagram into the payload the session
//! needs, or into the matching [`DrcomError`].

use crate::error::{AuthFailure, DrcomError, Result};

/// Offset of the detail byte in a `0x05` login failure.
const FAILURE_CODE_OFFSET: usize = 32;

/// `auth_info` span in a `0x04` login success.
const AUTH_INFO_RANGE: std::ops::Range<usize> = 23..39;

/// Rolling key span in a `0x07` heartbeat acknowledgement.
const KEY_RANGE: std::ops::Range<usize> = 16..20;

/// Server response discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// `0x02`: discovery or logout-prelude acknowledgement
    Challenge,
    /// `0x04`: login or logout accepted
    Success,
    /// `0x05`: login refused
    Failure,
    /// `0x07`: heartbeat acknowledgement
    Heartbeat,
}

impl ResponseKind {
    /// Classify a datagram by its first byte.
    pub fn classify(data: &[u8]) -> Result<Self> {
        match data.first() {
            Some(0x02) => Ok(ResponseKind::Challenge),
            Some(0x04) => Ok(ResponseKind::Success),
            Some(0x05) => Ok(ResponseKind::Failure),
            Some(0x07) => Ok(ResponseKind::Heartbeat),
            Some(other) => Err(DrcomError::protocol(
                format!("unknown response code 0x{other:02x}"),
                data,
            )),
            None => Err(DrcomError::protocol("empty response", data)),
        }
    }
}

/// Salt from a discovery acknowledgement, if it answers `nonce`.
///
/// `None` means the datagram belongs to some other exchange and the caller
/// should try elsewhere.
pub fn discovery_salt(data: &[u8], nonce: u16) -> Option<[u8; 4]> {
    let nonce = nonce.to_le_bytes();
    if data.len() < 8 || data[..2] != [0x02, 0x02] || data[2..4] != nonce {
        return None;
    }
    let mut salt = [0u8; 4];
    salt.copy_from_slice(&data[4..8]);
    Some(salt)
}

/// `auth_info` from a login response, or the reason the login failed.
pub fn expect_login(data: &[u8]) -> Result<[u8; 16]> {
    match ResponseKind::classify(data)? {
        ResponseKind::Success => {
            let bytes = data
                .get(AUTH_INFO_RANGE)
                .ok_or_else(|| DrcomError::protocol("login success too short", data))?;
            let mut auth_info = [0u8; 16];
            auth_info.copy_from_slice(bytes);
            Ok(auth_info)
        },
        ResponseKind::Failure => Err(DrcomError::Auth(login_failure(data))),
        other => Err(DrcomError::protocol(
            format!("expected login reply, got {other:?}"),
            data,
        )),
    }
}

/// Map the detail byte of a `0x05` response.
pub fn login_failure(data: &[u8]) -> AuthFailure {
    match data.get(FAILURE_CODE_OFFSET) {
        Some(0x31) => AuthFailure::BadUsername,
        Some(0x33) => AuthFailure::BadPassword,
        code => AuthFailure::Rejected {
            code: code.copied(),
        },
    }
}

/// Rolling key from a heartbeat acknowledgement.
pub fn expect_heartbeat(data: &[u8]) -> Result<[u8; 4]> {
    expect_kind(data, ResponseKind::Heartbeat)?;
    let bytes = data
        .get(KEY_RANGE)
        .ok_or_else(|| DrcomError::protocol("heartbeat reply too short", data))?;
    let mut key = [0u8; 4];
    key.copy_from_slice(bytes);
    Ok(key)
}

/// Fail unless `data` carries the `expected` discriminator.
pub fn expect_kind(data: &[u8], expected: ResponseKind) -> Result<()> {
    let kind = ResponseKind::classify(data)?;
    if kind == expected {
        Ok(())
    } else {
        Err(DrcomError::protocol(
            format!("expected {expected:?}, got {kind:?}"),
            data,
        ))
    }
}

/// Validate the `02 03` acknowledgement of a logout prelude.
pub fn expect_logout_challenge(data: &[u8]) -> Result<()> {
    if data.starts_with(&[0x02, 0x03]) {
        Ok(())
    } else {
        Err(DrcomError::protocol("expected logout challenge 02 03", data))
    }
}
