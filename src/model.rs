//! Whitelist record types.
//!
//! Everything the issuer, the renewal coordinator and the enforcement agent
//! exchange through the record store is defined here, together with the
//! validation that keeps malformed IPs and codes out of the store.

use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of characters in a whitelist code.
pub const CODE_LEN: usize = 4;

/// Alphabet codes are drawn from (`[A-Z0-9]`).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Session tokens are 32 random bytes, hex-encoded.
const SESSION_TOKEN_BYTES: usize = 32;

/// Validation errors for user-supplied values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid IP address: {0}")]
    InvalidIp(String),

    #[error("Invalid code: {0}")]
    InvalidCode(String),

    #[error("Invalid session token")]
    InvalidToken,
}

/// Parse and normalize an IP address.
///
/// Surrounding whitespace is ignored. The returned address renders in its
/// canonical form, so `::FFFF:1.2.3.4` and `::ffff:1.2.3.4` map to the same
/// record key.
pub fn parse_ip(raw: &str) -> Result<IpAddr, ModelError> {
    IpAddr::from_str(raw.trim()).map_err(|_| ModelError::InvalidIp(raw.to_string()))
}

/// A four-character whitelist code (`[A-Z0-9]{4}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Code(String);

impl Code {
    /// Generate a fresh code.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parse user input, case-insensitively.
    ///
    /// Chat users type codes by hand, so surrounding whitespace and lower
    /// case are accepted. Anything other than exactly four `[A-Z0-9]`
    /// characters is rejected.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let candidate = raw.trim().to_ascii_uppercase();
        let well_formed = candidate.len() == CODE_LEN
            && candidate
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());

        if well_formed {
            Ok(Self(candidate))
        } else {
            Err(ModelError::InvalidCode(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque renewal credential.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Mint a new token from a cryptographically secure RNG.
    pub fn generate<R: Rng + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accept a token presented by a client (cookie value).
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let raw = raw.trim();
        if raw.len() == SESSION_TOKEN_BYTES * 2 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(raw.to_ascii_lowercase()))
        } else {
            Err(ModelError::InvalidToken)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines. The full token is a credential.
    pub fn redacted(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({}…)", self.redacted())
    }
}

/// Chat identity that authorized an IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub name: String,
}

impl Owner {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Code waiting for chat validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCode {
    pub ip: String,
    pub created_at: u64,
}

/// "This IP is currently authorized."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEntry {
    pub owner_id: String,
    pub owner_name: String,
    pub timestamp: u64,
}

impl ActiveEntry {
    pub fn new(owner: &Owner) -> Self {
        Self {
            owner_id: owner.id.clone(),
            owner_name: owner.name.clone(),
            timestamp: unix_now(),
        }
    }

    pub fn owner(&self) -> Owner {
        Owner::new(&self.owner_id, &self.owner_name)
    }
}

/// Long-lived renewal session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalSession {
    pub owner_id: String,
    pub owner_name: String,
    pub ip: String,
    pub created_at: u64,
}

impl RenewalSession {
    pub fn new(owner: &Owner, ip: IpAddr) -> Self {
        Self {
            owner_id: owner.id.clone(),
            owner_name: owner.name.clone(),
            ip: ip.to_string(),
            created_at: unix_now(),
        }
    }

    pub fn owner(&self) -> Owner {
        Owner::new(&self.owner_id, &self.owner_name)
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
