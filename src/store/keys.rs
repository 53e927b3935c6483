//! Key namespace.
//!
//! All engine state lives under `whitelist:`. Both processes must agree on
//! these names, so they are only ever built here.

use crate::model::Code;
use std::net::IpAddr;

pub const PREFIX: &str = "whitelist:";

/// FIFO list drained by the enforcement agent.
pub const QUEUE: &str = "whitelist:firewall_queue";

pub const CODE_PREFIX: &str = "whitelist:code:";
pub const ACTIVE_PREFIX: &str = "whitelist:active:";
pub const SESSION_PREFIX: &str = "whitelist:session:";
pub const PENDING_SESSION_PREFIX: &str = "whitelist:pending_session:";
pub const RATE_LIMIT_PREFIX: &str = "whitelist:ratelimit:";

pub fn code(code: &Code) -> String {
    format!("{CODE_PREFIX}{code}")
}

pub fn active(ip: &IpAddr) -> String {
    format!("{ACTIVE_PREFIX}{ip}")
}

pub fn session(token: &str) -> String {
    format!("{SESSION_PREFIX}{token}")
}

pub fn pending_session(ip: &IpAddr) -> String {
    format!("{PENDING_SESSION_PREFIX}{ip}")
}

pub fn rate_limit(ip: &IpAddr) -> String {
    format!("{RATE_LIMIT_PREFIX}{ip}")
}

/// Recover the raw IP portion of an active-entry key.
///
/// The result is not validated: keys can be written by anything with store
/// access, so callers must run it through `model::parse_ip`.
pub fn ip_from_active_key(key: &str) -> Option<&str> {
    key.strip_prefix(ACTIVE_PREFIX)
}
