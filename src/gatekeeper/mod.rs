//! Gatekeeper: everything that decides whether an IP is authorized.
//!
//! - Issuer: code issuance and chat promotion
//! - Renewal: session-based migration to a new IP
//! - Admin: operator list / remove / flush
//! - Rate limiter: per-IP code request budget

pub mod admin;
pub mod issuer;
pub mod rate_limiter;
pub mod renewal;

pub use admin::{AdminError, ListedEntry, WhitelistAdmin};
pub use issuer::{
    AuthorizationIssuer, CodeOutcome, IssuerError, IssuerSettings, Promotion, ValidateOutcome,
};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use renewal::{RenewOutcome, RenewalCoordinator, RenewalError, SessionHandle};
