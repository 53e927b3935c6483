//! Code issuance and promotion.
//!
//! A visitor asks for a code from the portal, types it into the chat
//! channel, and the chat handler promotes it: the code's IP becomes an
//! active entry and the visitor gets a renewal session.
//!
//! ## Code lifecycle
//!
//! ```text
//! issued ──validate──> promoted
//!    │
//!    ├──TTL──> expired
//!    └──enqueue fails──> still issued (until TTL)
//! ```
//!
//! The firewall `add` is enqueued before any record is written. A crash
//! between the writes can leave an IP allowed at the firewall without a
//! renewal session, but never a recorded authorization the agent will not
//! hear about.

use super::rate_limiter::{RateDecision, RateLimiter, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
use crate::model::{
    parse_ip, unix_now, ActiveEntry, Code, Owner, PendingCode, RenewalSession, SessionToken,
};
use crate::queue::{CommandQueue, QueueError};
use crate::store::{decode_record, encode_record, keys, RecordStore, StoreError};
use rand::rngs::OsRng;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default code lifetime (5 minutes).
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(300);

/// Default renewal session lifetime (30 days).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Issuer tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerSettings {
    pub code_ttl: Duration,
    pub session_ttl: Duration,
    pub rate_limit_max: u64,
    pub rate_limit_window: Duration,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self {
            code_ttl: DEFAULT_CODE_TTL,
            session_ttl: DEFAULT_SESSION_TTL,
            rate_limit_max: DEFAULT_MAX_REQUESTS,
            rate_limit_window: DEFAULT_WINDOW,
        }
    }
}

/// Result of asking for a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeOutcome {
    /// A fresh code bound to the caller's IP
    Issued { code: Code, expires_in: Duration },
    /// The IP is already authorized; no code was minted
    AlreadyActive,
    /// Too many codes requested from this IP
    RateLimited { window: Duration },
}

/// Everything known about a successful promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub ip: IpAddr,
    pub owner: Owner,
    pub session_token: SessionToken,
}

/// Result of validating a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateOutcome {
    Promoted(Promotion),
    /// Malformed, unknown or expired code
    Invalid,
}

/// Issuer errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssuerError {
    /// The firewall command could not be queued; the code was kept.
    #[error("Authorization failed: {0}")]
    EnqueueFailed(QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues codes and promotes them into active entries.
pub struct AuthorizationIssuer<S: RecordStore> {
    store: Arc<S>,
    queue: CommandQueue<S>,
    rate_limiter: RateLimiter<S>,
    settings: IssuerSettings,
}

impl<S: RecordStore> AuthorizationIssuer<S> {
    pub fn new(store: Arc<S>, settings: IssuerSettings) -> Self {
        let queue = CommandQueue::new(store.clone());
        let rate_limiter = RateLimiter::new(
            store.clone(),
            settings.rate_limit_max,
            settings.rate_limit_window,
        );
        Self {
            store,
            queue,
            rate_limiter,
            settings,
        }
    }

    pub fn settings(&self) -> &IssuerSettings {
        &self.settings
    }

    /// Issue a code for `ip`, unless it is already authorized or over its
    /// request budget.
    pub async fn request_code(&self, ip: IpAddr) -> Result<CodeOutcome, IssuerError> {
        if self.is_active(ip).await? {
            debug!(ip = %ip, "Code requested by already authorized IP");
            return Ok(CodeOutcome::AlreadyActive);
        }

        if let RateDecision::Limited = self.rate_limiter.check_and_record(&ip).await? {
            return Ok(CodeOutcome::RateLimited {
                window: self.rate_limiter.window(),
            });
        }

        let code = Code::generate(&mut OsRng);
        let pending = PendingCode {
            ip: ip.to_string(),
            created_at: unix_now(),
        };
        self.store
            .set_ex(
                &keys::code(&code),
                &encode_record(&pending)?,
                self.settings.code_ttl,
            )
            .await?;

        info!(ip = %ip, code = %code, "Code generated");

        Ok(CodeOutcome::Issued {
            code,
            expires_in: self.settings.code_ttl,
        })
    }

    /// Promote a code typed into chat by `submitted_by`.
    pub async fn validate_code(
        &self,
        raw_code: &str,
        submitted_by: &Owner,
    ) -> Result<ValidateOutcome, IssuerError> {
        let code = match Code::parse(raw_code) {
            Ok(code) => code,
            Err(_) => return Ok(ValidateOutcome::Invalid),
        };

        let code_key = keys::code(&code);
        let raw = match self.store.get(&code_key).await? {
            Some(raw) => raw,
            None => {
                info!(code = %code, user = %submitted_by.name, "Unknown or expired code");
                return Ok(ValidateOutcome::Invalid);
            }
        };

        let pending: PendingCode = decode_record(&code_key, &raw)?;
        let ip = match parse_ip(&pending.ip) {
            Ok(ip) => ip,
            Err(e) => {
                warn!(code = %code, "Discarding code bound to unusable address: {}", e);
                self.store.del(&code_key).await?;
                return Ok(ValidateOutcome::Invalid);
            }
        };

        // The code stays valid if this fails, so the user can simply retry.
        self.queue
            .enqueue_add(ip)
            .await
            .map_err(IssuerError::EnqueueFailed)?;

        // Claim the code. A concurrent validator may have taken it since the
        // read; the extra `add` it leaves queued is idempotent.
        if self.store.take(&code_key).await?.is_none() {
            info!(code = %code, user = %submitted_by.name, "Code already redeemed");
            return Ok(ValidateOutcome::Invalid);
        }

        let session_token = self.commit_promotion(ip, submitted_by).await.map_err(|e| {
            error!(
                ip = %ip,
                "Firewall add queued but promotion records were not fully written: {}", e
            );
            e
        })?;

        info!(
            ip = %ip,
            user = %submitted_by.name,
            user_id = %submitted_by.id,
            "IP whitelisted"
        );

        Ok(ValidateOutcome::Promoted(Promotion {
            ip,
            owner: submitted_by.clone(),
            session_token,
        }))
    }

    async fn commit_promotion(
        &self,
        ip: IpAddr,
        owner: &Owner,
    ) -> Result<SessionToken, StoreError> {
        self.store
            .set(&keys::active(&ip), &encode_record(&ActiveEntry::new(owner))?)
            .await?;

        let token = SessionToken::generate(&mut OsRng);
        self.store
            .set_ex(
                &keys::session(token.as_str()),
                &encode_record(&RenewalSession::new(owner, ip))?,
                self.settings.session_ttl,
            )
            .await?;

        // Chat can't set cookies; the portal picks this up on the next visit.
        self.store
            .set_ex(
                &keys::pending_session(&ip),
                token.as_str(),
                self.settings.code_ttl,
            )
            .await?;

        Ok(token)
    }

    /// Claim the session token waiting for `ip`, if any. Single use.
    pub async fn consume_handoff(&self, ip: IpAddr) -> Result<Option<SessionToken>, StoreError> {
        let raw = match self.store.take(&keys::pending_session(&ip)).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match SessionToken::parse(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(_) => {
                warn!(ip = %ip, "Dropping malformed pending session handoff");
                Ok(None)
            }
        }
    }

    pub async fn is_active(&self, ip: IpAddr) -> Result<bool, StoreError> {
        self.store.exists(&keys::active(&ip)).await
    }

    pub async fn active_entry(&self, ip: IpAddr) -> Result<Option<ActiveEntry>, StoreError> {
        let key = keys::active(&ip);
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(decode_record(&key, &raw)?)),
            None => Ok(None),
        }
    }
}
