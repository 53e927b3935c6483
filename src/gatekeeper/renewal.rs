//! Session renewal.
//!
//! A renewal session lets a user whose address changed move their
//! authorization to the new IP without repeating the chat challenge. The
//! session token is the only credential; it is reused across renewals and
//! its lifetime is re-armed on each one.

use crate::botscore::BotScoreGate;
use crate::model::{parse_ip, ActiveEntry, RenewalSession, SessionToken};
use crate::notify::{Notice, Notifier};
use crate::queue::CommandQueue;
use crate::store::{decode_record, encode_record, keys, RecordStore, StoreError};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// A loaded session together with its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub token: SessionToken,
    pub session: RenewalSession,
}

/// Result of a renewal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    Renewed {
        old_ip: Option<IpAddr>,
        new_ip: IpAddr,
        /// Whether the authorization moved to a different IP
        migrated: bool,
    },
    /// The anti-automation check failed; carries the reason
    BotScoreRejected(String),
    /// The firewall add for the new IP could not be queued
    EnforcementFailed,
}

/// Renewal errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenewalError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validates sessions and migrates authorizations between IPs.
pub struct RenewalCoordinator<S: RecordStore> {
    store: Arc<S>,
    queue: CommandQueue<S>,
    bot_score: BotScoreGate,
    notifier: Arc<dyn Notifier>,
    session_ttl: Duration,
}

impl<S: RecordStore> RenewalCoordinator<S> {
    pub fn new(
        store: Arc<S>,
        bot_score: BotScoreGate,
        notifier: Arc<dyn Notifier>,
        session_ttl: Duration,
    ) -> Self {
        let queue = CommandQueue::new(store.clone());
        Self {
            store,
            queue,
            bot_score,
            notifier,
            session_ttl,
        }
    }

    pub fn bot_score_enabled(&self) -> bool {
        self.bot_score.is_enabled()
    }

    /// Look up a session by the token a client presented.
    ///
    /// Malformed, unknown and expired tokens all yield `None`.
    pub async fn load_session(&self, raw_token: &str) -> Result<Option<SessionHandle>, StoreError> {
        let token = match SessionToken::parse(raw_token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };

        let key = keys::session(token.as_str());
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(SessionHandle {
                token,
                session: decode_record(&key, &raw)?,
            })),
            None => Ok(None),
        }
    }

    /// Re-authorize `handle`'s owner from `new_ip`.
    pub async fn renew(
        &self,
        handle: &SessionHandle,
        new_ip: IpAddr,
        bot_token: &str,
    ) -> Result<RenewOutcome, RenewalError> {
        if let Err(reason) = self.bot_score.check(bot_token, new_ip).await {
            return Ok(RenewOutcome::BotScoreRejected(reason));
        }

        let owner = handle.session.owner();
        let old_ip = match parse_ip(&handle.session.ip) {
            Ok(ip) => Some(ip),
            Err(e) => {
                warn!(token = handle.token.redacted(), "Session holds unusable IP: {}", e);
                None
            }
        };
        let migrated = old_ip != Some(new_ip);
        let new_key = keys::active(&new_ip);

        // Same IP only needs re-granting if the entry was removed meanwhile.
        let grant = migrated || !self.store.exists(&new_key).await?;
        if grant {
            // Queued first: if this fails nothing else may change.
            if let Err(e) = self.queue.enqueue_add(new_ip).await {
                error!(ip = %new_ip, "Renewal aborted, could not queue firewall add: {}", e);
                return Ok(RenewOutcome::EnforcementFailed);
            }
        }

        if let Some(old) = old_ip.filter(|old| *old != new_ip) {
            // A stale IP left in the allow-set is not a correctness problem.
            if let Err(e) = self.queue.enqueue_remove(old).await {
                warn!(ip = %old, "Could not queue removal of previous IP: {}", e);
            }
            self.store.del(&keys::active(&old)).await?;
        }

        if grant {
            self.store
                .set(&new_key, &encode_record(&ActiveEntry::new(&owner))?)
                .await?;
        }

        let mut session = handle.session.clone();
        session.ip = new_ip.to_string();
        self.store
            .set_ex(
                &keys::session(handle.token.as_str()),
                &encode_record(&session)?,
                self.session_ttl,
            )
            .await?;

        if migrated {
            info!(
                old_ip = ?old_ip,
                new_ip = %new_ip,
                user = %owner.name,
                "IP renewed"
            );
            self.notifier.notify(Notice::Renewed {
                old_ip,
                new_ip,
                owner,
            });
        } else {
            info!(ip = %new_ip, user = %owner.name, "Session refreshed");
        }

        Ok(RenewOutcome::Renewed {
            old_ip,
            new_ip,
            migrated,
        })
    }
}
