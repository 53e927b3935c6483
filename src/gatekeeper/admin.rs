//! Operator whitelist management.
//!
//! Removal and flush follow the same ordering as promotion: the firewall
//! command is queued first and records are only touched once it is.

use crate::model::ActiveEntry;
use crate::notify::{Notice, Notifier};
use crate::queue::{CommandQueue, QueueError};
use crate::store::{decode_record, keys, RecordStore, StoreError};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// One row of the whitelist listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub ip: String,
    /// `None` if the record could not be read back
    pub entry: Option<ActiveEntry>,
}

impl ListedEntry {
    /// Single-line rendering used by chat and the CLI.
    pub fn render(&self) -> String {
        match &self.entry {
            Some(entry) => format!("`{}` - {} ({})", self.ip, entry.owner_name, entry.owner_id),
            None => format!("`{}` - ?", self.ip),
        }
    }
}

/// Administrative errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminError {
    #[error("Invalid IP address: {0}")]
    InvalidIp(String),

    #[error("Firewall command could not be queued: {0}")]
    EnqueueFailed(QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// List, remove and flush authorized IPs.
pub struct WhitelistAdmin<S: RecordStore> {
    store: Arc<S>,
    queue: CommandQueue<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: RecordStore> WhitelistAdmin<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        let queue = CommandQueue::new(store.clone());
        Self {
            store,
            queue,
            notifier,
        }
    }

    /// Every active entry, sorted by IP string.
    pub async fn list(&self) -> Result<Vec<ListedEntry>, StoreError> {
        let found = self.store.scan_prefix(keys::ACTIVE_PREFIX).await?;
        let mut listed = Vec::with_capacity(found.len());

        for key in found {
            let ip = match keys::ip_from_active_key(&key) {
                Some(ip) => ip.to_string(),
                None => continue,
            };
            // Expired or deleted between scan and read
            let raw = match self.store.get(&key).await? {
                Some(raw) => raw,
                None => continue,
            };
            let entry = match decode_record::<ActiveEntry>(&key, &raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            };
            listed.push(ListedEntry { ip, entry });
        }

        Ok(listed)
    }

    /// Revoke `raw_ip`. Returns whether an active entry existed.
    ///
    /// The firewall removal is queued even when there is no entry, so a
    /// stray allow-set member can still be cleaned up this way.
    pub async fn remove(&self, raw_ip: &str, by: &str) -> Result<bool, AdminError> {
        let ip: IpAddr = self
            .queue
            .enqueue_remove_raw(raw_ip)
            .await
            .map_err(|e| match e {
                QueueError::InvalidIp(_) => AdminError::InvalidIp(raw_ip.trim().to_string()),
                other => AdminError::EnqueueFailed(other),
            })?;

        let existed = self.store.del(&keys::active(&ip)).await?;
        info!(ip = %ip, by = %by, existed, "IP removed from whitelist");

        self.notifier.notify(Notice::Removed {
            ip,
            by: by.to_string(),
        });
        Ok(existed)
    }

    /// Revoke every authorization. Returns how many entries were deleted.
    pub async fn flush(&self, by: &str) -> Result<usize, AdminError> {
        self.queue
            .enqueue_flush()
            .await
            .map_err(AdminError::EnqueueFailed)?;

        let mut removed = 0;
        for key in self.store.scan_prefix(keys::ACTIVE_PREFIX).await? {
            if self.store.del(&key).await? {
                removed += 1;
            }
        }
        info!(by = %by, removed, "Whitelist flushed");

        self.notifier.notify(Notice::Flushed { by: by.to_string() });
        Ok(removed)
    }
}
