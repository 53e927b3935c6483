//! Firewall command queue.
//!
//! A single FIFO list in the record store carries enforcement intents from
//! the unprivileged side to the enforcement agent. Producers must see `push`
//! succeed before committing any state that depends on it; the agent is the
//! only consumer.
//!
//! ## Wire format
//!
//! ```json
//! {"action": "add", "ip": "203.0.113.7"}
//! {"action": "remove", "ip": "203.0.113.7"}
//! {"action": "flush"}
//! ```
//!
//! `add` and `remove` are absolute set operations, so delivering a command
//! twice is harmless.

use crate::model::{parse_ip, ModelError};
use crate::store::{keys, RecordStore, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// An enforcement intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum QueueCommand {
    /// Ensure the IP is in the allow-set
    Add { ip: IpAddr },
    /// Ensure the IP is not in the allow-set
    Remove { ip: IpAddr },
    /// Empty the allow-set
    Flush,
}

impl QueueCommand {
    pub fn encode(&self) -> String {
        // Serializing a fieldless/IpAddr enum to JSON cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a raw queue payload.
    pub fn decode(raw: &str) -> Result<Self, MalformedCommand> {
        serde_json::from_str(raw).map_err(|e| MalformedCommand {
            raw: raw.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn action(&self) -> &'static str {
        match self {
            QueueCommand::Add { .. } => "add",
            QueueCommand::Remove { .. } => "remove",
            QueueCommand::Flush => "flush",
        }
    }
}

impl fmt::Display for QueueCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueCommand::Add { ip } => write!(f, "add {}", ip),
            QueueCommand::Remove { ip } => write!(f, "remove {}", ip),
            QueueCommand::Flush => write!(f, "flush"),
        }
    }
}

/// A payload the consumer could not understand.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed queue command {raw:?}: {reason}")]
pub struct MalformedCommand {
    pub raw: String,
    pub reason: String,
}

/// What a pop produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Command(QueueCommand),
    Malformed(MalformedCommand),
}

/// Queue errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    InvalidIp(#[from] ModelError),

    #[error("Failed to enqueue firewall command: {0}")]
    Store(#[from] StoreError),
}

/// Handle on the firewall queue, shared by producers and the consumer.
pub struct CommandQueue<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> Clone for CommandQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore> CommandQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a command. Only returns once the store has accepted it.
    pub async fn push(&self, command: &QueueCommand) -> Result<(), QueueError> {
        self.store
            .rpush(keys::QUEUE, &command.encode())
            .await
            .map_err(|e| {
                error!(command = %command, "Failed to enqueue firewall command: {}", e);
                QueueError::Store(e)
            })?;
        info!(command = %command, "Enqueued firewall command");
        Ok(())
    }

    pub async fn enqueue_add(&self, ip: IpAddr) -> Result<(), QueueError> {
        self.push(&QueueCommand::Add { ip }).await
    }

    pub async fn enqueue_remove(&self, ip: IpAddr) -> Result<(), QueueError> {
        self.push(&QueueCommand::Remove { ip }).await
    }

    pub async fn enqueue_flush(&self) -> Result<(), QueueError> {
        self.push(&QueueCommand::Flush).await
    }

    /// Validate a raw IP string and enqueue its removal.
    pub async fn enqueue_remove_raw(&self, raw_ip: &str) -> Result<IpAddr, QueueError> {
        let ip = parse_ip(raw_ip)?;
        self.enqueue_remove(ip).await?;
        Ok(ip)
    }

    /// Pop the next command, waiting up to `timeout`.
    ///
    /// `Ok(None)` means the wait timed out with the queue empty.
    pub async fn pop(&self, timeout: Duration) -> Result<Option<Delivery>, StoreError> {
        let raw = match self.store.blpop(keys::QUEUE, timeout).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        Ok(Some(match QueueCommand::decode(&raw) {
            Ok(command) => Delivery::Command(command),
            Err(malformed) => Delivery::Malformed(malformed),
        }))
    }
}
