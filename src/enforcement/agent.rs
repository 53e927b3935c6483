//! Enforcement agent.
//!
//! The agent is the only writer of the allow-set. On startup it makes sure
//! the set exists and restores every active entry into it, then applies
//! queued commands until asked to stop.
//!
//! ## Failure handling
//!
//! - Set creation fails: fatal, the agent cannot work without its set
//! - Enforcement call fails: logged with stderr, command dropped
//! - Malformed command: logged, dropped
//! - Store unreachable: logged, retried after a fixed backoff, forever

use super::allow_set::{AllowSet, EnforcementError};
use crate::model::parse_ip;
use crate::queue::{CommandQueue, Delivery, QueueCommand};
use crate::store::{keys, RecordStore, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default blocking-pop timeout; bounds shutdown latency.
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause before retrying an unreachable store.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Pause after an unexpected (non-connection) store error.
const ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Agent tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    pub pop_timeout: Duration,
    pub reconnect_backoff: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            pop_timeout: DEFAULT_POP_TIMEOUT,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }
}

/// Fatal agent errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("Allow-set '{name}' unavailable: {source}")]
    SetUnavailable {
        name: String,
        source: EnforcementError,
    },

    #[error("Record store unavailable at startup: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of restoring active entries into the allow-set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries now present in the allow-set
    pub restored: usize,
    /// Keys whose IP part did not parse
    pub skipped: usize,
    /// Entries the allow-set refused
    pub failed: usize,
}

/// Consumes the command queue and keeps the allow-set in step.
pub struct EnforcementAgent<S: RecordStore, A: AllowSet> {
    store: Arc<S>,
    queue: CommandQueue<S>,
    allow_set: A,
    settings: AgentSettings,
}

impl<S: RecordStore, A: AllowSet> EnforcementAgent<S, A> {
    pub fn new(store: Arc<S>, allow_set: A, settings: AgentSettings) -> Self {
        let queue = CommandQueue::new(store.clone());
        Self {
            store,
            queue,
            allow_set,
            settings,
        }
    }

    pub fn allow_set(&self) -> &A {
        &self.allow_set
    }

    /// Startup sequence: check the store, create the set, reconcile.
    pub async fn start(&self) -> Result<ReconcileReport, AgentError> {
        self.store.ping().await?;

        self.allow_set
            .ensure_exists()
            .await
            .map_err(|source| {
                error!(set = %self.allow_set.name(), "Allow-set creation failed: {}", source);
                AgentError::SetUnavailable {
                    name: self.allow_set.name().to_string(),
                    source,
                }
            })?;
        info!(set = %self.allow_set.name(), "Allow-set ready");

        let report = self.reconcile().await?;
        info!(
            restored = report.restored,
            skipped = report.skipped,
            failed = report.failed,
            "Restored active entries into allow-set"
        );
        Ok(report)
    }

    /// Ensure every active entry's IP is in the allow-set.
    ///
    /// Only adds. Members without an entry are left alone.
    pub async fn reconcile(&self) -> Result<ReconcileReport, StoreError> {
        let mut report = ReconcileReport::default();

        for key in self.store.scan_prefix(keys::ACTIVE_PREFIX).await? {
            let raw_ip = keys::ip_from_active_key(&key).unwrap_or_default();
            let ip = match parse_ip(raw_ip) {
                Ok(ip) => ip,
                Err(_) => {
                    warn!(key = %key, "Skipping active entry with invalid IP");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.allow_set.add(ip).await {
                Ok(()) => report.restored += 1,
                Err(e) => {
                    error!(ip = %ip, "Failed to restore IP: {}", e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Apply one command to the allow-set.
    pub async fn apply(&self, command: &QueueCommand) -> Result<(), EnforcementError> {
        match command {
            QueueCommand::Add { ip } => self.allow_set.add(*ip).await?,
            QueueCommand::Remove { ip } => self.allow_set.remove(*ip).await?,
            QueueCommand::Flush => self.allow_set.flush().await?,
        }
        info!(command = %command, set = %self.allow_set.name(), "Applied firewall command");
        Ok(())
    }

    /// Handle at most one queued command. Returns whether one was popped.
    pub async fn step(&self) -> Result<bool, StoreError> {
        match self.queue.pop(self.settings.pop_timeout).await? {
            None => Ok(false),
            Some(Delivery::Malformed(malformed)) => {
                error!("Dropping {}", malformed);
                Ok(true)
            }
            Some(Delivery::Command(command)) => {
                if let Err(e) = self.apply(&command).await {
                    error!(command = %command, "Firewall command failed: {}", e);
                }
                Ok(true)
            }
        }
    }

    /// Consume commands until `shutdown` is set.
    ///
    /// The flag is checked between commands, so a command that was popped
    /// always finishes.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        info!(queue = keys::QUEUE, "Listening for firewall commands");

        while !shutdown.load(Ordering::SeqCst) {
            match self.step().await {
                Ok(_) => {}
                Err(e) if e.is_connection() => {
                    error!(
                        "Record store connection lost, retrying in {:?}: {}",
                        self.settings.reconnect_backoff, e
                    );
                    tokio::time::sleep(self.settings.reconnect_backoff).await;
                    match self.store.ping().await {
                        Ok(()) => info!("Record store reachable again"),
                        Err(e) => warn!("Record store still unreachable: {}", e),
                    }
                }
                Err(e) => {
                    error!("Unexpected record store error: {}", e);
                    tokio::time::sleep(ERROR_PAUSE).await;
                }
            }
        }

        info!("Enforcement agent stopped");
    }
}
