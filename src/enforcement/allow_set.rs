//! Allow-set abstraction.
//!
//! The allow-set is the kernel-level collection of permitted source
//! addresses. Every operation is idempotent: adding a present member or
//! removing an absent one succeeds.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Result type for allow-set operations
pub type EnforcementResult<T> = Result<T, EnforcementError>;

/// Allow-set errors. All of them are recoverable for a single command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnforcementError {
    #[error("Failed to run enforcement tool: {0}")]
    Spawn(String),

    #[error("Enforcement tool timed out after {0:?}")]
    Timeout(Duration),

    #[error("Enforcement tool exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("{0} is not in the allow-set's address family")]
    UnsupportedFamily(IpAddr),
}

/// Named set of allowed source IPs.
#[async_trait]
pub trait AllowSet: Send + Sync {
    /// Set name, for logging.
    fn name(&self) -> &str;

    /// Create the set if it does not exist.
    async fn ensure_exists(&self) -> EnforcementResult<()>;

    /// Insert `ip` if absent.
    async fn add(&self, ip: IpAddr) -> EnforcementResult<()>;

    /// Delete `ip` if present.
    async fn remove(&self, ip: IpAddr) -> EnforcementResult<()>;

    /// Delete every member.
    async fn flush(&self) -> EnforcementResult<()>;
}
