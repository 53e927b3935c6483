//! Firewall enforcement.
//!
//! Runs as its own privileged process. Nothing here is reachable from the
//! serving side; the two only meet at the command queue.

pub mod agent;
pub mod allow_set;
pub mod ipset;
pub mod mock;

pub use agent::{AgentError, AgentSettings, EnforcementAgent, ReconcileReport};
pub use allow_set::{AllowSet, EnforcementError, EnforcementResult};
pub use ipset::IpsetAllowSet;
pub use mock::MemoryAllowSet;
