//! ipgate - chat-gated IP whitelist with firewall synchronization
//!
//! A visitor asks the web portal for a short code, types it into a chat
//! channel, and their IP is authorized at the packet filter. A renewal
//! session lets them move that authorization when their address changes.
//!
//! Three states are kept consistent:
//! - authorization records in the record store
//! - the firewall command queue (also in the record store)
//! - the kernel allow-set, owned by the privileged enforcement agent
//!
//! Producers always enqueue the firewall command before writing the record
//! that depends on it, and the agent restores every active record into the
//! allow-set on startup.

pub mod botscore;
pub mod chat;
pub mod enforcement;
pub mod gatekeeper;
pub mod model;
pub mod notify;
pub mod queue;
pub mod store;
pub mod web;
