//! Rate Limiting for Code Issuance
//!
//! Caps how many codes a single IP can request per window, so the code
//! space (36^4) can't be flooded from one address.
//!
//! ## Window
//!
//! - Default: 3 codes per 5 minutes per IP
//! - Fixed window, anchored at the first request
//! - Counting happens in the record store, so every serving task (and every
//!   serving process) shares the same budget

use crate::store::{keys, RecordStore, StoreResult};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default codes per window.
pub const DEFAULT_MAX_REQUESTS: u64 = 3;

/// Default window length (5 minutes).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

/// Result of charging one request against an IP's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request allowed; `count` requests used in this window so far.
    Allowed { count: u64 },
    /// Budget exhausted for the rest of the window.
    Limited,
}

/// Per-IP request limiter backed by the record store.
pub struct RateLimiter<S: RecordStore> {
    store: Arc<S>,
    max_requests: u64,
    window: Duration,
}

impl<S: RecordStore> RateLimiter<S> {
    pub fn new(store: Arc<S>, max_requests: u64, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    /// Charge one request for `ip`.
    ///
    /// Increment-then-compare keeps concurrent requests from the same IP from
    /// both slipping under the cap.
    pub async fn check_and_record(&self, ip: &IpAddr) -> StoreResult<RateDecision> {
        let count = self
            .store
            .incr_window(&keys::rate_limit(ip), self.window)
            .await?;

        if count > self.max_requests {
            warn!(ip = %ip, count, "Code request rate limit exceeded");
            Ok(RateDecision::Limited)
        } else {
            Ok(RateDecision::Allowed { count })
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
