//! In-memory record store for testing.
//!
//! Time is simulated: keys only expire when a test calls `advance`, which
//! keeps TTL behaviour deterministic. Connectivity loss and rejected pushes
//! can be injected to exercise the failure paths of the issuer and agent.

use super::{RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// In-memory record store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MockState>>,
    pushed: Arc<Notify>,
}

#[derive(Default)]
struct MockState {
    values: HashMap<String, Entry>,
    lists: HashMap<String, VecDeque<String>>,
    /// Simulated time since the store was created
    now: Duration,
    offline: bool,
    reject_pushes: bool,
}

struct Entry {
    value: String,
    expires_at: Option<Duration>,
}

impl MockState {
    fn check_online(&self) -> StoreResult<()> {
        if self.offline {
            Err(StoreError::Connection("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn live(&self, key: &str) -> Option<&Entry> {
        self.values
            .get(key)
            .filter(|e| e.expires_at.map_or(true, |at| at > self.now))
    }

    fn purge_expired(&mut self) {
        let now = self.now;
        self.values
            .retain(|_, e| e.expires_at.map_or(true, |at| at > now));
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the simulated clock forward, expiring keys whose TTL elapses.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap();
        state.now += by;
        state.purge_expired();
    }

    /// Simulate losing (or regaining) connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Make every `rpush` fail with a backend error.
    pub fn reject_pushes(&self, reject: bool) {
        self.state.lock().unwrap().reject_pushes = reject;
    }

    /// Snapshot of a list, head first (for assertions).
    pub fn list(&self, list: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .lists
            .get(list)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remaining time to live of a key, `None` if absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let state = self.state.lock().unwrap();
        state
            .live(key)
            .and_then(|e| e.expires_at)
            .map(|at| at - state.now)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.state.lock().unwrap().check_online()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let state = self.state.lock().unwrap();
        state.check_online()?;
        Ok(state.live(key).map(|e| e.value.clone()))
    }

    async fn take(&self, key: &str) -> StoreResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;
        let value = state.live(key).map(|e| e.value.clone());
        state.values.remove(key);
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;
        let expires_at = Some(state.now + ttl);
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;
        let existed = state.live(key).is_some();
        state.values.remove(key);
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let state = self.state.lock().unwrap();
        state.check_online()?;
        Ok(state.live(key).is_some())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> StoreResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;

        let current = match state.live(key) {
            Some(entry) => Some((
                entry.value.parse::<u64>().map_err(|_| {
                    StoreError::Backend(format!("value at '{}' is not an integer", key))
                })?,
                entry.expires_at,
            )),
            None => None,
        };

        let (count, expires_at) = match current {
            Some((count, expires_at)) => (count + 1, expires_at),
            None => (1, Some(state.now + window)),
        };

        state.values.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        state.check_online()?;
        let mut keys: Vec<String> = state
            .values
            .keys()
            .filter(|k| k.starts_with(prefix) && state.live(k).is_some())
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn rpush(&self, list: &str, value: &str) -> StoreResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.check_online()?;
            if state.reject_pushes {
                return Err(StoreError::Backend("push rejected".to_string()));
            }
            state
                .lists
                .entry(list.to_string())
                .or_default()
                .push_back(value.to_string());
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blpop(&self, list: &str, timeout: Duration) -> StoreResult<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before looking so a concurrent push can't slip
            // between the check and the wait.
            let notified = self.pushed.notified();
            {
                let mut state = self.state.lock().unwrap();
                state.check_online()?;
                if let Some(value) = state.lists.get_mut(list).and_then(|l| l.pop_front()) {
                    return Ok(Some(value));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}
