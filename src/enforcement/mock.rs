//! In-memory allow-set for testing.

use super::allow_set::{AllowSet, EnforcementError, EnforcementResult};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    exists: bool,
    members: BTreeSet<IpAddr>,
    fail_create: bool,
    fail_ips: HashSet<IpAddr>,
    fail_all: bool,
    applied: usize,
}

/// Allow-set held in memory, with failure injection.
#[derive(Clone, Default)]
pub struct MemoryAllowSet {
    state: Arc<Mutex<MockState>>,
}

impl MemoryAllowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current members, sorted.
    pub fn members(&self) -> Vec<IpAddr> {
        self.state.lock().unwrap().members.iter().copied().collect()
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.state.lock().unwrap().members.contains(&ip)
    }

    pub fn exists(&self) -> bool {
        self.state.lock().unwrap().exists
    }

    /// Number of successful mutating calls so far.
    pub fn applied(&self) -> usize {
        self.state.lock().unwrap().applied
    }

    /// Make `ensure_exists` fail.
    pub fn fail_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_create = fail;
    }

    /// Make every add/remove touching `ip` fail.
    pub fn fail_ip(&self, ip: IpAddr) {
        self.state.lock().unwrap().fail_ips.insert(ip);
    }

    /// Make every mutating call fail.
    pub fn fail_all(&self, fail: bool) {
        self.state.lock().unwrap().fail_all = fail;
    }

    fn injected(stderr: &str) -> EnforcementError {
        EnforcementError::Failed {
            status: "exit status: 1".to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn mutate(
        &self,
        ip: Option<IpAddr>,
        op: impl FnOnce(&mut BTreeSet<IpAddr>),
    ) -> EnforcementResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_all || ip.map_or(false, |ip| state.fail_ips.contains(&ip)) {
            return Err(Self::injected("injected failure"));
        }
        if !state.exists {
            return Err(Self::injected("The set with the given name does not exist"));
        }
        op(&mut state.members);
        state.applied += 1;
        Ok(())
    }
}

#[async_trait]
impl AllowSet for MemoryAllowSet {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_exists(&self) -> EnforcementResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(Self::injected("Kernel error received: Operation not permitted"));
        }
        state.exists = true;
        Ok(())
    }

    async fn add(&self, ip: IpAddr) -> EnforcementResult<()> {
        self.mutate(Some(ip), |members| {
            members.insert(ip);
        })
    }

    async fn remove(&self, ip: IpAddr) -> EnforcementResult<()> {
        self.mutate(Some(ip), |members| {
            members.remove(&ip);
        })
    }

    async fn flush(&self) -> EnforcementResult<()> {
        self.mutate(None, |members| members.clear())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_operations_are_idempotent() {
        let set = MemoryAllowSet::new();
        set.ensure_exists().await.unwrap();
        set.ensure_exists().await.unwrap();

        set.add(ip("10.0.0.1")).await.unwrap();
        set.add(ip("10.0.0.1")).await.unwrap();
        assert_eq!(set.members(), vec![ip("10.0.0.1")]);

        set.remove(ip("10.0.0.1")).await.unwrap();
        set.remove(ip("10.0.0.1")).await.unwrap();
        assert!(set.members().is_empty());

        set.add(ip("10.0.0.2")).await.unwrap();
        set.flush().await.unwrap();
        set.flush().await.unwrap();
        assert!(set.members().is_empty());
    }

    #[tokio::test]
    async fn test_requires_set_to_exist() {
        let set = MemoryAllowSet::new();
        assert!(set.add(ip("10.0.0.1")).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let set = MemoryAllowSet::new();
        set.ensure_exists().await.unwrap();
        set.fail_ip(ip("10.0.0.9"));

        assert!(set.add(ip("10.0.0.9")).await.is_err());
        assert!(set.add(ip("10.0.0.1")).await.is_ok());

        set.fail_all(true);
        assert!(set.flush().await.is_err());
        assert!(set.contains(ip("10.0.0.1")));
    }
}
