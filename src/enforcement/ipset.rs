//! `ipset` backend.

use super::allow_set::{AllowSet, EnforcementError, EnforcementResult};
use async_trait::async_trait;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default set name.
///
/// The set is created as `hash:ip` with ipset's default `inet` family, so it
/// only holds IPv4 members. IPv6 adds and removes are refused before ipset
/// is invoked.
pub const DEFAULT_SET_NAME: &str = "allowed_players";

/// Default bound on a single `ipset` invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Allow-set backed by a Linux `hash:ip` ipset.
///
/// Requires `CAP_NET_ADMIN`. Firewall rules referencing the set are managed
/// outside this program.
pub struct IpsetAllowSet {
    binary: String,
    set_name: String,
    timeout: Duration,
}

impl IpsetAllowSet {
    pub fn new(set_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: "ipset".to_string(),
            set_name: set_name.into(),
            timeout,
        }
    }

    /// Use a different executable (e.g. a wrapper script).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, args: &[&str]) -> EnforcementResult<()> {
        debug!(binary = %self.binary, args = ?args, "Running enforcement tool");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| EnforcementError::Spawn(format!("{}: {}", self.binary, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| EnforcementError::Timeout(self.timeout))?
            .map_err(|e| EnforcementError::Spawn(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EnforcementError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn check_family(ip: IpAddr) -> EnforcementResult<()> {
    match ip {
        IpAddr::V4(_) => Ok(()),
        IpAddr::V6(_) => Err(EnforcementError::UnsupportedFamily(ip)),
    }
}

#[async_trait]
impl AllowSet for IpsetAllowSet {
    fn name(&self) -> &str {
        &self.set_name
    }

    async fn ensure_exists(&self) -> EnforcementResult<()> {
        self.run(&["create", &self.set_name, "hash:ip", "-exist"])
            .await
    }

    async fn add(&self, ip: IpAddr) -> EnforcementResult<()> {
        check_family(ip)?;
        let ip = ip.to_string();
        self.run(&["add", &self.set_name, &ip, "-exist"]).await
    }

    async fn remove(&self, ip: IpAddr) -> EnforcementResult<()> {
        check_family(ip)?;
        let ip = ip.to_string();
        self.run(&["del", &self.set_name, &ip, "-exist"]).await
    }

    async fn flush(&self) -> EnforcementResult<()> {
        self.run(&["flush", &self.set_name]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let set = IpsetAllowSet::new("test", DEFAULT_COMMAND_TIMEOUT)
            .with_binary("/nonexistent/ipset-binary");

        let err = set.flush().await.unwrap_err();
        assert!(matches!(err, EnforcementError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        // `false` ignores its arguments and exits 1
        let set = IpsetAllowSet::new("test", DEFAULT_COMMAND_TIMEOUT).with_binary("false");

        let err = set.add("192.0.2.1".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, EnforcementError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let set = IpsetAllowSet::new("test", DEFAULT_COMMAND_TIMEOUT).with_binary("true");

        set.ensure_exists().await.unwrap();
        set.remove("2001:db8::1".parse().unwrap()).await.unwrap();
        assert_eq!(set.name(), "test");
    }

    #[tokio::test]
    async fn test_ipv6_refused_without_running_tool() {
        // `true` would accept anything, so success here would mean ipset ran
        let set = IpsetAllowSet::new("test", DEFAULT_COMMAND_TIMEOUT).with_binary("true");
        let v6: IpAddr = "2001:db8::1".parse().unwrap();

        assert_eq!(
            set.add(v6).await.unwrap_err(),
            EnforcementError::UnsupportedFamily(v6)
        );
        assert_eq!(
            set.remove(v6).await.unwrap_err(),
            EnforcementError::UnsupportedFamily(v6)
        );
        set.add("192.0.2.1".parse().unwrap()).await.unwrap();
    }
}
