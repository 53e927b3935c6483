//! Operator notifications.
//!
//! Whitelist changes are announced to an operator channel through a webhook.
//! Delivery is best-effort: `notify` returns immediately and never reports
//! failure to the caller, so a slow or broken webhook can't affect an
//! authorization decision.

pub mod mock;
pub mod webhook;

pub use mock::RecordingNotifier;
pub use webhook::WebhookNotifier;

use crate::model::Owner;
use std::net::IpAddr;

/// Embed colours (RGB).
const COLOR_GREEN: u32 = 0x00FF00;
const COLOR_BLUE: u32 = 0x3498DB;
const COLOR_ORANGE: u32 = 0xFF9900;
const COLOR_RED: u32 = 0xFF0000;

/// A whitelist change worth telling operators about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A code was validated and its IP authorized
    Promoted { ip: IpAddr, owner: Owner },
    /// A session moved its authorization to a new IP
    Renewed {
        old_ip: Option<IpAddr>,
        new_ip: IpAddr,
        owner: Owner,
    },
    /// An administrator removed an IP
    Removed { ip: IpAddr, by: String },
    /// An administrator cleared the whole whitelist
    Flushed { by: String },
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::Promoted { .. } => "IP Authorized",
            Notice::Renewed { .. } => "IP Renewed",
            Notice::Removed { .. } => "IP Removed",
            Notice::Flushed { .. } => "Whitelist Flushed",
        }
    }

    pub fn description(&self) -> String {
        match self {
            Notice::Promoted { ip, owner } => {
                format!("**IP:** `{}`\n**User:** {} ({})", ip, owner.name, owner.id)
            }
            Notice::Renewed {
                old_ip,
                new_ip,
                owner,
            } => {
                let old = old_ip
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| "?".to_string());
                format!(
                    "**IP:** `{}` -> `{}`\n**User:** {} ({})",
                    old, new_ip, owner.name, owner.id
                )
            }
            Notice::Removed { ip, by } => format!("**IP:** `{}`\n**By:** {}", ip, by),
            Notice::Flushed { by } => format!("**By:** {}", by),
        }
    }

    pub fn color(&self) -> u32 {
        match self {
            Notice::Promoted { .. } => COLOR_GREEN,
            Notice::Renewed { .. } => COLOR_BLUE,
            Notice::Removed { .. } => COLOR_ORANGE,
            Notice::Flushed { .. } => COLOR_RED,
        }
    }
}

/// Best-effort notification sink.
pub trait Notifier: Send + Sync {
    /// Queue a notice for delivery. Must not block.
    fn notify(&self, notice: Notice);
}

/// Discards every notice (no webhook configured).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notice: Notice) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Owner {
        Owner::new("42", "alice")
    }

    #[test]
    fn test_promoted_description() {
        let notice = Notice::Promoted {
            ip: "1.2.3.4".parse().unwrap(),
            owner: alice(),
        };
        assert_eq!(notice.title(), "IP Authorized");
        assert_eq!(notice.description(), "**IP:** `1.2.3.4`\n**User:** alice (42)");
        assert_eq!(notice.color(), COLOR_GREEN);
    }

    #[test]
    fn test_renewed_without_old_ip() {
        let notice = Notice::Renewed {
            old_ip: None,
            new_ip: "5.6.7.8".parse().unwrap(),
            owner: alice(),
        };
        assert!(notice.description().starts_with("**IP:** `?` -> `5.6.7.8`"));
    }

    #[test]
    fn test_admin_notices() {
        let removed = Notice::Removed {
            ip: "1.2.3.4".parse().unwrap(),
            by: "root".to_string(),
        };
        assert_eq!(removed.color(), COLOR_ORANGE);
        assert!(removed.description().contains("root"));

        let flushed = Notice::Flushed {
            by: "root".to_string(),
        };
        assert_eq!(flushed.title(), "Whitelist Flushed");
        assert_eq!(flushed.color(), COLOR_RED);
    }

    #[test]
    fn test_noop_notifier() {
        NoopNotifier.notify(Notice::Flushed {
            by: "root".to_string(),
        });
    }
}
