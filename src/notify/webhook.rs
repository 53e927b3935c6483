//! Webhook notifier.
//!
//! Posts a Discord-style embed for each notice. Each delivery runs on its
//! own task with a short timeout; failures are logged and forgotten.

use super::{Notice, Notifier};
use serde::Serialize;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Upper bound for a single webhook delivery.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct WebhookPayload {
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

impl WebhookPayload {
    fn from_notice(notice: &Notice, at: SystemTime) -> Self {
        Self {
            embeds: vec![Embed {
                title: notice.title().to_string(),
                description: notice.description(),
                color: notice.color(),
                timestamp: humantime::format_rfc3339_seconds(at).to_string(),
            }],
        }
    }
}

/// Sends notices to a webhook URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn deliver(client: reqwest::Client, url: String, payload: WebhookPayload) {
        match client.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(status = %resp.status(), "Webhook notice delivered");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "Webhook rejected notice");
            }
            Err(e) => {
                warn!("Failed to send webhook notice: {}", e);
            }
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notice: Notice) {
        let payload = WebhookPayload::from_notice(&notice, SystemTime::now());

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Self::deliver(self.client.clone(), self.url.clone(), payload));
            }
            Err(_) => {
                warn!(title = notice.title(), "No async runtime; dropping webhook notice");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Owner;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_payload_shape() {
        let notice = Notice::Promoted {
            ip: "1.2.3.4".parse().unwrap(),
            owner: Owner::new("42", "alice"),
        };
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let payload = WebhookPayload::from_notice(&notice, at);
        let json = serde_json::to_value(&payload).unwrap();

        let embed = &json["embeds"][0];
        assert_eq!(embed["title"], "IP Authorized");
        assert_eq!(embed["color"], 0x00FF00);
        assert_eq!(embed["timestamp"], "2023-11-14T22:13:20Z");
        assert!(embed["description"].as_str().unwrap().contains("1.2.3.4"));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_does_not_fail_caller() {
        // Port 9 (discard) on localhost is not listening in test environments
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        notifier.notify(Notice::Flushed {
            by: "root".to_string(),
        });
        // Give the delivery task a chance to run and fail quietly
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[test]
    fn test_notify_without_runtime_is_dropped() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        notifier.notify(Notice::Flushed {
            by: "root".to_string(),
        });
    }
}
