//! Construction of library components from configuration.

use super::config::IpgateConfig;
use ipgate::botscore::{BotScoreGate, RecaptchaVerifier};
use ipgate::notify::{NoopNotifier, Notifier, WebhookNotifier};
use ipgate::store::{RecordStore, RedisStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Connect to the configured record store and check it answers.
pub async fn connect_store(
    config: &IpgateConfig,
) -> Result<Arc<RedisStore>, Box<dyn std::error::Error>> {
    let store = RedisStore::connect(&config.store.url).await?;
    store.ping().await?;
    info!("Record store connected");
    Ok(Arc::new(store))
}

pub fn notifier(config: &IpgateConfig) -> Result<Arc<dyn Notifier>, Box<dyn std::error::Error>> {
    match config.notify.webhook_url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url)?)),
        None => {
            info!("No webhook configured, operator notices disabled");
            Ok(Arc::new(NoopNotifier))
        }
    }
}

pub fn bot_score_gate(config: &IpgateConfig) -> Result<BotScoreGate, Box<dyn std::error::Error>> {
    match config.bot_score_secret() {
        Some(secret) => {
            let verifier = RecaptchaVerifier::new(
                secret,
                config.bot_score.verify_url.clone(),
                Duration::from_secs(config.bot_score.timeout_secs),
            )?;
            info!(
                threshold = config.bot_score.threshold,
                "Renewal bot-score verification enabled"
            );
            Ok(BotScoreGate::new(
                Arc::new(verifier),
                config.bot_score_policy(),
            ))
        }
        None => {
            warn!("No bot-score secret configured, renewals are not verified");
            Ok(BotScoreGate::disabled())
        }
    }
}

/// Name admin actions are attributed to.
pub fn operator_name() -> String {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("cli:{}", user)
}
