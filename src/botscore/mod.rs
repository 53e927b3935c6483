//! Bot-score verification.
//!
//! Renewal skips the chat challenge, so it is gated behind an
//! anti-automation check instead. The verifier only reports what the scoring
//! service said; `BotScoreGate` decides whether that is good enough.
//!
//! When no secret is configured the gate is disabled and every renewal
//! passes.

pub mod mock;
pub mod recaptcha;

pub use mock::StaticVerifier;
pub use recaptcha::RecaptchaVerifier;

use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Action label the renewal page requests a token for.
pub const DEFAULT_EXPECTED_ACTION: &str = "renew_ip";

/// Minimum acceptable score.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// What the scoring service reported for a token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Assessment {
    pub success: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub action: String,
    #[serde(default, rename = "error-codes")]
    pub error_codes: Vec<String>,
}

/// Verification transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BotScoreError {
    #[error("Bot-score verification timed out")]
    Timeout,

    #[error("Bot-score service unreachable: {0}")]
    Transport(String),

    #[error("Unexpected bot-score response: {0}")]
    InvalidResponse(String),
}

/// Asks the scoring service about a client-supplied token.
#[async_trait]
pub trait BotScoreVerifier: Send + Sync {
    async fn verify(&self, token: &str, remote_ip: IpAddr) -> Result<Assessment, BotScoreError>;
}

/// Acceptance rules applied to an assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct BotScorePolicy {
    pub expected_action: String,
    pub threshold: f64,
}

impl Default for BotScorePolicy {
    fn default() -> Self {
        Self {
            expected_action: DEFAULT_EXPECTED_ACTION.to_string(),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl BotScorePolicy {
    /// Why an assessment fails this policy, if it does.
    pub fn evaluate(&self, assessment: &Assessment) -> Result<(), String> {
        if !assessment.success {
            return Err(format!("token invalid {:?}", assessment.error_codes));
        }
        if assessment.action != self.expected_action {
            return Err(format!(
                "action mismatch: expected '{}', got '{}'",
                self.expected_action, assessment.action
            ));
        }
        if assessment.score < self.threshold {
            return Err(format!(
                "score too low: {:.2} (threshold: {:.2})",
                assessment.score, self.threshold
            ));
        }
        Ok(())
    }
}

/// Verifier plus policy; `None` verifier means verification is disabled.
#[derive(Clone)]
pub struct BotScoreGate {
    verifier: Option<Arc<dyn BotScoreVerifier>>,
    policy: BotScorePolicy,
}

impl BotScoreGate {
    pub fn new(verifier: Arc<dyn BotScoreVerifier>, policy: BotScorePolicy) -> Self {
        Self {
            verifier: Some(verifier),
            policy,
        }
    }

    pub fn disabled() -> Self {
        Self {
            verifier: None,
            policy: BotScorePolicy::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.verifier.is_some()
    }

    /// Check a token. `Err` carries a human-readable rejection reason.
    ///
    /// Transport failures and timeouts count as rejections; they are never
    /// retried here.
    pub async fn check(&self, token: &str, remote_ip: IpAddr) -> Result<(), String> {
        let verifier = match &self.verifier {
            Some(v) => v,
            None => return Ok(()),
        };

        if token.trim().is_empty() {
            warn!(ip = %remote_ip, "Renewal attempted without bot-score token");
            return Err("missing bot-score token".to_string());
        }

        let assessment = verifier.verify(token, remote_ip).await.map_err(|e| {
            warn!(ip = %remote_ip, "Bot-score verification failed: {}", e);
            e.to_string()
        })?;

        match self.policy.evaluate(&assessment) {
            Ok(()) => {
                info!(
                    ip = %remote_ip,
                    score = assessment.score,
                    action = %assessment.action,
                    "Bot-score check passed"
                );
                Ok(())
            }
            Err(reason) => {
                warn!(ip = %remote_ip, "Bot-score check rejected: {}", reason);
                Err(reason)
            }
        }
    }
}
