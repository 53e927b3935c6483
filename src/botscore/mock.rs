//! Canned bot-score verifier for testing.

use super::{Assessment, BotScoreError, BotScoreVerifier};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Returns the same answer for every token and records each call.
#[derive(Clone)]
pub struct StaticVerifier {
    answer: Result<Assessment, BotScoreError>,
    calls: Arc<Mutex<Vec<(String, IpAddr)>>>,
}

impl StaticVerifier {
    /// A successful assessment with the given score and action.
    pub fn passing(score: f64, action: &str) -> Self {
        Self::with_answer(Ok(Assessment {
            success: true,
            score,
            action: action.to_string(),
            error_codes: vec![],
        }))
    }

    /// The service rejects the token outright.
    pub fn invalid_token() -> Self {
        Self::with_answer(Ok(Assessment {
            success: false,
            score: 0.0,
            action: String::new(),
            error_codes: vec!["invalid-input-response".to_string()],
        }))
    }

    /// Verification itself fails.
    pub fn failing(error: BotScoreError) -> Self {
        Self::with_answer(Err(error))
    }

    fn with_answer(answer: Result<Assessment, BotScoreError>) -> Self {
        Self {
            answer,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// `(token, remote_ip)` for every verification so far.
    pub fn calls(&self) -> Vec<(String, IpAddr)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BotScoreVerifier for StaticVerifier {
    async fn verify(&self, token: &str, remote_ip: IpAddr) -> Result<Assessment, BotScoreError> {
        self.calls
            .lock()
            .unwrap()
            .push((token.to_string(), remote_ip));
        self.answer.clone()
    }
}
