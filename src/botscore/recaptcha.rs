//! reCAPTCHA v3 verifier.

use super::{Assessment, BotScoreError, BotScoreVerifier};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Google's verification endpoint.
pub const DEFAULT_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Default upper bound on one verification round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Verifies tokens against a reCAPTCHA-compatible `siteverify` endpoint.
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    verify_url: String,
    secret: String,
}

impl RecaptchaVerifier {
    pub fn new(
        secret: impl Into<String>,
        verify_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BotScoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotScoreError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            verify_url: verify_url.into(),
            secret: secret.into(),
        })
    }
}

#[async_trait]
impl BotScoreVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str, remote_ip: IpAddr) -> Result<Assessment, BotScoreError> {
        let remote_ip = remote_ip.to_string();
        let form = [
            ("secret", self.secret.as_str()),
            ("response", token),
            ("remoteip", remote_ip.as_str()),
        ];

        let resp = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BotScoreError::Timeout
                } else {
                    BotScoreError::Transport(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(BotScoreError::InvalidResponse(format!(
                "HTTP {}",
                resp.status()
            )));
        }

        resp.json::<Assessment>()
            .await
            .map_err(|e| BotScoreError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let verifier = RecaptchaVerifier::new(
            "secret",
            "http://127.0.0.1:9/siteverify",
            Duration::from_millis(500),
        )
        .unwrap();

        let result = verifier
            .verify("token", "192.0.2.1".parse().unwrap())
            .await;
        assert!(matches!(
            result,
            Err(BotScoreError::Transport(_)) | Err(BotScoreError::Timeout)
        ));
    }
}
