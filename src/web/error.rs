//! Web error type.

use crate::gatekeeper::{IssuerError, RenewalError};
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Errors a portal request can end in.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Malformed input (bad IP, unusable forwarding header)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing, malformed or expired session cookie
    #[error("session invalid or expired")]
    SessionInvalid,

    /// The bot-score check rejected the renewal
    #[error("bot-score check failed: {0}")]
    BotScoreRejected(String),

    /// The firewall command could not be queued
    #[error("enforcement unavailable")]
    EnforcementFailed,

    /// Record store failure
    #[error("record store unavailable: {0}")]
    Unavailable(#[from] StoreError),
}

impl WebError {
    /// HTTP status for this error.
    ///
    /// - Bad request: 400
    /// - Session invalid: 401
    /// - Bot-score rejected: 403
    /// - Enforcement failed: 500
    /// - Store unavailable: 503
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::SessionInvalid => StatusCode::UNAUTHORIZED,
            Self::BotScoreRejected(_) => StatusCode::FORBIDDEN,
            Self::EnforcementFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message shown to the client. Never includes internal details.
    fn public_message(&self) -> String {
        match self {
            Self::BadRequest(reason) => reason.clone(),
            Self::SessionInvalid => {
                "Session invalid or expired. Use the normal code flow.".to_string()
            }
            Self::BotScoreRejected(_) => "Verification failed. Try again.".to_string(),
            Self::EnforcementFailed => {
                "Failed to update your IP. Contact an administrator.".to_string()
            }
            Self::Unavailable(_) => "Service temporarily unavailable.".to_string(),
        }
    }
}

impl From<IssuerError> for WebError {
    fn from(e: IssuerError) -> Self {
        match e {
            IssuerError::EnqueueFailed(_) => Self::EnforcementFailed,
            IssuerError::Store(e) => Self::Unavailable(e),
        }
    }
}

impl From<RenewalError> for WebError {
    fn from(e: RenewalError) -> Self {
        match e {
            RenewalError::Store(e) => Self::Unavailable(e),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if let Self::Unavailable(e) = &self {
            error!("Request failed on record store: {}", e);
        }
        let status = self.status_code();
        let body = Json(json!({"ok": false, "error": self.public_message()}));
        (status, body).into_response()
    }
}
