//! Portal request handlers.

use super::cookie::{session_cookie, session_from_headers};
use super::error::WebError;
use super::AppState;
use crate::gatekeeper::{CodeOutcome, RenewOutcome};
use crate::model::parse_ip;
use crate::store::RecordStore;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use tracing::{info, warn};

/// What the portal page should show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PortalView {
    AlreadyAuthorized {
        ip: IpAddr,
    },
    RenewalAvailable {
        ip: IpAddr,
        owner_name: String,
        /// Public key for the client-side bot-score widget
        #[serde(skip_serializing_if = "Option::is_none")]
        site_key: Option<String>,
    },
    Code {
        ip: IpAddr,
        code: String,
        expires_in_secs: u64,
    },
    RateLimited {
        ip: IpAddr,
        retry_after_secs: u64,
    },
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    #[serde(default)]
    pub recaptcha_token: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub ip: Option<String>,
}

fn client_ip<S: RecordStore>(
    state: &AppState<S>,
    peer: SocketAddr,
    headers: &HeaderMap,
) -> Result<IpAddr, WebError> {
    state
        .proxies
        .resolve(peer.ip(), headers)
        .map_err(|reason| {
            warn!(peer = %peer, "Rejecting request: {}", reason);
            WebError::BadRequest(reason)
        })
}

/// `GET /`
pub async fn index<S: RecordStore + 'static>(
    State(state): State<AppState<S>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let ip = client_ip(&state, peer, &headers)?;

    if state.issuer.is_active(ip).await? {
        let view = Json(PortalView::AlreadyAuthorized { ip });

        // A code was just validated in chat; hand the session over.
        if let Some(token) = state.issuer.consume_handoff(ip).await? {
            let ttl = state.issuer.settings().session_ttl;
            if let Some(cookie) = session_cookie(token.as_str(), ttl) {
                info!(ip = %ip, token = token.redacted(), "Session handed off to browser");
                return Ok(([(SET_COOKIE, cookie)], view).into_response());
            }
        }
        return Ok(view.into_response());
    }

    if let Some(raw) = session_from_headers(&headers) {
        if let Some(handle) = state.renewal.load_session(&raw).await? {
            return Ok(Json(PortalView::RenewalAvailable {
                ip,
                owner_name: handle.session.owner_name,
                site_key: state.site_key.clone(),
            })
            .into_response());
        }
    }

    let view = match state.issuer.request_code(ip).await? {
        CodeOutcome::Issued { code, expires_in } => PortalView::Code {
            ip,
            code: code.to_string(),
            expires_in_secs: expires_in.as_secs(),
        },
        CodeOutcome::AlreadyActive => PortalView::AlreadyAuthorized { ip },
        CodeOutcome::RateLimited { window } => {
            warn!(ip = %ip, "Code request rate limited");
            let view = PortalView::RateLimited {
                ip,
                retry_after_secs: window.as_secs(),
            };
            return Ok((StatusCode::TOO_MANY_REQUESTS, Json(view)).into_response());
        }
    };
    Ok(Json(view).into_response())
}

/// `POST /renew`
pub async fn renew<S: RecordStore + 'static>(
    State(state): State<AppState<S>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<RenewRequest>,
) -> Result<Response, WebError> {
    let ip = client_ip(&state, peer, &headers)?;

    let raw = session_from_headers(&headers).ok_or(WebError::SessionInvalid)?;
    let handle = state
        .renewal
        .load_session(&raw)
        .await?
        .ok_or_else(|| {
            info!(ip = %ip, "Renewal with unknown or expired session");
            WebError::SessionInvalid
        })?;

    match state
        .renewal
        .renew(&handle, ip, &request.recaptcha_token)
        .await?
    {
        RenewOutcome::Renewed {
            old_ip,
            new_ip,
            migrated,
        } => {
            let body = Json(json!({
                "ok": true,
                "ip": new_ip,
                "previous_ip": old_ip,
                "migrated": migrated,
            }));
            let ttl = state.issuer.settings().session_ttl;
            match session_cookie(handle.token.as_str(), ttl) {
                Some(cookie) => Ok(([(SET_COOKIE, cookie)], body).into_response()),
                None => Ok(body.into_response()),
            }
        }
        RenewOutcome::BotScoreRejected(reason) => Err(WebError::BotScoreRejected(reason)),
        RenewOutcome::EnforcementFailed => Err(WebError::EnforcementFailed),
    }
}

/// `GET /status?ip=`
///
/// Without `ip`, reports on the caller's own address.
pub async fn status<S: RecordStore + 'static>(
    State(state): State<AppState<S>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Result<Response, WebError> {
    let ip = match query.ip.as_deref() {
        Some(raw) => parse_ip(raw).map_err(|e| WebError::BadRequest(e.to_string()))?,
        None => client_ip(&state, peer, &headers)?,
    };

    let whitelisted = state.issuer.is_active(ip).await?;
    Ok(Json(json!({"ip": ip, "whitelisted": whitelisted})).into_response())
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}
