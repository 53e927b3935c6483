//! Web portal.
//!
//! JSON endpoints a browser page (or the desktop client) drives:
//!
//! - `GET /`: code, already-authorized or renewal-available view
//! - `POST /renew`: move the session's authorization to the caller's IP
//! - `GET /status?ip=`: whether an IP is authorized
//! - `GET /health`: liveness

pub mod client_ip;
pub mod cookie;
pub mod error;
pub mod handlers;

pub use client_ip::TrustedProxies;
pub use error::WebError;
pub use handlers::PortalView;

use crate::gatekeeper::{AuthorizationIssuer, RenewalCoordinator};
use crate::store::RecordStore;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared handler state.
pub struct AppState<S: RecordStore> {
    pub issuer: Arc<AuthorizationIssuer<S>>,
    pub renewal: Arc<RenewalCoordinator<S>>,
    pub proxies: Arc<TrustedProxies>,
    pub site_key: Option<String>,
}

impl<S: RecordStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            issuer: Arc::clone(&self.issuer),
            renewal: Arc::clone(&self.renewal),
            proxies: Arc::clone(&self.proxies),
            site_key: self.site_key.clone(),
        }
    }
}

/// Build the portal router.
pub fn router<S: RecordStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(handlers::index::<S>))
        .route("/renew", post(handlers::renew::<S>))
        .route("/status", get(handlers::status::<S>))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Serve `app` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Portal listening");
    }
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
