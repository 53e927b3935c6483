use super::config::IpgateConfig;
use super::{logging, wiring};
use ipgate::gatekeeper::{AuthorizationIssuer, RenewalCoordinator};
use ipgate::web::{self, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// Run the portal
///
/// Unprivileged: it only talks to the record store. Firewall changes are
/// queued for the agent.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, path) = IpgateConfig::load_or_create(config_path.as_deref())?;
    logging::init(&config.logging)?;
    info!(config = %path.display(), "Starting ipgate portal");

    let store = wiring::connect_store(&config).await?;
    let notifier = wiring::notifier(&config)?;
    let bot_score = wiring::bot_score_gate(&config)?;
    let settings = config.issuer_settings();

    let state = AppState {
        issuer: Arc::new(AuthorizationIssuer::new(store.clone(), settings.clone())),
        renewal: Arc::new(RenewalCoordinator::new(
            store,
            bot_score,
            notifier,
            settings.session_ttl,
        )),
        proxies: Arc::new(config.trusted_proxies()?),
        site_key: config.bot_score.site_key.clone(),
    };

    let listener = TcpListener::bind(&config.web.listen)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", config.web.listen, e))?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    };

    web::serve(listener, web::router(state), shutdown).await?;
    info!("Portal stopped");
    Ok(())
}
