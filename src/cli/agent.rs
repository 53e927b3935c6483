use super::config::IpgateConfig;
use super::{logging, wiring};
use ipgate::enforcement::{EnforcementAgent, IpsetAllowSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// Run the enforcement agent
///
/// Must run with `CAP_NET_ADMIN`. Exits non-zero if the allow-set cannot be
/// created; otherwise runs until SIGINT/SIGTERM, finishing the command in
/// hand first.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, path) = IpgateConfig::load_or_create(config_path.as_deref())?;
    logging::init(&config.logging)?;
    info!(
        config = %path.display(),
        set = %config.agent.set_name,
        "Enforcement agent starting"
    );

    let store = wiring::connect_store(&config).await?;
    let allow_set = IpsetAllowSet::new(
        config.agent.set_name.clone(),
        Duration::from_secs(config.agent.command_timeout_secs),
    );
    let agent = EnforcementAgent::new(store, allow_set, config.agent_settings());

    agent.start().await?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let flag = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
        flag.store(true, Ordering::SeqCst);
    });

    agent.run(shutdown).await;
    Ok(())
}
