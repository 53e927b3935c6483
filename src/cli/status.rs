use super::config::IpgateConfig;
use super::wiring;
use ipgate::gatekeeper::{AuthorizationIssuer, IssuerSettings};
use ipgate::model::parse_ip;

/// Check whether an IP is authorized
///
/// Reads the record store only; it says nothing about whether the agent has
/// applied the entry yet.
pub async fn execute(ip: String, config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let ip = parse_ip(&ip)?;
    let (config, _) = IpgateConfig::load_or_create(config_path.as_deref())?;

    let store = wiring::connect_store(&config).await?;
    let issuer = AuthorizationIssuer::new(store, IssuerSettings::default());

    match issuer.active_entry(ip).await? {
        Some(entry) => {
            println!("✅ {} is whitelisted", ip);
            println!("  Owner: {} ({})", entry.owner_name, entry.owner_id);
            println!("  Since: {}", format_timestamp(entry.timestamp));
        }
        None => println!("❌ {} is not whitelisted", ip),
    }

    Ok(())
}

fn format_timestamp(secs: u64) -> String {
    let at = std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs);
    humantime::format_rfc3339_seconds(at).to_string()
}
