use super::config::IpgateConfig;
use super::{logging, wiring};
use ipgate::gatekeeper::WhitelistAdmin;

/// Whitelist administration subcommands
#[derive(clap::Subcommand, Debug, PartialEq, Eq)]
pub enum WhitelistAction {
    /// List authorized IPs and their owners
    List,

    /// Revoke one IP
    Remove {
        /// IP address to revoke
        ip: String,
    },

    /// Revoke every IP
    Flush {
        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

/// Manage the whitelist directly against the record store
pub async fn execute(
    action: WhitelistAction,
    config_path: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, _) = IpgateConfig::load_or_create(config_path.as_deref())?;
    logging::init(&config.logging)?;

    let store = wiring::connect_store(&config).await?;
    let admin = WhitelistAdmin::new(store, wiring::notifier(&config)?);
    let operator = wiring::operator_name();

    match action {
        WhitelistAction::List => {
            let listed = admin.list().await?;
            if listed.is_empty() {
                println!("No IPs are whitelisted.");
            } else {
                println!("Whitelist ({} IPs)", listed.len());
                for entry in &listed {
                    println!("  {}", entry.render());
                }
            }
        }
        WhitelistAction::Remove { ip } => {
            if admin.remove(&ip, &operator).await? {
                println!("✅ {} removed from the whitelist", ip.trim());
            } else {
                println!("{} had no active entry; firewall removal queued anyway", ip.trim());
            }
        }
        WhitelistAction::Flush { yes } => {
            if !yes && !confirm("Revoke every whitelisted IP?")? {
                println!("Aborted.");
                return Ok(());
            }
            let removed = admin.flush(&operator).await?;
            println!("✅ Whitelist flushed ({} entries removed)", removed);
        }
    }

    // Give fire-and-forget notices a moment to leave.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool, Box<dyn std::error::Error>> {
    use std::io::Write;

    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
