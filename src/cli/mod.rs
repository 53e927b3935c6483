use clap::{Parser, Subcommand};

pub mod agent;
pub mod chat;
pub mod config;
pub mod logging;
pub mod serve;
pub mod status;
pub mod version;
pub mod whitelist;
pub mod wiring;

use whitelist::WhitelistAction;

#[derive(Parser)]
#[command(name = "ipgate")]
#[command(author = "ipgate Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chat-gated IP whitelist with firewall synchronization", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web portal
    Serve {
        /// Path to config file (default: ~/.config/ipgate/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Run the privileged firewall enforcement agent
    Agent {
        /// Path to config file (default: ~/.config/ipgate/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Handle chat messages relayed as JSON lines on stdin
    Chat {
        /// Path to config file (default: ~/.config/ipgate/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Manage whitelisted IPs
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,

        /// Path to config file (default: ~/.config/ipgate/config.toml)
        #[arg(long, global = true)]
        config: Option<String>,
    },

    /// Check whether an IP is whitelisted
    Status {
        /// IP address to check
        ip: String,

        /// Path to config file (default: ~/.config/ipgate/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Serve { config } => serve::execute(config).await,
        Commands::Agent { config } => agent::execute(config).await,
        Commands::Chat { config } => chat::execute(config).await,
        Commands::Whitelist { action, config } => whitelist::execute(action, config).await,
        Commands::Status { ip, config } => status::execute(ip, config).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::parse_from(["ipgate", "serve", "--config", "/etc/ipgate/config.toml"]);

        match cli.command {
            Commands::Serve { config } => {
                assert_eq!(config, Some("/etc/ipgate/config.toml".to_string()));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_agent_defaults() {
        let cli = Cli::parse_from(["ipgate", "agent"]);

        match cli.command {
            Commands::Agent { config } => assert_eq!(config, None),
            _ => panic!("Expected Agent command"),
        }
    }

    #[test]
    fn test_cli_parse_chat() {
        let cli = Cli::parse_from(["ipgate", "chat"]);
        assert!(matches!(cli.command, Commands::Chat { config: None }));
    }

    #[test]
    fn test_cli_parse_whitelist_list() {
        let cli = Cli::parse_from(["ipgate", "whitelist", "list"]);

        match cli.command {
            Commands::Whitelist { action, config } => {
                assert_eq!(action, WhitelistAction::List);
                assert_eq!(config, None);
            }
            _ => panic!("Expected Whitelist command"),
        }
    }

    #[test]
    fn test_cli_parse_whitelist_remove_with_config() {
        let cli = Cli::parse_from([
            "ipgate",
            "whitelist",
            "remove",
            "203.0.113.7",
            "--config",
            "/tmp/ipgate.toml",
        ]);

        match cli.command {
            Commands::Whitelist { action, config } => {
                assert_eq!(
                    action,
                    WhitelistAction::Remove {
                        ip: "203.0.113.7".to_string()
                    }
                );
                assert_eq!(config, Some("/tmp/ipgate.toml".to_string()));
            }
            _ => panic!("Expected Whitelist command"),
        }
    }

    #[test]
    fn test_cli_parse_whitelist_flush() {
        let cli = Cli::parse_from(["ipgate", "whitelist", "flush", "--yes"]);

        match cli.command {
            Commands::Whitelist { action, .. } => {
                assert_eq!(action, WhitelistAction::Flush { yes: true });
            }
            _ => panic!("Expected Whitelist command"),
        }
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["ipgate", "status", "10.0.0.1"]);

        match cli.command {
            Commands::Status { ip, config } => {
                assert_eq!(ip, "10.0.0.1");
                assert_eq!(config, None);
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["ipgate", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_cli_rejects_missing_status_ip() {
        assert!(Cli::try_parse_from(["ipgate", "status"]).is_err());
    }
}
