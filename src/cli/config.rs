//! ipgate configuration file handling
//!
//! Configuration is a single TOML file shared by `serve`, `agent` and the
//! admin commands. Every section is optional and falls back to defaults, so
//! an empty file is a valid local-development configuration.
//!
//! Secrets can be kept out of the file: `IPGATE_BOT_SCORE_SECRET` overrides
//! `[bot_score] secret_key`.

use ipgate::botscore::{recaptcha, BotScorePolicy, DEFAULT_EXPECTED_ACTION, DEFAULT_THRESHOLD};
use ipgate::enforcement::agent::{DEFAULT_POP_TIMEOUT, DEFAULT_RECONNECT_BACKOFF};
use ipgate::enforcement::ipset::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_SET_NAME};
use ipgate::enforcement::AgentSettings;
use ipgate::gatekeeper::issuer::{DEFAULT_CODE_TTL, DEFAULT_SESSION_TTL};
use ipgate::gatekeeper::rate_limiter::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
use ipgate::gatekeeper::IssuerSettings;
use ipgate::model::parse_ip;
use ipgate::web::TrustedProxies;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable overriding the bot-score secret
pub const BOT_SCORE_SECRET_ENV: &str = "IPGATE_BOT_SCORE_SECRET";

/// ipgate configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpgateConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub issuer: IssuerConfig,

    #[serde(default)]
    pub web: WebConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub bot_score: BotScoreConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Record store connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
}

/// Code issuance and sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerConfig {
    #[serde(default = "default_code_ttl_secs")]
    pub code_ttl_secs: u64,

    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u64,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

/// Portal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Peers whose X-Forwarded-For header is trusted
    #[serde(default = "default_trusted_proxies")]
    pub trusted_proxies: Vec<String>,

    /// Public portal address, quoted in chat replies
    #[serde(default = "default_portal_url")]
    pub portal_url: String,
}

/// Enforcement agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_set_name")]
    pub set_name: String,

    #[serde(default = "default_pop_timeout_secs")]
    pub pop_timeout_secs: u64,

    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

/// Renewal bot-score verification. Disabled without a secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotScoreConfig {
    pub site_key: Option<String>,

    pub secret_key: Option<String>,

    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_expected_action")]
    pub expected_action: String,

    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    #[serde(default = "default_bot_score_timeout_secs")]
    pub timeout_secs: u64,
}

/// Operator notifications
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
}

/// Chat gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Channel codes are accepted from (any channel if unset)
    pub channel_id: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_store_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_code_ttl_secs() -> u64 {
    DEFAULT_CODE_TTL.as_secs()
}

fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL.as_secs()
}

fn default_rate_limit_max() -> u64 {
    DEFAULT_MAX_REQUESTS
}

fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_WINDOW.as_secs()
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_trusted_proxies() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

fn default_portal_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_set_name() -> String {
    DEFAULT_SET_NAME.to_string()
}

fn default_pop_timeout_secs() -> u64 {
    DEFAULT_POP_TIMEOUT.as_secs()
}

fn default_reconnect_backoff_secs() -> u64 {
    DEFAULT_RECONNECT_BACKOFF.as_secs()
}

fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT.as_secs()
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_expected_action() -> String {
    DEFAULT_EXPECTED_ACTION.to_string()
}

fn default_verify_url() -> String {
    recaptcha::DEFAULT_VERIFY_URL.to_string()
}

fn default_bot_score_timeout_secs() -> u64 {
    recaptcha::DEFAULT_TIMEOUT.as_secs()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
        }
    }
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: default_code_ttl_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            trusted_proxies: default_trusted_proxies(),
            portal_url: default_portal_url(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            set_name: default_set_name(),
            pop_timeout_secs: default_pop_timeout_secs(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl Default for BotScoreConfig {
    fn default() -> Self {
        Self {
            site_key: None,
            secret_key: None,
            threshold: default_threshold(),
            expected_action: default_expected_action(),
            verify_url: default_verify_url(),
            timeout_secs: default_bot_score_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl IpgateConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: IpgateConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Load `path`, or the default location; create a default file if missing
    pub fn load_or_create(path: Option<&str>) -> Result<(Self, PathBuf), Box<dyn std::error::Error>> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_config_path);

        if !path.exists() {
            eprintln!("No config file found. Creating default configuration...");
            Self::create_default(&path)?;
            eprintln!("   Created: {}", path.display());
        }

        Ok((Self::load(&path)?, path))
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        format!(
            r#"# ipgate configuration
#
# Shared by `ipgate serve` (portal + chat), `ipgate agent` (privileged
# firewall agent) and the `ipgate whitelist` admin commands. Every value
# below is the built-in default.

[store]
# Record store; the only state shared between serve and agent
url = "{store_url}"

[issuer]
# Lifetime of a chat code (seconds)
code_ttl_secs = {code_ttl}
# Lifetime of a renewal session, re-armed on each renewal (seconds)
session_ttl_secs = {session_ttl}
# Codes an IP may request per window
rate_limit_max = {rate_limit_max}
rate_limit_window_secs = {rate_limit_window}

[web]
listen = "{listen}"
# Only these peers may set X-Forwarded-For
trusted_proxies = ["127.0.0.1"]
portal_url = "{portal_url}"

[agent]
# ipset name; firewall rules referencing it are managed separately
set_name = "{set_name}"
pop_timeout_secs = {pop_timeout}
reconnect_backoff_secs = {reconnect_backoff}
command_timeout_secs = {command_timeout}

[bot_score]
# Renewal verification is disabled until a secret is set.
# The secret can also be given as {secret_env}.
# site_key = "..."
# secret_key = "..."
threshold = {threshold:.1}
expected_action = "{expected_action}"
verify_url = "{verify_url}"
timeout_secs = {bot_score_timeout}

[notify]
# Discord-compatible webhook for operator notices
# webhook_url = "https://discord.com/api/webhooks/..."

[chat]
# Only accept codes typed in this channel
# channel_id = "..."

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "{log_level}"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/ipgate/ipgate.log"
"#,
            store_url = default_store_url(),
            code_ttl = default_code_ttl_secs(),
            session_ttl = default_session_ttl_secs(),
            rate_limit_max = default_rate_limit_max(),
            rate_limit_window = default_rate_limit_window_secs(),
            listen = default_listen(),
            portal_url = default_portal_url(),
            set_name = default_set_name(),
            pop_timeout = default_pop_timeout_secs(),
            reconnect_backoff = default_reconnect_backoff_secs(),
            command_timeout = default_command_timeout_secs(),
            secret_env = BOT_SCORE_SECRET_ENV,
            threshold = default_threshold(),
            expected_action = default_expected_action(),
            verify_url = default_verify_url(),
            bot_score_timeout = default_bot_score_timeout_secs(),
            log_level = DEFAULT_LOG_LEVEL,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml();

        // Create parent directory if needed
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }

    pub fn issuer_settings(&self) -> IssuerSettings {
        IssuerSettings {
            code_ttl: Duration::from_secs(self.issuer.code_ttl_secs),
            session_ttl: Duration::from_secs(self.issuer.session_ttl_secs),
            rate_limit_max: self.issuer.rate_limit_max,
            rate_limit_window: Duration::from_secs(self.issuer.rate_limit_window_secs),
        }
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            pop_timeout: Duration::from_secs(self.agent.pop_timeout_secs),
            reconnect_backoff: Duration::from_secs(self.agent.reconnect_backoff_secs),
        }
    }

    pub fn bot_score_policy(&self) -> BotScorePolicy {
        BotScorePolicy {
            expected_action: self.bot_score.expected_action.clone(),
            threshold: self.bot_score.threshold,
        }
    }

    /// The bot-score secret, environment first. Empty values count as unset.
    pub fn bot_score_secret(&self) -> Option<String> {
        std::env::var(BOT_SCORE_SECRET_ENV)
            .ok()
            .or_else(|| self.bot_score.secret_key.clone())
            .filter(|secret| !secret.trim().is_empty())
    }

    pub fn trusted_proxies(&self) -> Result<TrustedProxies, Box<dyn std::error::Error>> {
        let proxies = self
            .web
            .trusted_proxies
            .iter()
            .map(|raw| parse_ip(raw))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Invalid [web] trusted_proxies entry: {}", e))?;
        Ok(TrustedProxies::new(proxies))
    }
}

/// Get the default config file path
///
/// - Linux: ~/.config/ipgate/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ipgate")
        .join("config.toml")
}
