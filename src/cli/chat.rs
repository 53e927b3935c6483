//! Line-oriented chat gateway.
//!
//! A chat-platform relay writes one JSON message per line to stdin and reads
//! one JSON reply per handled message from stdout:
//!
//! ```json
//! {"id":"m1","author_id":"42","author_name":"alice","channel_id":"99","text":"AB12"}
//! {"id":"m1","kind":"success","title":"IP authorized","text":"..."}
//! ```
//!
//! Messages that need no reply produce no output.

use super::config::IpgateConfig;
use super::{logging, wiring};
use ipgate::chat::{ChatHandler, ChatMessage, ChatReply, ReplyKind};
use ipgate::gatekeeper::{AuthorizationIssuer, WhitelistAdmin};
use ipgate::model::Owner;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// A message as the relay sends it.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    /// Opaque id echoed back in the reply
    #[serde(default)]
    pub id: Option<String>,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub author_is_bot: bool,
    #[serde(default)]
    pub author_is_admin: bool,
    pub channel_id: String,
    pub text: String,
}

impl InboundMessage {
    pub fn into_message(self) -> (Option<String>, ChatMessage) {
        (
            self.id,
            ChatMessage {
                author: Owner::new(self.author_id, self.author_name),
                author_is_bot: self.author_is_bot,
                author_is_admin: self.author_is_admin,
                channel_id: self.channel_id,
                text: self.text,
            },
        )
    }
}

/// A reply as the relay receives it.
#[derive(Debug, Serialize)]
pub struct OutboundReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: &'static str,
    pub title: String,
    pub text: String,
}

impl OutboundReply {
    pub fn new(id: Option<String>, reply: ChatReply) -> Self {
        let kind = match reply.kind {
            ReplyKind::Success => "success",
            ReplyKind::Invalid => "invalid",
            ReplyKind::Error => "error",
            ReplyKind::Info => "info",
        };
        Self {
            id,
            kind,
            title: reply.title,
            text: reply.text,
        }
    }
}

/// Serve chat messages from stdin until EOF
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, _) = IpgateConfig::load_or_create(config_path.as_deref())?;
    logging::init(&config.logging)?;

    let store = wiring::connect_store(&config).await?;
    let notifier = wiring::notifier(&config)?;
    let handler = ChatHandler::new(
        Arc::new(AuthorizationIssuer::new(
            store.clone(),
            config.issuer_settings(),
        )),
        Arc::new(WhitelistAdmin::new(store, notifier.clone())),
        notifier,
        config.chat.channel_id.clone(),
        config.web.portal_url.clone(),
    );
    info!(channel = ?config.chat.channel_id, "Chat gateway reading from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let inbound: InboundMessage = match serde_json::from_str(&line) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Ignoring unreadable chat message: {}", e);
                continue;
            }
        };

        let (id, message) = inbound.into_message();
        if let Some(reply) = handler.handle(&message).await {
            let mut out = serde_json::to_string(&OutboundReply::new(id, reply))?;
            out.push('\n');
            stdout.write_all(out.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    info!("Chat input closed");
    Ok(())
}
