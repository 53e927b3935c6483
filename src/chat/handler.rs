//! Chat message handling.

use super::commands::{parse_command, ChatCommand, WHITELIST_USAGE};
use super::{ChatMessage, ChatReply, ReplyKind};
use crate::gatekeeper::{AdminError, AuthorizationIssuer, IssuerError, ValidateOutcome, WhitelistAdmin};
use crate::model::Code;
use crate::notify::{Notice, Notifier};
use crate::store::RecordStore;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Longest list body a reply may carry.
pub const MAX_REPLY_CHARS: usize = 4000;

/// Routes chat messages to the issuer and the admin operations.
pub struct ChatHandler<S: RecordStore> {
    issuer: Arc<AuthorizationIssuer<S>>,
    admin: Arc<WhitelistAdmin<S>>,
    notifier: Arc<dyn Notifier>,
    /// Only code submissions from this channel are considered; `None`
    /// accepts every channel
    channel_id: Option<String>,
    portal_url: String,
}

impl<S: RecordStore> ChatHandler<S> {
    pub fn new(
        issuer: Arc<AuthorizationIssuer<S>>,
        admin: Arc<WhitelistAdmin<S>>,
        notifier: Arc<dyn Notifier>,
        channel_id: Option<String>,
        portal_url: impl Into<String>,
    ) -> Self {
        Self {
            issuer,
            admin,
            notifier,
            channel_id,
            portal_url: portal_url.into(),
        }
    }

    /// Handle one message. `None` means stay silent.
    pub async fn handle(&self, message: &ChatMessage) -> Option<ChatReply> {
        if message.author_is_bot {
            return None;
        }

        let command = parse_command(&message.text);

        if command.is_admin_only() && !message.author_is_admin {
            warn!(user = %message.author.name, "Non-admin attempted whitelist command");
            return Some(ChatReply::new(
                ReplyKind::Error,
                "Permission denied",
                "Only administrators can manage the whitelist.",
            ));
        }

        match command {
            ChatCommand::SubmitCode(code) => {
                if let Some(channel) = &self.channel_id {
                    if channel != &message.channel_id {
                        return None;
                    }
                }
                Some(self.submit_code(&code, message).await)
            }
            ChatCommand::WhitelistList => Some(self.list().await),
            ChatCommand::WhitelistRemove { ip } => Some(self.remove(&ip, message).await),
            ChatCommand::WhitelistFlush => Some(self.flush(message).await),
            ChatCommand::WhitelistUsage => Some(ChatReply::new(
                ReplyKind::Info,
                "Usage",
                WHITELIST_USAGE,
            )),
            ChatCommand::Ignored => None,
        }
    }

    async fn submit_code(&self, code: &Code, message: &ChatMessage) -> ChatReply {
        match self.issuer.validate_code(code.as_str(), &message.author).await {
            Ok(ValidateOutcome::Promoted(promotion)) => {
                self.notifier.notify(Notice::Promoted {
                    ip: promotion.ip,
                    owner: promotion.owner.clone(),
                });
                ChatReply::new(
                    ReplyKind::Success,
                    "IP authorized",
                    format!(
                        "Your IP has been authorized. You can connect to the server now.\n\n\
                         If you still can't get in, open the portal: {}",
                        self.portal_url
                    ),
                )
            }
            Ok(ValidateOutcome::Invalid) => ChatReply::new(
                ReplyKind::Invalid,
                "Invalid code",
                "Invalid or expired code. Generate a new one on the portal.",
            ),
            Err(e) => {
                match &e {
                    IssuerError::EnqueueFailed(_) => {
                        error!(code = %code, user = %message.author.name, "Promotion failed: {}", e)
                    }
                    IssuerError::Store(_) => {
                        error!(code = %code, "Record store failure during validation: {}", e)
                    }
                }
                ChatReply::new(
                    ReplyKind::Error,
                    "Error",
                    "Failed to authorize your IP. Contact an administrator.",
                )
            }
        }
    }

    async fn list(&self) -> ChatReply {
        let listed = match self.admin.list().await {
            Ok(listed) => listed,
            Err(e) => {
                error!("Failed to list whitelist: {}", e);
                return ChatReply::new(ReplyKind::Error, "Error", "Failed to read the whitelist.");
            }
        };

        if listed.is_empty() {
            return ChatReply::new(ReplyKind::Info, "Whitelist", "No IPs are whitelisted.");
        }

        let body = listed
            .iter()
            .map(|entry| entry.render())
            .collect::<Vec<_>>()
            .join("\n");

        ChatReply::new(
            ReplyKind::Info,
            format!("Whitelist ({} IPs)", listed.len()),
            truncate(&body, MAX_REPLY_CHARS),
        )
    }

    async fn remove(&self, raw_ip: &str, message: &ChatMessage) -> ChatReply {
        match self.admin.remove(raw_ip, &message.author.name).await {
            Ok(_) => ChatReply::new(
                ReplyKind::Success,
                "IP removed",
                format!("`{}` removed from the whitelist.", raw_ip.trim()),
            ),
            Err(AdminError::InvalidIp(ip)) => ChatReply::new(
                ReplyKind::Invalid,
                "Invalid IP",
                format!("`{}` is not a valid IP address.", ip),
            ),
            Err(e) => {
                error!(ip = %raw_ip, "Failed to remove IP: {}", e);
                ChatReply::new(
                    ReplyKind::Error,
                    "Error",
                    format!("Failed to remove `{}`.", raw_ip.trim()),
                )
            }
        }
    }

    async fn flush(&self, message: &ChatMessage) -> ChatReply {
        match self.admin.flush(&message.author.name).await {
            Ok(count) => {
                info!(user = %message.author.name, count, "Whitelist flushed from chat");
                ChatReply::new(
                    ReplyKind::Success,
                    "Whitelist flushed",
                    format!("Removed {} IPs.", count),
                )
            }
            Err(e) => {
                error!("Failed to flush whitelist: {}", e);
                ChatReply::new(ReplyKind::Error, "Error", "Failed to flush the whitelist.")
            }
        }
    }
}

/// Cut `text` to at most `max` characters, marking the cut.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::{CodeOutcome, IssuerSettings};
    use crate::model::{ActiveEntry, Owner};
    use crate::notify::RecordingNotifier;
    use crate::store::{encode_record, keys, MemoryStore};
    use std::net::IpAddr;

    const CHANNEL: &str = "whitelist-channel";

    struct Fixture {
        store: Arc<MemoryStore>,
        issuer: Arc<AuthorizationIssuer<MemoryStore>>,
        notifier: RecordingNotifier,
        handler: ChatHandler<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = RecordingNotifier::new();
        let shared: Arc<dyn Notifier> = Arc::new(notifier.clone());
        let issuer = Arc::new(AuthorizationIssuer::new(
            store.clone(),
            IssuerSettings::default(),
        ));
        let admin = Arc::new(WhitelistAdmin::new(store.clone(), shared.clone()));
        let handler = ChatHandler::new(
            issuer.clone(),
            admin,
            shared,
            Some(CHANNEL.to_string()),
            "https://portal.example",
        );
        Fixture {
            store,
            issuer,
            notifier,
            handler,
        }
    }

    fn message(text: &str) -> ChatMessage {
        ChatMessage {
            author: Owner::new("1001", "alice"),
            author_is_bot: false,
            author_is_admin: false,
            channel_id: CHANNEL.to_string(),
            text: text.to_string(),
        }
    }

    fn admin_message(text: &str) -> ChatMessage {
        ChatMessage {
            author_is_admin: true,
            ..message(text)
        }
    }

    fn ip() -> IpAddr {
        "203.0.113.50".parse().unwrap()
    }

    async fn issue(f: &Fixture) -> Code {
        match f.issuer.request_code(ip()).await.unwrap() {
            CodeOutcome::Issued { code, .. } => code,
            other => panic!("Expected code, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_code_submission_promotes() {
        let f = fixture();
        let code = issue(&f).await;

        let reply = f
            .handler
            .handle(&message(&code.as_str().to_lowercase()))
            .await
            .unwrap();
        assert_eq!(reply.kind, ReplyKind::Success);
        assert!(reply.text.contains("https://portal.example"));
        assert!(f.issuer.is_active(ip()).await.unwrap());
        assert_eq!(
            f.notifier.notices(),
            vec![Notice::Promoted {
                ip: ip(),
                owner: Owner::new("1001", "alice"),
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_code_is_invalid() {
        let f = fixture();
        let reply = f.handler.handle(&message("QQQQ")).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::Invalid);
        assert!(f.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_failure_replies_error() {
        let f = fixture();
        let code = issue(&f).await;
        f.store.reject_pushes(true);

        let reply = f.handler.handle(&message(code.as_str())).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::Error);
        assert!(f.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_ignores_bots_other_channels_and_chatter() {
        let f = fixture();
        let code = issue(&f).await;

        let bot = ChatMessage {
            author_is_bot: true,
            ..message(code.as_str())
        };
        assert!(f.handler.handle(&bot).await.is_none());

        let elsewhere = ChatMessage {
            channel_id: "general".to_string(),
            ..message(code.as_str())
        };
        assert!(f.handler.handle(&elsewhere).await.is_none());

        assert!(f.handler.handle(&message("good morning")).await.is_none());
        assert!(!f.issuer.is_active(ip()).await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_commands_require_permission() {
        let f = fixture();
        let reply = f.handler.handle(&message("/whitelist flush")).await.unwrap();
        assert_eq!(reply.title, "Permission denied");
        assert!(f.store.list(keys::QUEUE).is_empty());
    }

    #[tokio::test]
    async fn test_admin_remove_and_flush() {
        let f = fixture();
        let code = issue(&f).await;
        f.handler.handle(&message(code.as_str())).await.unwrap();

        let reply = f
            .handler
            .handle(&admin_message("/whitelist remove 203.0.113.50"))
            .await
            .unwrap();
        assert_eq!(reply.kind, ReplyKind::Success);
        assert!(!f.issuer.is_active(ip()).await.unwrap());

        let reply = f
            .handler
            .handle(&admin_message("/whitelist remove nonsense"))
            .await
            .unwrap();
        assert_eq!(reply.kind, ReplyKind::Invalid);

        let reply = f
            .handler
            .handle(&admin_message("/whitelist flush"))
            .await
            .unwrap();
        assert_eq!(reply.text, "Removed 0 IPs.");
    }

    #[tokio::test]
    async fn test_admin_list_is_truncated() {
        let f = fixture();
        let entry = encode_record(&ActiveEntry::new(&Owner::new("7", "bob"))).unwrap();
        for i in 0..400u32 {
            let ip: IpAddr = format!("10.0.{}.{}", i / 250, i % 250).parse().unwrap();
            f.store.set(&keys::active(&ip), &entry).await.unwrap();
        }

        let reply = f
            .handler
            .handle(&admin_message("/whitelist list"))
            .await
            .unwrap();
        assert_eq!(reply.title, "Whitelist (400 IPs)");
        assert!(reply.text.ends_with("\n..."));
        assert_eq!(reply.text.chars().count(), MAX_REPLY_CHARS + 4);
    }

    #[tokio::test]
    async fn test_admin_list_empty() {
        let f = fixture();
        let reply = f
            .handler
            .handle(&admin_message("/whitelist list"))
            .await
            .unwrap();
        assert_eq!(reply.text, "No IPs are whitelisted.");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 2), "éé\n...");
    }
}
