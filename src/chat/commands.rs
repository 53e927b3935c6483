//! Chat message parsing.
//!
//! Plain messages are code submissions. `/whitelist` commands are the
//! operator interface.

use crate::model::Code;

/// What a chat message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// A whitelist code, already normalized
    SubmitCode(Code),

    /// List authorized IPs (admin)
    WhitelistList,

    /// Revoke one IP (admin)
    WhitelistRemove { ip: String },

    /// Revoke everything (admin)
    WhitelistFlush,

    /// `/whitelist` with a missing or unknown subcommand
    WhitelistUsage,

    /// Anything else; chat is not a command line, so this is ignored
    Ignored,
}

impl ChatCommand {
    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            ChatCommand::WhitelistList
                | ChatCommand::WhitelistRemove { .. }
                | ChatCommand::WhitelistFlush
                | ChatCommand::WhitelistUsage
        )
    }
}

/// Usage line for the admin command group.
pub const WHITELIST_USAGE: &str = "/whitelist list | /whitelist remove <ip> | /whitelist flush";

/// Parse a chat message.
pub fn parse_command(text: &str) -> ChatCommand {
    let text = text.trim();

    if !text.starts_with('/') {
        return match Code::parse(text) {
            Ok(code) => ChatCommand::SubmitCode(code),
            Err(_) => ChatCommand::Ignored,
        };
    }

    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.first() != Some(&"/whitelist") {
        return ChatCommand::Ignored;
    }

    match parts.get(1).copied() {
        Some("list") => ChatCommand::WhitelistList,
        Some("flush") => ChatCommand::WhitelistFlush,
        Some("remove") => match parts.get(2) {
            Some(ip) => ChatCommand::WhitelistRemove { ip: ip.to_string() },
            None => ChatCommand::WhitelistUsage,
        },
        _ => ChatCommand::WhitelistUsage,
    }
}
