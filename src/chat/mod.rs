//! Chat collaborator.
//!
//! Transport-agnostic: a chat gateway turns incoming messages into
//! `ChatMessage`s, passes them to `ChatHandler`, and posts back whatever
//! `ChatReply` comes out.

pub mod commands;
pub mod handler;

pub use commands::{parse_command, ChatCommand};
pub use handler::ChatHandler;

use crate::model::Owner;

/// An incoming chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub author: Owner,
    pub author_is_bot: bool,
    /// Whether the author holds administrator permission
    pub author_is_admin: bool,
    pub channel_id: String,
    pub text: String,
}

/// How a reply should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Success,
    Invalid,
    Error,
    Info,
}

/// A reply to post back to the author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub kind: ReplyKind,
    pub title: String,
    pub text: String,
}

impl ChatReply {
    pub fn new(kind: ReplyKind, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            text: text.into(),
        }
    }
}
