//! Inbound message from a channel: the read-only view of one chat event the agent works on.
//!
//! Also holds the ingress filter deciding whether a message is addressed to the bot at all.

use crate::sanitize;

/// Whether a conversation is a top-level channel or a thread inside one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Channel,
    Thread,
}

/// A conversation the bot can read from and post to (channel or thread id + kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRef {
    pub id: String,
    pub kind: ConversationKind,
}

impl ConversationRef {
    pub fn channel(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ConversationKind::Channel,
        }
    }

    pub fn thread(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ConversationKind::Thread,
        }
    }

    pub fn is_thread(&self) -> bool {
        self.kind == ConversationKind::Thread
    }
}

/// File attached to a message. Bytes are fetched lazily through the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    pub content_type: Option<String>,
}

impl Attachment {
    /// True only when the declared content type starts with `image/`.
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .map_or(false, |t| t.starts_with("image/"))
    }

    /// Declared content type, or a generic binary type when the platform gave none.
    pub fn mime_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

/// A message from a channel to be routed and optionally answered by the agent.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Platform message id; used to exclude the message from its own history.
    pub id: String,
    pub conversation: ConversationRef,
    pub author_id: String,
    /// Name shown to other participants (nickname when set).
    pub author_name: String,
    /// Mention token for the author (e.g. `<@123>`), prepended to replies.
    pub author_mention: String,
    pub text: String,
    /// User ids explicitly mentioned in the message.
    pub mentions: Vec<String>,
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    /// Only the first attachment is considered; the rest are ignored.
    pub fn first_attachment(&self) -> Option<&Attachment> {
        self.attachments.first()
    }
}

/// One message read back from a conversation's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: String,
    pub author_id: String,
    pub text: String,
}

/// The bot's own user identity on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: String,
}

impl BotIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.id == user_id
    }
}

/// Ingress filter: ignore our own messages and anything not addressed to the bot.
pub fn should_process(message: &InboundMessage, bot: &BotIdentity) -> bool {
    if bot.is(&message.author_id) {
        return false;
    }
    message.mentions.iter().any(|id| bot.is(id)) || sanitize::mentions_user(&message.text, &bot.id)
}
