//! Chat platform boundary (Discord).
//!
//! Message and conversation types, the ingress filter, the platform trait the agent
//! drives, and the serenity-backed Discord connector.

mod discord;
mod inbound;
mod platform;

pub use discord::{run_discord, split_message, DiscordPlatform, DISCORD_MESSAGE_LIMIT};
pub use inbound::{
    should_process, Attachment, BotIdentity, ConversationKind, ConversationRef, HistoryMessage,
    InboundMessage,
};
pub use platform::ChatPlatform;
