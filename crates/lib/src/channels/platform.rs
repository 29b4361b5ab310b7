//! Chat platform capabilities the agent relies on.

use async_trait::async_trait;

use crate::channels::inbound::{Attachment, ConversationRef, HistoryMessage, InboundMessage};

/// Handle to a connected chat platform (threads, sends, history, attachments).
///
/// Errors are human-readable strings; the agent surfaces them verbatim in error notices.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Show a typing indicator in a conversation. Best effort.
    async fn broadcast_typing(&self, _conversation: &ConversationRef) -> Result<(), String> {
        Ok(())
    }

    /// Start a thread from `origin` with the given title; returns the new thread.
    async fn create_thread(
        &self,
        origin: &InboundMessage,
        title: &str,
    ) -> Result<ConversationRef, String>;

    /// Send a text message to a conversation.
    async fn send_text(&self, target: &ConversationRef, text: &str) -> Result<(), String>;

    /// Up to `limit` messages of a conversation, oldest first.
    async fn history(
        &self,
        conversation: &ConversationRef,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, String>;

    /// Download the bytes of an attachment.
    async fn fetch_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>, String>;
}
