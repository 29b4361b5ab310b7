//! Conversation transcript rebuilt from a thread's history for the prompt.
//!
//! The chat platform's history is the only store: nothing is persisted by the bot itself.

use crate::channels::{BotIdentity, ChatPlatform, ConversationRef, HistoryMessage};
use crate::sanitize;

/// Default number of history messages read back from a thread.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Who said a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Assistant,
    Participant,
}

impl Speaker {
    /// Label used when the transcript is written into the prompt.
    pub fn label(self) -> &'static str {
        match self {
            Speaker::Assistant => "先生",
            Speaker::Participant => "生徒",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// Turn raw history (oldest first) into transcript entries.
///
/// Skips the triggering message; bot messages are kept verbatim (they were sanitized when sent);
/// participant messages lose their bot mentions and are dropped when nothing is left.
pub fn transcript_from_history(
    history: &[HistoryMessage],
    triggering_message_id: &str,
    bot: &BotIdentity,
) -> Vec<TranscriptEntry> {
    history
        .iter()
        .filter(|m| m.id != triggering_message_id)
        .filter_map(|m| {
            if bot.is(&m.author_id) {
                Some(TranscriptEntry {
                    speaker: Speaker::Assistant,
                    text: m.text.clone(),
                })
            } else {
                let text = sanitize::strip_mentions_of(&m.text, &bot.id);
                if text.is_empty() {
                    None
                } else {
                    Some(TranscriptEntry {
                        speaker: Speaker::Participant,
                        text,
                    })
                }
            }
        })
        .collect()
}

/// Read up to `limit` messages of a thread and rebuild its transcript.
pub async fn load_transcript(
    platform: &dyn ChatPlatform,
    conversation: &ConversationRef,
    triggering_message_id: &str,
    bot: &BotIdentity,
    limit: usize,
) -> Result<Vec<TranscriptEntry>, String> {
    let history = platform.history(conversation, limit).await?;
    let transcript = transcript_from_history(&history, triggering_message_id, bot);
    log::debug!(
        "transcript: {} of {} history message(s) kept for {}",
        transcript.len(),
        history.len(),
        conversation.id
    );
    Ok(transcript)
}

/// `"{label}: {text}"` per entry, oldest first, one per line.
pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.speaker.label(), e.text))
        .collect::<Vec<_>>()
        .join("\n")
}
