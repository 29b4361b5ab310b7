//! Discord channel: serenity gateway client for inbound events, REST API for threads and replies.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::all::{
    Channel, ChannelId, Client, Context, CreateThread, EventHandler, GatewayIntents, GetMessages,
    Http, Mentionable, Message, MessageId, MessageType, Ready,
};

use crate::agent::{Agent, ExchangeOutcome};
use crate::channels::inbound::{
    should_process, Attachment, BotIdentity, ConversationRef, HistoryMessage, InboundMessage,
};
use crate::channels::platform::ChatPlatform;

/// Discord rejects messages longer than this many characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Largest page the message history endpoint returns.
const HISTORY_PAGE_MAX: usize = 100;

/// Discord REST side of the bot: threads, sends, history and attachment download.
pub struct DiscordPlatform {
    http: Arc<Http>,
    client: reqwest::Client,
}

impl DiscordPlatform {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
            client: reqwest::Client::new(),
        }
    }
}

fn snowflake(id: &str) -> Result<u64, String> {
    id.trim()
        .parse::<u64>()
        .ok()
        .filter(|v| *v != 0)
        .ok_or_else(|| format!("invalid discord id: {}", id))
}

fn channel_id(conversation: &ConversationRef) -> Result<ChannelId, String> {
    snowflake(&conversation.id).map(ChannelId::new)
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn broadcast_typing(&self, conversation: &ConversationRef) -> Result<(), String> {
        channel_id(conversation)?
            .broadcast_typing(&*self.http)
            .await
            .map_err(|e| e.to_string())
    }

    async fn create_thread(
        &self,
        origin: &InboundMessage,
        title: &str,
    ) -> Result<ConversationRef, String> {
        let message_id = MessageId::new(snowflake(&origin.id)?);
        let thread = channel_id(&origin.conversation)?
            .create_thread_from_message(&*self.http, message_id, CreateThread::new(title))
            .await
            .map_err(|e| e.to_string())?;
        Ok(ConversationRef::thread(thread.id.to_string()))
    }

    async fn send_text(&self, target: &ConversationRef, text: &str) -> Result<(), String> {
        let channel = channel_id(target)?;
        for chunk in split_message(text, DISCORD_MESSAGE_LIMIT) {
            channel
                .say(&*self.http, chunk)
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    async fn history(
        &self,
        conversation: &ConversationRef,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, String> {
        let limit = limit.clamp(1, HISTORY_PAGE_MAX) as u8;
        // `after` the smallest id yields the oldest messages of the conversation.
        let request = GetMessages::new().after(MessageId::new(1)).limit(limit);
        let mut messages = channel_id(conversation)?
            .messages(&*self.http, request)
            .await
            .map_err(|e| e.to_string())?;
        messages.sort_by_key(|m| m.id);
        Ok(messages
            .into_iter()
            .filter(|m| m.kind != MessageType::ThreadStarterMessage)
            .map(|m| HistoryMessage {
                id: m.id.to_string(),
                author_id: m.author.id.to_string(),
                text: m.content,
            })
            .collect())
    }

    async fn fetch_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>, String> {
        let res = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            return Err(format!(
                "attachment download failed: {} ({})",
                res.status(),
                attachment.filename
            ));
        }
        let bytes = res.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}

/// Split text into chunks of at most `max_chars` characters, breaking at line ends where possible.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        let sep = usize::from(!current.is_empty());
        if current_len + sep + line_len <= max_chars {
            if sep == 1 {
                current.push('\n');
            }
            current.push_str(line);
            current_len += sep + line_len;
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= max_chars {
            current = line.to_string();
            current_len = line_len;
            continue;
        }
        // Single line too long: hard-split on character boundaries.
        let chars: Vec<char> = line.chars().collect();
        let mut pieces = chars.chunks(max_chars).peekable();
        while let Some(piece) = pieces.next() {
            let piece_str: String = piece.iter().collect();
            if pieces.peek().is_some() {
                chunks.push(piece_str);
            } else {
                current_len = piece.len();
                current = piece_str;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Convert a serenity message. The conversation is assumed top-level until resolved.
fn inbound_from_discord(msg: &Message) -> InboundMessage {
    let author_name = msg
        .member
        .as_ref()
        .and_then(|m| m.nick.clone())
        .or_else(|| msg.author.global_name.clone())
        .unwrap_or_else(|| msg.author.name.clone());
    InboundMessage {
        id: msg.id.to_string(),
        conversation: ConversationRef::channel(msg.channel_id.to_string()),
        author_id: msg.author.id.to_string(),
        author_name,
        author_mention: msg.author.mention().to_string(),
        text: msg.content.clone(),
        mentions: msg.mentions.iter().map(|u| u.id.to_string()).collect(),
        attachments: msg
            .attachments
            .iter()
            .map(|a| Attachment {
                filename: a.filename.clone(),
                url: a.url.clone(),
                content_type: a.content_type.clone(),
            })
            .collect(),
    }
}

/// Threads are guild channels carrying thread metadata.
async fn resolve_conversation(ctx: &Context, channel: ChannelId) -> ConversationRef {
    let lookup = channel
        .to_channel(ctx)
        .await
        .map(|c| matches!(c, Channel::Guild(gc) if gc.thread_metadata.is_some()))
        .map_err(|e| e.to_string());
    conversation_from_lookup(&channel.to_string(), lookup)
}

/// A failed lookup is treated as top-level. Inside a thread that means thread creation fails
/// and the error notice arrives through the fallback chain.
fn conversation_from_lookup(channel_id: &str, is_thread: Result<bool, String>) -> ConversationRef {
    match is_thread {
        Ok(true) => ConversationRef::thread(channel_id),
        Ok(false) => ConversationRef::channel(channel_id),
        Err(e) => {
            log::warn!(
                "discord: could not resolve channel {} ({}); treating it as top-level, a reply inside a thread will fail to open a new thread and fall back to an error notice",
                channel_id,
                e
            );
            ConversationRef::channel(channel_id)
        }
    }
}

struct DiscordHandler {
    agent: Arc<Agent>,
    bot: OnceLock<BotIdentity>,
}

#[serenity::async_trait]
impl EventHandler for DiscordHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        let Some(bot) = self.bot.get() else {
            log::debug!("discord: message before ready, ignoring");
            return;
        };
        let mut inbound = inbound_from_discord(&msg);
        if !should_process(&inbound, bot) {
            return;
        }
        inbound.conversation = resolve_conversation(&ctx, msg.channel_id).await;
        match self.agent.handle(bot, inbound).await {
            Some(ExchangeOutcome::Replied { target }) => {
                log::info!("discord: replied in {}", target.id);
            }
            Some(ExchangeOutcome::Failed { notified: None }) => {
                log::error!("discord: message {} failed and no error notice was delivered", msg.id);
            }
            Some(outcome) => log::debug!("discord: exchange ended: {:?}", outcome),
            None => {}
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        log::info!("discord: logged in as {}", ready.user.name);
        log::info!("discord: bot id {}", ready.user.id);
        log::info!("discord: connected to {} guild(s)", ready.guilds.len());
        for guild in &ready.guilds {
            log::info!("discord:   - guild {}", guild.id);
        }
        if self.bot.set(BotIdentity::new(ready.user.id.to_string())).is_err() {
            log::debug!("discord: ready received again (reconnect)");
        }
    }
}

/// Connect to the Discord gateway and hand addressed messages to the agent until `shutdown` completes.
pub async fn run_discord<F>(token: &str, agent: Arc<Agent>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let handler = DiscordHandler {
        agent,
        bot: OnceLock::new(),
    };
    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .context("creating discord client")?;
    let shard_manager = client.shard_manager.clone();
    log::info!("discord: connecting to gateway");

    tokio::select! {
        _ = shutdown => {
            log::info!("discord: shutdown requested, stopping shards");
            shard_manager.shutdown_all().await;
        }
        result = client.start() => {
            result.context("discord client stopped")?;
            log::info!("discord: client stopped");
        }
    }
    Ok(())
}
