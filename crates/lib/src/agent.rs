//! Agent exchange: route an admitted message to a thread, rebuild context, ask the backend,
//! reply. Any failure after admission ends in an error notice to the user.

use std::sync::Arc;

use crate::channels::{should_process, BotIdentity, ChatPlatform, ConversationRef, InboundMessage};
use crate::llm::{self, BackendFailure, GenerativeBackend, ImagePart};
use crate::prompt::{build_prompt, ThreadState};
use crate::routing::{self, ErrorDelivery, ReplyPlan, RoutingDecision};
use crate::sanitize;
use crate::transcript::{self, DEFAULT_HISTORY_LIMIT};

/// Failure of one exchange; its display text is shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("{0}")]
    Platform(String),
    #[error(transparent)]
    Backend(#[from] BackendFailure),
}

/// How an admitted exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Reply sent to `target`.
    Replied { target: ConversationRef },
    /// The exchange failed; the error notice reached `notified` (None if every attempt failed).
    Failed { notified: Option<ConversationRef> },
}

/// Target bookkeeping for one exchange. Once a thread exists it stays the target.
#[derive(Debug, Default)]
struct ExchangeRoute {
    created_thread: Option<ConversationRef>,
}

/// Answers messages addressed to the bot. Shared across concurrent exchanges; holds no
/// per-exchange state.
pub struct Agent {
    platform: Arc<dyn ChatPlatform>,
    backend: Arc<dyn GenerativeBackend>,
    persona: Arc<str>,
    history_limit: usize,
}

impl Agent {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        backend: Arc<dyn GenerativeBackend>,
        persona: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            platform,
            backend,
            persona: persona.into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Handle one inbound message. Returns None when the ingress filter ignores it.
    pub async fn handle(&self, bot: &BotIdentity, message: InboundMessage) -> Option<ExchangeOutcome> {
        if !should_process(&message, bot) {
            log::debug!("agent: ignoring message {} from {}", message.id, message.author_id);
            return None;
        }
        let question = sanitize::strip_mentions_of(&message.text, &bot.id);
        log::info!(
            "agent: accepted ({}): {}, user: {}",
            if message.conversation.is_thread() { "thread" } else { "channel" },
            sanitize::for_log(&question),
            sanitize::for_log(&message.author_name)
        );

        if let Err(e) = self.platform.broadcast_typing(&message.conversation).await {
            log::debug!("agent: typing indicator failed: {}", e);
        }

        let mut route = ExchangeRoute::default();
        let outcome = match self.respond(bot, &message, &question, &mut route).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("agent: exchange for message {} failed: {}", message.id, e);
                let notified = self.notify_failure(&message, &route, &e).await;
                ExchangeOutcome::Failed { notified }
            }
        };
        Some(outcome)
    }

    async fn respond(
        &self,
        bot: &BotIdentity,
        message: &InboundMessage,
        question: &str,
        route: &mut ExchangeRoute,
    ) -> Result<ExchangeOutcome, ExchangeError> {
        let plan = ReplyPlan::for_message(message, question);
        let decision = RoutingDecision::decide(message, &plan, question);
        let thread_state = decision.thread_state();
        let target = match decision {
            RoutingDecision::Continue(thread) => thread,
            RoutingDecision::NewThread { title } => {
                let thread = self
                    .platform
                    .create_thread(message, &title)
                    .await
                    .map_err(ExchangeError::Platform)?;
                log::info!("agent: created thread {} ({})", thread.id, sanitize::for_log(&title));
                route.created_thread = Some(thread.clone());
                thread
            }
        };

        let reply = match plan {
            ReplyPlan::Greeting => routing::GREETING_REPLY.to_string(),
            ReplyPlan::NotAnImage => {
                log::info!("agent: attachment is not an image, asking for one");
                routing::NOT_AN_IMAGE_REPLY.to_string()
            }
            ReplyPlan::Answer { image } => {
                let transcript = match thread_state {
                    ThreadState::Continuing => transcript::load_transcript(
                        self.platform.as_ref(),
                        &target,
                        &message.id,
                        bot,
                        self.history_limit,
                    )
                    .await
                    .map_err(ExchangeError::Platform)?,
                    ThreadState::New => Vec::new(),
                };
                let image = match image {
                    Some(attachment) => {
                        let data = self
                            .platform
                            .fetch_attachment(attachment)
                            .await
                            .map_err(ExchangeError::Platform)?;
                        log::info!("agent: image attached ({}, {} bytes)", attachment.mime_type(), data.len());
                        Some(ImagePart {
                            mime_type: attachment.mime_type().to_string(),
                            data,
                        })
                    }
                    None => None,
                };
                let payload = build_prompt(
                    &self.persona,
                    &transcript,
                    question,
                    image,
                    &message.author_name,
                    thread_state,
                );
                log::debug!("agent: using template {:?}", payload.template);
                llm::generate(self.backend.as_ref(), &payload).await?
            }
        };

        if sanitize::is_blank_reply(&reply) {
            log::warn!("agent: blank reply for message {}", message.id);
            return Err(BackendFailure::new("empty reply").into());
        }
        let text = sanitize::sanitize_reply(&reply, &message.author_mention);
        self.platform
            .send_text(&target, &text)
            .await
            .map_err(ExchangeError::Platform)?;
        Ok(ExchangeOutcome::Replied { target })
    }

    /// Deliver the error notice along the fallback chain; each step fails soft.
    async fn notify_failure(
        &self,
        message: &InboundMessage,
        route: &ExchangeRoute,
        error: &ExchangeError,
    ) -> Option<ConversationRef> {
        let notice = routing::error_notice(&error.to_string());
        let chain = routing::error_delivery_chain(&message.conversation, route.created_thread.as_ref());
        for step in chain {
            let target = match step {
                ErrorDelivery::Send(target) => target,
                ErrorDelivery::OpenErrorThread => {
                    match self
                        .platform
                        .create_thread(message, routing::ERROR_THREAD_TITLE)
                        .await
                    {
                        Ok(thread) => thread,
                        Err(e) => {
                            log::error!("agent: could not open error thread: {}", e);
                            continue;
                        }
                    }
                }
            };
            match self.platform.send_text(&target, &notice).await {
                Ok(()) => return Some(target),
                Err(e) => log::error!("agent: error notice to {} failed: {}", target.id, e),
            }
        }
        log::error!("agent: error notice for message {} could not be delivered", message.id);
        None
    }
}
