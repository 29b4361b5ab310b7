//! Routing: what to reply with, where it goes, and where an error notice goes if the exchange fails.
//!
//! Everything here is pure; the agent performs the resulting platform calls.

use crate::channels::{Attachment, ConversationRef, InboundMessage};
use crate::prompt::ThreadState;

/// Longest thread title taken from the question before it is cut with an ellipsis.
pub const TITLE_MAX_CHARS: usize = 50;

pub const QUESTION_TITLE: &str = "算数の質問";
pub const IMAGE_QUESTION_TITLE: &str = "算数の質問（画像あり）";
pub const NOT_AN_IMAGE_TITLE: &str = "ファイル形式エラー";
pub const GREETING_TITLE: &str = "挨拶";
pub const ERROR_THREAD_TITLE: &str = "エラー";

pub const GREETING_REPLY: &str =
    "こんにちは！算数の勉強で分からないことはあるかな？先生に何でも質問してね！";
pub const NOT_AN_IMAGE_REPLY: &str =
    "ごめんね、これは画像ファイルではないみたいだ。画像を送ってくれるかな？";
const ERROR_NOTICE: &str = "おっと、ますお先生体調が悪くなってしまった！逃げてるわけじゃないぞ！しばらく経ったらまた質問してくれるかな？";

/// How a message will be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPlan<'a> {
    /// Ask the backend; `image` is the attachment to send along, if any.
    Answer { image: Option<&'a Attachment> },
    /// The attachment is not an image: ask for one instead of calling the backend.
    NotAnImage,
    /// Nothing but a mention: greet instead of calling the backend.
    Greeting,
}

impl<'a> ReplyPlan<'a> {
    /// The first attachment decides first; otherwise empty text means a greeting.
    pub fn for_message(message: &'a InboundMessage, question: &str) -> Self {
        match message.first_attachment() {
            Some(a) if a.is_image() => ReplyPlan::Answer { image: Some(a) },
            Some(_) => ReplyPlan::NotAnImage,
            None if question.is_empty() => ReplyPlan::Greeting,
            None => ReplyPlan::Answer { image: None },
        }
    }

    /// Title for a new thread opened for this plan.
    pub fn thread_title(&self, question: &str) -> String {
        match self {
            ReplyPlan::Answer { image: Some(_) } => thread_title(question, IMAGE_QUESTION_TITLE),
            ReplyPlan::Answer { image: None } => thread_title(question, QUESTION_TITLE),
            ReplyPlan::NotAnImage => NOT_AN_IMAGE_TITLE.to_string(),
            ReplyPlan::Greeting => GREETING_TITLE.to_string(),
        }
    }
}

/// First `TITLE_MAX_CHARS` characters of the question, `...` appended when cut; `fallback` when blank.
pub fn thread_title(question: &str, fallback: &str) -> String {
    let title = if question.chars().count() > TITLE_MAX_CHARS {
        let head: String = question.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        question.to_string()
    };
    if title.trim().is_empty() {
        fallback.to_string()
    } else {
        title
    }
}

/// Where the exchange's output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// The message is already in a thread: answer there.
    Continue(ConversationRef),
    /// Top-level message: open a thread with this title and answer there.
    NewThread { title: String },
}

impl RoutingDecision {
    pub fn decide(message: &InboundMessage, plan: &ReplyPlan<'_>, question: &str) -> Self {
        if message.conversation.is_thread() {
            RoutingDecision::Continue(message.conversation.clone())
        } else {
            RoutingDecision::NewThread {
                title: plan.thread_title(question),
            }
        }
    }

    pub fn thread_state(&self) -> ThreadState {
        match self {
            RoutingDecision::Continue(_) => ThreadState::Continuing,
            RoutingDecision::NewThread { .. } => ThreadState::New,
        }
    }
}

/// One attempt at delivering an error notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDelivery {
    Send(ConversationRef),
    /// Open a dedicated error thread from the original message and send there.
    OpenErrorThread,
}

/// Ordered delivery attempts for an error notice; the first success wins.
///
/// A thread exchange stays in its thread. A top-level exchange uses the thread it already
/// opened, or opens an error thread, and ends with the original channel.
pub fn error_delivery_chain(
    origin: &ConversationRef,
    created_thread: Option<&ConversationRef>,
) -> Vec<ErrorDelivery> {
    if origin.is_thread() {
        return vec![ErrorDelivery::Send(origin.clone())];
    }
    let first = match created_thread {
        Some(thread) => ErrorDelivery::Send(thread.clone()),
        None => ErrorDelivery::OpenErrorThread,
    };
    vec![first, ErrorDelivery::Send(origin.clone())]
}

/// User-facing error notice including the raw error detail.
pub fn error_notice(detail: &str) -> String {
    format!("{}\n`{}`", ERROR_NOTICE, detail)
}
