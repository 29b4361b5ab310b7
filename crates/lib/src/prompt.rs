//! Prompt construction: persona, optional transcript, the question, optional image.
//!
//! Four templates, keyed by whether the exchange continues a thread and whether an image
//! came with the question.

use crate::llm::ImagePart;
use crate::transcript::{render_transcript, TranscriptEntry};

const SECTION_BREAK: &str = "\n\n---\n\n";

/// Whether the exchange opened a new thread or continues an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    New,
    Continuing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    NewText,
    NewImage,
    ContinuingText,
    ContinuingImage,
}

impl Template {
    pub fn select(thread: ThreadState, has_image: bool) -> Self {
        match (thread, has_image) {
            (ThreadState::New, false) => Template::NewText,
            (ThreadState::New, true) => Template::NewImage,
            (ThreadState::Continuing, false) => Template::ContinuingText,
            (ThreadState::Continuing, true) => Template::ContinuingImage,
        }
    }

    pub fn includes_transcript(self) -> bool {
        matches!(self, Template::ContinuingText | Template::ContinuingImage)
    }

    /// The task text following the persona (and transcript, when present).
    fn instruction(self, requester: &str, question: &str) -> String {
        match self {
            Template::NewText => format!(
                "{} さんからの質問: \"{}\"\n\n上記の先生として、分かりやすく丁寧に応答してください。",
                requester, question
            ),
            Template::NewImage => format!(
                "{} さんからの質問です。画像とテキストをよく見て、先生として分かりやすく丁寧に応答してください。\nテキスト: \"{}\"",
                requester, question
            ),
            Template::ContinuingText => format!(
                "{} さんからの新しい質問: \"{}\"\n\nこれまでの会話を踏まえて、先生として分かりやすく丁寧に応答してください。",
                requester, question
            ),
            Template::ContinuingImage => format!(
                "{} さんからの新しい質問です。画像とテキストをよく見て、これまでの会話を踏まえて先生として分かりやすく丁寧に応答してください。\nテキスト: \"{}\"",
                requester, question
            ),
        }
    }
}

/// Backend-ready request, built once per exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub template: Template,
    pub persona: String,
    /// Rendered transcript block; only for continuing threads.
    pub transcript: Option<String>,
    pub instruction: String,
    pub image: Option<ImagePart>,
}

impl PromptPayload {
    /// Prompt text sent to the backend (the image, if any, travels separately).
    pub fn render(&self) -> String {
        let mut out = self.persona.clone();
        if let Some(ref transcript) = self.transcript {
            out.push_str(SECTION_BREAK);
            out.push_str("過去の会話履歴:\n");
            out.push_str(transcript);
        }
        out.push_str(SECTION_BREAK);
        out.push_str(&self.instruction);
        out
    }
}

pub fn build_prompt(
    persona: &str,
    transcript: &[TranscriptEntry],
    question: &str,
    image: Option<ImagePart>,
    requester: &str,
    thread: ThreadState,
) -> PromptPayload {
    let template = Template::select(thread, image.is_some());
    let transcript = if template.includes_transcript() {
        Some(render_transcript(transcript))
    } else {
        None
    };
    PromptPayload {
        template,
        persona: persona.to_string(),
        transcript,
        instruction: template.instruction(requester, question),
        image,
    }
}
