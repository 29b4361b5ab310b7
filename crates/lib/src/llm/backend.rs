//! Generative backend capabilities and the text/image dispatcher.

use async_trait::async_trait;

use crate::prompt::PromptPayload;

/// Image sent alongside a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Any backend failure (transport, quota, blocked or malformed response). Not retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendFailure {
    pub message: String,
}

impl BackendFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Prompt-in, text-out backend with a text-only and a text+image capability.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, BackendFailure>;

    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &ImagePart,
    ) -> Result<String, BackendFailure>;
}

/// Invoke the multimodal capability when the payload carries an image, else the text one.
pub async fn generate(
    backend: &dyn GenerativeBackend,
    payload: &PromptPayload,
) -> Result<String, BackendFailure> {
    let prompt = payload.render();
    match payload.image.as_ref() {
        Some(image) => {
            log::debug!(
                "backend: multimodal request ({} prompt chars, {} image bytes)",
                prompt.chars().count(),
                image.data.len()
            );
            backend.generate_with_image(&prompt, image).await
        }
        None => {
            log::debug!("backend: text request ({} prompt chars)", prompt.chars().count());
            backend.generate_text(&prompt).await
        }
    }
}
