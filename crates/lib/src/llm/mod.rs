//! Generative backend abstraction and Gemini client.
//!
//! The agent only sees `GenerativeBackend`; `generate` picks the text or multimodal capability.

mod backend;
mod gemini;

pub use backend::{generate, BackendFailure, GenerativeBackend, ImagePart};
pub use gemini::{GeminiClient, GeminiError, DEFAULT_BASE_URL, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
