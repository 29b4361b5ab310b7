//! Persona loader: the teacher character preamble that opens every prompt.
//!
//! Read once at startup from a plain-text file (e.g. `character_context.txt`).

use std::fs;
use std::path::Path;

/// Used when the persona file is missing or empty.
pub const DEFAULT_PERSONA: &str = "算数の先生として丁寧に指導してください。";

/// Load the persona from `path`, trimmed. Falls back to `DEFAULT_PERSONA` and logs an error.
pub fn load_persona(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(s) if !s.trim().is_empty() => {
            log::info!("persona loaded from {}", path.display());
            s.trim().to_string()
        }
        Ok(_) => {
            log::error!("persona file {} is empty, using default persona", path.display());
            DEFAULT_PERSONA.to_string()
        }
        Err(e) => {
            log::error!("persona file {} not readable ({}), using default persona", path.display(), e);
            DEFAULT_PERSONA.to_string()
        }
    }
}
