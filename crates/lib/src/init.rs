//! Initialize the configuration directory: create ~/.mathbot, a default config and the persona file.
//!
//! The persona template lives in `crates/lib/config/character_context.txt` and is bundled into the binary.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::PERSONA_FILE_NAME;

pub static DEFAULT_PERSONA_FILE: &str = include_str!("../config/character_context.txt");

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with `{}` if missing.
/// - Seeds `character_context.txt` from the bundled persona if missing.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let persona = config_dir.join(PERSONA_FILE_NAME);
    if !persona.exists() {
        std::fs::write(&persona, DEFAULT_PERSONA_FILE)
            .with_context(|| format!("writing default persona to {}", persona.display()))?;
        log::info!("wrote default persona to {}", persona.display());
    } else {
        log::debug!("persona already exists at {}, skipping", persona.display());
    }

    Ok(config_dir.to_path_buf())
}
