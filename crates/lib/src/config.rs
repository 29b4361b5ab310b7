//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.mathbot/config.json`) and environment.
//! Secrets may live in the file but environment variables take precedence.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::transcript::DEFAULT_HISTORY_LIMIT;

/// File name of the persona inside the config directory.
pub const PERSONA_FILE_NAME: &str = "character_context.txt";

/// Discord returns at most this many messages per history request.
const MAX_HISTORY_LIMIT: usize = 100;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Channel settings (Discord).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Generative backend (Gemini) settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Persona and conversation settings.
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub discord: DiscordChannelConfig,
}

/// Discord channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordChannelConfig {
    /// Bot token from the Discord developer portal. Overridden by DISCORD_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
}

/// Gemini settings. Unset models fall back to the client defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// API key. Overridden by GEMINI_API_KEY env when set.
    pub api_key: Option<String>,
    /// API base URL (default https://generativelanguage.googleapis.com/v1beta).
    pub base_url: Option<String>,
    /// Model for text-only questions (default gemini-2.5-flash).
    pub text_model: Option<String>,
    /// Model for questions with an image (default gemini-2.5-pro).
    pub image_model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Persona file. Relative paths are resolved against the config file's parent. Default: character_context.txt next to the config.
    pub persona_path: Option<PathBuf>,
    /// Thread messages read back as context (default 50, at most 100).
    pub history_limit: Option<usize>,
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the Discord bot token: env DISCORD_BOT_TOKEN overrides config.
pub fn resolve_discord_token(config: &Config) -> Option<String> {
    env_non_empty("DISCORD_BOT_TOKEN")
        .or_else(|| config_non_empty(config.channels.discord.bot_token.as_ref()))
}

/// Resolve the Gemini API key: env GEMINI_API_KEY overrides config.
pub fn resolve_gemini_api_key(config: &Config) -> Option<String> {
    env_non_empty("GEMINI_API_KEY").or_else(|| config_non_empty(config.backend.api_key.as_ref()))
}

/// History limit from config, clamped to what one history request can return.
pub fn resolve_history_limit(config: &Config) -> usize {
    config
        .agent
        .history_limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

fn config_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve the persona file: `agent.personaPath` (relative to the config directory) or the default file name there.
pub fn resolve_persona_path(config: &Config, config_path: &Path) -> PathBuf {
    let dir = config_dir(config_path);
    match &config.agent.persona_path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                dir.join(p)
            }
        }
        _ => dir.join(PERSONA_FILE_NAME),
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("MATHBOT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".mathbot").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used (for resolving the persona file).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
