//! Bot runtime: wire config, persona, Gemini and Discord together and run until shutdown.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::Agent;
use crate::channels::{run_discord, DiscordPlatform};
use crate::config::{self, Config};
use crate::llm::GeminiClient;
use crate::persona;

/// Run the Discord bot. Blocks until shutdown (Ctrl+C or SIGTERM).
/// `config_path` is the path to the config file (used to resolve the persona file).
/// Fails when the Discord token or the Gemini API key is not configured.
pub async fn run_bot(config: Config, config_path: PathBuf) -> Result<()> {
    let Some(token) = config::resolve_discord_token(&config) else {
        anyhow::bail!(
            "discord bot token not configured (set DISCORD_BOT_TOKEN or channels.discord.botToken in {})",
            config_path.display()
        );
    };
    let Some(api_key) = config::resolve_gemini_api_key(&config) else {
        anyhow::bail!(
            "gemini api key not configured (set GEMINI_API_KEY or backend.apiKey in {})",
            config_path.display()
        );
    };

    let persona_path = config::resolve_persona_path(&config, &config_path);
    let persona = persona::load_persona(&persona_path);

    let gemini = GeminiClient::new(
        api_key,
        config.backend.base_url.clone(),
        config.backend.text_model.clone(),
        config.backend.image_model.clone(),
    );
    log::info!(
        "gemini models: text={}, image={}",
        gemini.text_model(),
        gemini.image_model()
    );

    let history_limit = config::resolve_history_limit(&config);
    let agent = Agent::new(
        Arc::new(DiscordPlatform::new(&token)),
        Arc::new(gemini),
        persona,
    )
    .with_history_limit(history_limit);
    log::info!("thread history limit: {}", history_limit);

    run_discord(&token, Arc::new(agent), shutdown_signal()).await?;
    log::info!("bot stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}
