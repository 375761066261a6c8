mod discord;

use std::sync::Arc;

use anyhow::{Context, Result};
use flume::{unbounded, Receiver};
use luna_core::agent::ReactionEvent;
use luna_core::config::LunaConfig;
use luna_core::runtime::LunaRuntime;
use tracing_subscriber::EnvFilter;

use discord::DiscordRest;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,luna=debug,luna_core=debug")),
        )
        .init();

    tracing::info!("Luna starting...");

    let config = LunaConfig::load();
    let token = config
        .discord_token
        .clone()
        .context("TOKEN is not set; export the Discord bot token before starting Luna")?;

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(async move {
        let (event_tx, event_rx) = unbounded();
        let outbound = Arc::new(DiscordRest::new(token.clone()));
        let runtime = LunaRuntime::bootstrap(config, outbound, event_tx)
            .context("failed to bootstrap Luna runtime")?;

        tokio::spawn(log_events(event_rx));
        discord::run_bot(token, runtime.dispatcher).await;
        Ok::<(), anyhow::Error>(())
    })
}

async fn log_events(events: Receiver<ReactionEvent>) {
    while let Ok(event) = events.recv_async().await {
        match event {
            ReactionEvent::Recorded { author_id, content } => {
                tracing::debug!("Remembered from {}: {:?}", author_id, content);
            }
            ReactionEvent::Dropped { author_id } => {
                tracing::debug!("Dropped message from {} while busy", author_id);
            }
            ReactionEvent::StatusChanged {
                author_id,
                from,
                to,
                affection,
            } => {
                tracing::debug!(
                    "Status with {}: {} -> {} (affection {})",
                    author_id,
                    from,
                    to,
                    affection
                );
            }
            ReactionEvent::Said { .. } => {}
        }
    }
}
