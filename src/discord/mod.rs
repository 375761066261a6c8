//! Discord integration for Luna.
//!
//! Holds a gateway websocket session open to receive `MESSAGE_CREATE` events
//! and hands messages from the watched bot to the reaction dispatcher. Replies
//! go out over the REST API.

pub mod gateway;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use gateway::{GatewayEvent, GatewayPayload, HeartbeatMonitor};
use luna_core::agent::{OutboundChannel, ReactionDispatcher};

const API_BASE: &str = "https://discord.com/api/v10";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
// Discord enforces a 2000-character limit per message.
const MAX_MESSAGE_CHARS: usize = 2000;

// ─── Outbound ────────────────────────────────────────────────────────────────

pub struct DiscordRest {
    client: reqwest::Client,
    token: String,
}

impl DiscordRest {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }
}

#[async_trait]
impl OutboundChannel for DiscordRest {
    async fn send(&self, channel_id: &str, text: &str) {
        let text = truncate_chars(text, MAX_MESSAGE_CHARS);
        let url = format!("{}/channels/{}/messages", API_BASE, channel_id);
        let payload = serde_json::json!({ "content": text });

        match self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .json(&payload)
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => {
                tracing::debug!("Discord: sent message to channel {}", channel_id);
            }
            Ok(r) => {
                tracing::warn!("Discord create message failed: HTTP {}", r.status());
            }
            Err(e) => {
                tracing::error!("Discord create message error: {}", e);
            }
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

// ─── Gateway loop ────────────────────────────────────────────────────────────

/// Keep a gateway session alive forever, reconnecting after failures.
pub async fn run_bot(token: String, dispatcher: Arc<ReactionDispatcher>) {
    loop {
        match run_session(&token, &dispatcher).await {
            Ok(()) => tracing::info!("Discord gateway session ended, reconnecting"),
            Err(e) => tracing::warn!("Discord gateway error: {:#}", e),
        }
        sleep(RECONNECT_DELAY).await;
    }
}

/// One gateway session. Returns `Ok` when Discord asks us to reconnect.
async fn run_session(token: &str, dispatcher: &Arc<ReactionDispatcher>) -> Result<()> {
    let (socket, _) = connect_async(gateway::GATEWAY_URL)
        .await
        .context("Failed to connect to Discord gateway")?;
    let (mut write, mut read) = socket.split();

    let hello = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                let payload: GatewayPayload =
                    serde_json::from_str(&text).context("Unreadable gateway greeting")?;
                break gateway::decode(&payload)?;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e).context("Gateway read failed before HELLO"),
            None => bail!("Gateway closed before HELLO"),
        }
    };
    let GatewayEvent::Hello { heartbeat_interval } = hello else {
        bail!("Expected HELLO from gateway, got {:?}", hello);
    };
    tracing::debug!("Discord gateway heartbeat interval {:?}", heartbeat_interval);

    write
        .send(Message::Text(gateway::identify(token).to_string()))
        .await
        .context("Failed to send IDENTIFY")?;

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    // The first tick fires immediately; the first beat is due one interval in.
    heartbeat.tick().await;
    let mut monitor = HeartbeatMonitor::default();
    let mut sequence: Option<u64> = None;
    let mut own_id: Option<String> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !monitor.beat() {
                    bail!("No heartbeat ACK since the last beat; connection looks zombied");
                }
                write
                    .send(Message::Text(gateway::heartbeat(sequence).to_string()))
                    .await
                    .context("Failed to send heartbeat")?;
            }
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => bail!("Gateway closed the session: {:?}", frame),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e).context("Gateway read failed"),
                    None => bail!("Gateway stream ended"),
                };

                let payload: GatewayPayload = match serde_json::from_str(&text) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!("Discord: skipping unreadable gateway frame: {}", e);
                        continue;
                    }
                };
                if payload.s.is_some() {
                    sequence = payload.s;
                }

                match gateway::decode(&payload) {
                    Ok(GatewayEvent::Ready { user_id, username }) => {
                        tracing::info!("Luna online as {} ({})", username, user_id);
                        own_id = Some(user_id);
                    }
                    Ok(GatewayEvent::Message(message)) => {
                        if own_id.as_deref() == Some(message.author_id.as_str()) {
                            continue;
                        }
                        if dispatcher.is_counterpart(&message) {
                            tracing::debug!(
                                "Discord [channel {}] {}: {:?}",
                                message.channel_id,
                                message.author_id,
                                message.content
                            );
                            dispatcher.dispatch(message);
                        }
                    }
                    Ok(GatewayEvent::HeartbeatRequest) => {
                        write
                            .send(Message::Text(gateway::heartbeat(sequence).to_string()))
                            .await
                            .context("Failed to answer heartbeat request")?;
                    }
                    Ok(GatewayEvent::Reconnect) => {
                        tracing::info!("Discord requested a reconnect");
                        return Ok(());
                    }
                    Ok(GatewayEvent::InvalidSession) => {
                        tracing::warn!("Discord invalidated the session");
                        return Ok(());
                    }
                    Ok(GatewayEvent::HeartbeatAck) => monitor.acknowledged(),
                    Ok(GatewayEvent::Hello { .. } | GatewayEvent::Other) => {}
                    Err(e) => tracing::warn!("Discord: skipping gateway event: {:#}", e),
                }
            }
        }
    }
}
