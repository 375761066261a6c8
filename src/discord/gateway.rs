//! Discord gateway v10 payloads, JSON encoding.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use luna_core::agent::InboundMessage;

pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
pub const INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 12) | (1 << 15);

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Deserialize)]
struct Ready {
    user: User,
}

#[derive(Deserialize)]
struct MessageCreate {
    channel_id: String,
    #[serde(default)]
    content: String,
    author: User,
}

#[derive(Deserialize)]
struct User {
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    bot: bool,
}

// ─── Decoded events ──────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum GatewayEvent {
    Hello { heartbeat_interval: Duration },
    Ready { user_id: String, username: String },
    Message(InboundMessage),
    HeartbeatRequest,
    HeartbeatAck,
    Reconnect,
    InvalidSession,
    Other,
}

pub fn decode(payload: &GatewayPayload) -> Result<GatewayEvent> {
    let event = match payload.op {
        OP_HELLO => {
            let hello: Hello =
                serde_json::from_value(payload.d.clone()).context("Malformed HELLO payload")?;
            GatewayEvent::Hello {
                heartbeat_interval: Duration::from_millis(hello.heartbeat_interval),
            }
        }
        OP_HEARTBEAT => GatewayEvent::HeartbeatRequest,
        OP_HEARTBEAT_ACK => GatewayEvent::HeartbeatAck,
        OP_RECONNECT => GatewayEvent::Reconnect,
        OP_INVALID_SESSION => GatewayEvent::InvalidSession,
        OP_DISPATCH => match payload.t.as_deref() {
            Some("READY") => {
                let ready: Ready =
                    serde_json::from_value(payload.d.clone()).context("Malformed READY payload")?;
                GatewayEvent::Ready {
                    user_id: ready.user.id,
                    username: ready.user.username,
                }
            }
            Some("MESSAGE_CREATE") => {
                let message: MessageCreate = serde_json::from_value(payload.d.clone())
                    .context("Malformed MESSAGE_CREATE payload")?;
                GatewayEvent::Message(InboundMessage {
                    author_id: message.author.id,
                    author_is_bot: message.author.bot,
                    channel_id: message.channel_id,
                    content: message.content,
                })
            }
            _ => GatewayEvent::Other,
        },
        _ => GatewayEvent::Other,
    };
    Ok(event)
}

pub fn identify(token: &str) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "luna",
                "device": "luna"
            }
        }
    })
}

pub fn heartbeat(sequence: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": sequence })
}

/// Tracks whether the last heartbeat was acknowledged. A beat that comes due
/// while the previous one is still unacknowledged means the connection is dead.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    awaiting_ack: bool,
}

impl HeartbeatMonitor {
    /// Record that a heartbeat is about to be sent. Returns `false` if the
    /// previous one never got an ACK.
    pub fn beat(&mut self) -> bool {
        if self.awaiting_ack {
            return false;
        }
        self.awaiting_ack = true;
        true
    }

    pub fn acknowledged(&mut self) {
        self.awaiting_ack = false;
    }
}
