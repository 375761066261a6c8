use std::sync::Arc;

use anyhow::{Context, Result};
use flume::Sender;

use crate::agent::{OutboundChannel, ReactionDispatcher, ReactionEvent};
use crate::config::LunaConfig;
use crate::fortune::{Fortune, RandomFortune};
use crate::memory::{MemoryStore, RelationshipStatus};

pub struct LunaRuntime {
    pub config: LunaConfig,
    pub dispatcher: Arc<ReactionDispatcher>,
}

pub struct LunaRuntimeBuilder {
    config: LunaConfig,
    outbound: Arc<dyn OutboundChannel>,
    event_tx: Sender<ReactionEvent>,
    fortune: Option<Box<dyn Fortune>>,
}

impl LunaRuntimeBuilder {
    pub fn new(
        config: LunaConfig,
        outbound: Arc<dyn OutboundChannel>,
        event_tx: Sender<ReactionEvent>,
    ) -> Self {
        Self {
            config,
            outbound,
            event_tx,
            fortune: None,
        }
    }

    pub fn with_fortune(mut self, fortune: Box<dyn Fortune>) -> Self {
        self.fortune = Some(fortune);
        self
    }

    /// Load relationship state and assemble the dispatcher. A memory file that
    /// exists but cannot be parsed fails the build.
    pub fn build(self) -> Result<LunaRuntime> {
        let config = self.config;
        let timing = config.timing().context("Invalid reaction timing")?;

        let store = MemoryStore::open(&config.memory_path).with_context(|| {
            format!(
                "Failed to restore relationship state from {}",
                config.memory_path
            )
        })?;
        log_relationships(&store);

        if config.target_bot_id.trim().is_empty() {
            tracing::warn!("TARGET_BOT_ID is not set; Luna will not react to anyone");
        } else {
            tracing::info!("Watching for messages from bot {}", config.target_bot_id);
        }

        let fortune = self
            .fortune
            .unwrap_or_else(|| Box::new(RandomFortune::from_entropy()));

        let dispatcher = Arc::new(ReactionDispatcher::new(
            config.target_bot_id.clone(),
            store,
            self.outbound,
            timing,
            fortune,
            self.event_tx,
        ));

        Ok(LunaRuntime { config, dispatcher })
    }
}

impl LunaRuntime {
    pub fn bootstrap(
        config: LunaConfig,
        outbound: Arc<dyn OutboundChannel>,
        event_tx: Sender<ReactionEvent>,
    ) -> Result<Self> {
        LunaRuntimeBuilder::new(config, outbound, event_tx).build()
    }
}

fn log_relationships(store: &MemoryStore) {
    for (id, record) in store.records() {
        let recovering = if record.status == RelationshipStatus::Hurt {
            ", recovering"
        } else {
            ""
        };
        tracing::info!(
            "Remembered {}: {}{} (affection {}, {} memories)",
            id,
            record.status,
            recovering,
            record.affection,
            record.history.len()
        );
    }
}
