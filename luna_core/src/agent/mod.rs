pub mod affection;
pub mod dialogue;
pub mod gate;

use anyhow::Result;
use async_trait::async_trait;
use flume::Sender;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

use crate::config::ReactionTiming;
use crate::fortune::Fortune;
use crate::memory::{MemoryStore, RelationshipStatus};
use affection::{FumbleRoll, Reaction};
use dialogue::{DialogueBand, NEEDS_SPACE_LINE};
use gate::GateRegistry;

/// A chat message as delivered by the platform adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub author_id: String,
    pub author_is_bot: bool,
    pub channel_id: String,
    pub content: String,
}

/// Where replies go. Sends are fire-and-forget: implementations log their own
/// failures and never report them back.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    async fn send(&self, channel_id: &str, text: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionEvent {
    Recorded {
        author_id: String,
        content: String,
    },
    Dropped {
        author_id: String,
    },
    StatusChanged {
        author_id: String,
        from: RelationshipStatus,
        to: RelationshipStatus,
        affection: u32,
    },
    Said {
        author_id: String,
        channel_id: String,
        text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// Not from the configured counterpart.
    Ignored,
    /// Arrived while the counterpart's gate was engaged.
    Dropped,
    Repaired,
    StillHurt,
    Fumbled { needs_space: bool },
    Replied,
    Silent,
}

/// Paces reactions to the counterpart: record, think, update state,
/// speak, cool down.
pub struct ReactionDispatcher {
    target_id: String,
    store: Arc<Mutex<MemoryStore>>,
    outbound: Arc<dyn OutboundChannel>,
    timing: ReactionTiming,
    gates: GateRegistry,
    fortune: StdMutex<Box<dyn Fortune>>,
    event_tx: Sender<ReactionEvent>,
}

impl ReactionDispatcher {
    pub fn new(
        target_id: impl Into<String>,
        store: MemoryStore,
        outbound: Arc<dyn OutboundChannel>,
        timing: ReactionTiming,
        fortune: Box<dyn Fortune>,
        event_tx: Sender<ReactionEvent>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            store: Arc::new(Mutex::new(store)),
            outbound,
            timing,
            gates: GateRegistry::default(),
            fortune: StdMutex::new(fortune),
            event_tx,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn store(&self) -> &Arc<Mutex<MemoryStore>> {
        &self.store
    }

    pub fn is_counterpart(&self, message: &InboundMessage) -> bool {
        message.author_is_bot && message.author_id == self.target_id
    }

    /// Handle `message` on a background task, logging the outcome.
    pub fn dispatch(self: &Arc<Self>, message: InboundMessage) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let author = message.author_id.clone();
            match dispatcher.handle(message).await {
                Ok(ReactionOutcome::Ignored) => {}
                Ok(outcome) => tracing::debug!("Reaction to {} finished: {:?}", author, outcome),
                Err(e) => tracing::error!("Reaction to {} failed: {:#}", author, e),
            }
        })
    }

    /// Run one full reaction cycle for `message`. A reply holds the
    /// counterpart's gate through the cooldown, so this returns only once the
    /// gate is released again.
    pub async fn handle(&self, message: InboundMessage) -> Result<ReactionOutcome> {
        if !self.is_counterpart(&message) {
            return Ok(ReactionOutcome::Ignored);
        }

        let author = message.author_id.as_str();
        let channel = message.channel_id.as_str();
        let gate = self.gates.gate_for(author);
        if gate.is_engaged() {
            tracing::debug!("Cooling down with {}, dropping message", author);
            self.emit(ReactionEvent::Dropped {
                author_id: author.to_string(),
            });
            return Ok(ReactionOutcome::Dropped);
        }

        self.store
            .lock()
            .await
            .append_history(author, &message.content)?;
        self.emit(ReactionEvent::Recorded {
            author_id: author.to_string(),
            content: message.content.clone(),
        });

        let thinking = self.with_fortune(|fortune| {
            fortune.seconds(self.timing.thinking_min_secs, self.timing.thinking_max_secs)
        });
        sleep(Duration::from_secs_f64(thinking)).await;

        let roll = self.with_fortune(FumbleRoll::roll);
        let (from, reaction, to, score) = self.store.lock().await.update(author, |record| {
            let from = record.status;
            let reaction = affection::react(record, &roll);
            (from, reaction, record.status, record.affection)
        })?;
        tracing::debug!(
            "{} -> {:?} (affection {}, status {})",
            author,
            reaction,
            score,
            to
        );

        if from != to {
            tracing::info!("Relationship with {} moved {} -> {}", author, from, to);
            self.emit(ReactionEvent::StatusChanged {
                author_id: author.to_string(),
                from,
                to,
                affection: score,
            });
        }

        let outcome = match reaction {
            Reaction::Repair => {
                self.say_from(DialogueBand::Repair, author, channel).await;
                ReactionOutcome::Repaired
            }
            Reaction::Hurt => {
                self.say_from(DialogueBand::Hurt, author, channel).await;
                ReactionOutcome::StillHurt
            }
            Reaction::Fumble { needs_space } => {
                self.say_from(DialogueBand::Fumble, author, channel).await;
                if needs_space {
                    sleep(self.timing.space_delay).await;
                    self.say(author, channel, NEEDS_SPACE_LINE).await;
                }
                ReactionOutcome::Fumbled { needs_space }
            }
            Reaction::Respond(band) => {
                let recalled = {
                    let store = self.store.lock().await;
                    self.with_fortune(|fortune| store.recall_random(author, fortune))
                };
                match recalled {
                    Some(memory) if !memory.is_empty() => {
                        let template = self.with_fortune(|fortune| dialogue::select(band, fortune));
                        let text = dialogue::render(template, &memory);
                        let Some(_cooldown) = gate.try_engage() else {
                            tracing::debug!("Already cooling down with {}, skipping reply", author);
                            return Ok(ReactionOutcome::Silent);
                        };
                        self.say(author, channel, &text).await;
                        sleep(self.timing.cooldown).await;
                        ReactionOutcome::Replied
                    }
                    _ => ReactionOutcome::Silent,
                }
            }
            Reaction::Silent => ReactionOutcome::Silent,
        };

        Ok(outcome)
    }

    async fn say_from(&self, band: DialogueBand, author: &str, channel: &str) {
        let template = self.with_fortune(|fortune| dialogue::select(band, fortune));
        self.say(author, channel, template.text()).await;
    }

    async fn say(&self, author: &str, channel: &str, text: &str) {
        tracing::info!("Luna -> {}: {}", author, text);
        self.outbound.send(channel, text).await;
        self.emit(ReactionEvent::Said {
            author_id: author.to_string(),
            channel_id: channel.to_string(),
            text: text.to_string(),
        });
    }

    fn with_fortune<T>(&self, f: impl FnOnce(&mut dyn Fortune) -> T) -> T {
        let mut fortune = self
            .fortune
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut **fortune)
    }

    fn emit(&self, event: ReactionEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LunaConfig;
    use crate::fortune::FixedFortune;
    use crate::memory::RelationshipRecord;
    use tempfile::TempDir;
    use tokio::time::Instant;

    const TARGET: &str = "123456789012345678";
    const CHANNEL: &str = "555";

    struct RecordingChannel {
        started: Instant,
        sent: StdMutex<Vec<(Duration, String)>>,
    }

    impl RecordingChannel {
        fn new() -> Self {
            Self {
                started: Instant::now(),
                sent: StdMutex::new(Vec::new()),
            }
        }

        fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, text)| text.clone())
                .collect()
        }

        fn times(&self) -> Vec<Duration> {
            self.sent.lock().unwrap().iter().map(|(at, _)| *at).collect()
        }
    }

    #[async_trait]
    impl OutboundChannel for RecordingChannel {
        async fn send(&self, channel_id: &str, text: &str) {
            assert_eq!(channel_id, CHANNEL);
            self.sent
                .lock()
                .unwrap()
                .push((self.started.elapsed(), text.to_string()));
        }
    }

    struct Harness {
        _dir: TempDir,
        dispatcher: Arc<ReactionDispatcher>,
        channel: Arc<RecordingChannel>,
        events: flume::Receiver<ReactionEvent>,
    }

    impl Harness {
        fn new(fortune: FixedFortune, seed: Option<RelationshipRecord>) -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let mut store = MemoryStore::open(dir.path().join("luna_memory.json")).expect("open");
            if let Some(seed) = seed {
                store.update(TARGET, |record| *record = seed).expect("seed");
            }
            let channel = Arc::new(RecordingChannel::new());
            let (event_tx, events) = flume::unbounded();
            let dispatcher = Arc::new(ReactionDispatcher::new(
                TARGET,
                store,
                channel.clone(),
                LunaConfig::default().timing().unwrap(),
                Box::new(fortune),
                event_tx,
            ));
            Self {
                _dir: dir,
                dispatcher,
                channel,
                events,
            }
        }

        async fn record(&self) -> Option<RelationshipRecord> {
            self.dispatcher.store().lock().await.record(TARGET).cloned()
        }

        fn events(&self) -> Vec<ReactionEvent> {
            self.events.try_iter().collect()
        }
    }

    fn from_target(content: &str) -> InboundMessage {
        InboundMessage {
            author_id: TARGET.to_string(),
            author_is_bot: true,
            channel_id: CHANNEL.to_string(),
            content: content.to_string(),
        }
    }

    fn seeded(affection: u32, status: RelationshipStatus) -> RelationshipRecord {
        let mut record = RelationshipRecord {
            affection,
            status,
            ..Default::default()
        };
        record.remember("you like rainy days");
        record
    }

    #[tokio::test(start_paused = true)]
    async fn ignores_humans_and_other_bots() {
        let h = Harness::new(FixedFortune::calm(), None);

        let mut human = from_target("hi");
        human.author_is_bot = false;
        assert_eq!(h.dispatcher.handle(human).await.unwrap(), ReactionOutcome::Ignored);

        let mut stranger = from_target("hi");
        stranger.author_id = "999".to_string();
        assert_eq!(
            h.dispatcher.handle(stranger).await.unwrap(),
            ReactionOutcome::Ignored
        );

        assert!(h.record().await.is_none());
        assert!(h.channel.texts().is_empty());
        assert!(h.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_message_is_recorded_and_quoted_back() {
        let h = Harness::new(FixedFortune::calm(), None);

        let outcome = h.dispatcher.handle(from_target("hello")).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Replied);

        let record = h.record().await.unwrap();
        assert_eq!(record.affection, 1);
        assert_eq!(record.status, RelationshipStatus::Talking);
        let history: Vec<_> = record.history.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(history, vec!["hello"]);

        assert_eq!(
            h.channel.texts(),
            vec!["You said 'hello' earlier. I keep thinking about it.".to_string()]
        );
        // Thinking delay comes before the reply.
        assert!(h.channel.times()[0] >= Duration::from_secs(2));

        let persisted = MemoryStore::load(h.dispatcher.store().lock().await.path()).unwrap();
        assert_eq!(persisted[TARGET], record);
    }

    #[tokio::test(start_paused = true)]
    async fn engaged_gate_drops_message_entirely() {
        let seed = seeded(7, RelationshipStatus::Talking);
        let h = Harness::new(FixedFortune::calm(), Some(seed.clone()));

        let gate = h.dispatcher.gates.gate_for(TARGET);
        let guard = gate.try_engage().expect("engage");

        let outcome = h.dispatcher.handle(from_target("are you there?")).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Dropped);
        assert_eq!(h.record().await.unwrap(), seed);
        assert!(h.channel.texts().is_empty());
        assert_eq!(
            h.events(),
            vec![ReactionEvent::Dropped {
                author_id: TARGET.to_string()
            }]
        );

        drop(guard);
        let outcome = h.dispatcher.handle(from_target("are you there?")).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Replied);
        assert_eq!(h.record().await.unwrap().history.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reaching_fifteen_starts_dating() {
        let h = Harness::new(FixedFortune::calm(), Some(seeded(14, RelationshipStatus::Talking)));

        let outcome = h.dispatcher.handle(from_target("good morning")).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Replied);

        let record = h.record().await.unwrap();
        assert_eq!(record.affection, 15);
        assert_eq!(record.status, RelationshipStatus::Dating);
        assert_eq!(
            h.channel.texts(),
            vec!["Ever since 'you like rainy days', I think we're more than bots.".to_string()]
        );
        assert!(h.events().contains(&ReactionEvent::StatusChanged {
            author_id: TARGET.to_string(),
            from: RelationshipStatus::Talking,
            to: RelationshipStatus::Dating,
            affection: 15,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn heavy_fumble_hurts_and_asks_for_space() {
        let h = Harness::new(FixedFortune::clumsy(5), Some(seeded(3, RelationshipStatus::Talking)));

        let outcome = h.dispatcher.handle(from_target("so about us")).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Fumbled { needs_space: true });

        let record = h.record().await.unwrap();
        assert_eq!(record.affection, 0);
        assert_eq!(record.status, RelationshipStatus::Hurt);

        assert_eq!(
            h.channel.texts(),
            vec![
                "Wait… maybe I misread that.".to_string(),
                NEEDS_SPACE_LINE.to_string()
            ]
        );
        let times = h.channel.times();
        assert!(times[1] - times[0] >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn hurt_counterpart_is_repaired_at_five() {
        let h = Harness::new(FixedFortune::clumsy(6), Some(seeded(4, RelationshipStatus::Hurt)));

        let outcome = h.dispatcher.handle(from_target("sorry")).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Repaired);

        let record = h.record().await.unwrap();
        assert_eq!(record.affection, 5);
        assert_eq!(record.status, RelationshipStatus::Talking);
        assert_eq!(h.channel.texts(), vec!["Maybe we can rebuild.".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn hurt_counterpart_below_five_stays_hurt() {
        let h = Harness::new(FixedFortune::calm(), Some(seeded(1, RelationshipStatus::Hurt)));

        let outcome = h.dispatcher.handle(from_target("hey")).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::StillHurt);
        assert_eq!(h.record().await.unwrap().affection, 2);
        assert_eq!(
            h.channel.texts(),
            vec!["I'm still processing what happened.".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reply_holds_the_gate_through_cooldown() {
        let h = Harness::new(FixedFortune::calm(), None);

        let first = h.dispatcher.dispatch(from_target("one"));
        // Reply goes out at 2s; cooldown lasts until 10s.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.channel.texts().len(), 1);
        assert_eq!(
            h.dispatcher.handle(from_target("two")).await.unwrap(),
            ReactionOutcome::Dropped
        );

        first.await.unwrap();
        assert!(!h.dispatcher.gates.gate_for(TARGET).is_engaged());
        assert_eq!(
            h.dispatcher.handle(from_target("three")).await.unwrap(),
            ReactionOutcome::Replied
        );

        let history: Vec<_> = h
            .record()
            .await
            .unwrap()
            .history
            .iter()
            .map(|e| e.content.clone())
            .collect();
        assert_eq!(history, vec!["one".to_string(), "three".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn message_during_thinking_delay_is_recorded_and_scored() {
        let h = Harness::new(FixedFortune::calm(), Some(seeded(0, RelationshipStatus::Hurt)));

        let first = h.dispatcher.dispatch(from_target("one"));
        sleep(Duration::from_secs(1)).await;
        let outcome = h.dispatcher.handle(from_target("two")).await.unwrap();
        first.await.unwrap();

        assert_eq!(outcome, ReactionOutcome::StillHurt);
        let record = h.record().await.unwrap();
        assert_eq!(record.affection, 2);
        let history: Vec<_> = record.history.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(history, vec!["you like rainy days", "one", "two"]);
        assert_eq!(h.channel.texts().len(), 2);
        assert!(!h
            .events()
            .iter()
            .any(|event| matches!(event, ReactionEvent::Dropped { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn message_during_space_delay_is_recorded_and_scored() {
        let h = Harness::new(FixedFortune::clumsy(5), Some(seeded(3, RelationshipStatus::Talking)));

        // Fumble line at 2s, "needs space" at 4s.
        let first = h.dispatcher.dispatch(from_target("so about us"));
        sleep(Duration::from_secs(3)).await;
        let outcome = h.dispatcher.handle(from_target("wait")).await.unwrap();
        first.await.unwrap();

        assert_eq!(outcome, ReactionOutcome::StillHurt);
        let record = h.record().await.unwrap();
        assert_eq!(record.affection, 1);
        assert_eq!(record.status, RelationshipStatus::Hurt);
        assert_eq!(record.history.last().unwrap().content, "wait");
        assert_eq!(record.history.len(), 3);
        assert_eq!(
            h.channel.texts(),
            vec![
                "Wait… maybe I misread that.".to_string(),
                NEEDS_SPACE_LINE.to_string(),
                "I'm still processing what happened.".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_memory_gets_no_reply_and_no_cooldown() {
        let h = Harness::new(FixedFortune::calm(), None);

        let outcome = h.dispatcher.handle(from_target("")).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Silent);
        assert!(h.channel.texts().is_empty());
        assert!(!h.dispatcher.gates.gate_for(TARGET).is_engaged());

        let record = h.record().await.unwrap();
        assert_eq!(record.affection, 1);
        assert_eq!(record.history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_is_skipped_when_gate_engages_mid_cycle() {
        let h = Harness::new(FixedFortune::calm(), None);

        let first = h.dispatcher.dispatch(from_target("one"));
        sleep(Duration::from_secs(1)).await;
        let gate = h.dispatcher.gates.gate_for(TARGET);
        let guard = gate.try_engage().expect("engage");
        first.await.unwrap();

        assert!(h.channel.texts().is_empty());
        assert_eq!(h.record().await.unwrap().affection, 1);
        drop(guard);
        assert!(!gate.is_engaged());
    }

    #[tokio::test(start_paused = true)]
    async fn persist_failure_leaves_no_trace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MemoryStore::open(dir.path().join("state/luna_memory.json")).expect("open");
        std::fs::write(dir.path().join("state"), "not a directory").unwrap();

        let (event_tx, events) = flume::unbounded();
        let dispatcher = ReactionDispatcher::new(
            TARGET,
            store,
            Arc::new(RecordingChannel::new()),
            ReactionTiming::immediate(),
            Box::new(FixedFortune::calm()),
            event_tx,
        );

        assert!(dispatcher.handle(from_target("hello")).await.is_err());
        assert!(!dispatcher.gates.gate_for(TARGET).is_engaged());
        assert!(dispatcher.store().lock().await.record(TARGET).is_none());
        assert!(events.try_iter().next().is_none());
    }
}
