//! Affection state machine.
//!
//! One call to [`react`] consumes one inbound message. Hurt recovery is
//! evaluated first and excludes everything else; otherwise affection grows,
//! promotion is checked, a fumble may fire, and finally a dialogue band is
//! chosen if there is anything to recall.

use crate::fortune::Fortune;
use crate::memory::{RelationshipRecord, RelationshipStatus};

use super::dialogue::DialogueBand;

pub const REPAIR_THRESHOLD: u32 = 5;
pub const DATING_THRESHOLD: u32 = 15;
pub const MID_BAND_THRESHOLD: u32 = 10;
pub const HURT_THRESHOLD: u32 = 2;
/// Affection points per unit of fumble probability (2.5% per point).
pub const FUMBLE_POINTS_PER_UNIT: f64 = 40.0;
pub const FUMBLE_CHANCE_CAP: f64 = 0.30;
pub const FUMBLE_PENALTY_MIN: u32 = 3;
pub const FUMBLE_PENALTY_MAX: u32 = 6;

/// Chance of a fumble at the given affection. Grows linearly and caps at 30%
/// (reached at 12).
pub fn fumble_chance(affection: u32) -> f64 {
    (f64::from(affection) / FUMBLE_POINTS_PER_UNIT).min(FUMBLE_CHANCE_CAP)
}

/// The random inputs to one engine step, drawn up front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FumbleRoll {
    pub draw: f64,
    pub penalty: u32,
}

impl FumbleRoll {
    pub fn roll(fortune: &mut dyn Fortune) -> Self {
        Self {
            draw: fortune.unit(),
            penalty: fortune.between(FUMBLE_PENALTY_MIN, FUMBLE_PENALTY_MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Recovered out of Hurt back to Talking.
    Repair,
    /// Still Hurt after the recovery increment.
    Hurt,
    Fumble { needs_space: bool },
    Respond(DialogueBand),
    Silent,
}

pub fn react(record: &mut RelationshipRecord, roll: &FumbleRoll) -> Reaction {
    if record.status == RelationshipStatus::Hurt {
        let affection = record.adjust_affection(1);
        if affection >= REPAIR_THRESHOLD {
            record.status = RelationshipStatus::Talking;
            return Reaction::Repair;
        }
        return Reaction::Hurt;
    }

    let affection = record.adjust_affection(1);

    if record.status == RelationshipStatus::Talking && affection >= DATING_THRESHOLD {
        record.status = RelationshipStatus::Dating;
    }

    if roll.draw < fumble_chance(affection) {
        let remaining = record.adjust_affection(-i64::from(roll.penalty));
        let needs_space = remaining <= HURT_THRESHOLD;
        if needs_space {
            record.status = RelationshipStatus::Hurt;
        }
        return Reaction::Fumble { needs_space };
    }

    if record.history.is_empty() {
        return Reaction::Silent;
    }

    match record.status {
        RelationshipStatus::Talking if affection < MID_BAND_THRESHOLD => {
            Reaction::Respond(DialogueBand::Early)
        }
        RelationshipStatus::Talking => Reaction::Respond(DialogueBand::Mid),
        RelationshipStatus::Dating => Reaction::Respond(DialogueBand::Dating),
        RelationshipStatus::Hurt => Reaction::Silent,
    }
}
