//! Randomness used by the agent.
//!
//! Every random decision (fumble draws, template picks, memory recall,
//! thinking delays) goes through [`Fortune`] so tests can script outcomes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait Fortune: Send {
    /// Uniform draw in `[0, 1)`.
    fn unit(&mut self) -> f64;

    /// Uniform integer in `[low, high]`.
    fn between(&mut self, low: u32, high: u32) -> u32;

    /// Uniform index in `[0, len)`. `len` is never zero.
    fn index(&mut self, len: usize) -> usize;

    /// Uniform duration in seconds within `[low, high]`.
    fn seconds(&mut self, low: f64, high: f64) -> f64;
}

pub struct RandomFortune {
    rng: StdRng,
}

impl RandomFortune {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomFortune {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl Fortune for RandomFortune {
    fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn between(&mut self, low: u32, high: u32) -> u32 {
        self.rng.gen_range(low..=high)
    }

    fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    fn seconds(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// Fortune that always returns the same values.
#[cfg(test)]
pub(crate) struct FixedFortune {
    pub unit: f64,
    pub between: u32,
    pub index: usize,
}

#[cfg(test)]
impl FixedFortune {
    /// Draws that never trigger a fumble.
    pub fn calm() -> Self {
        Self {
            unit: 0.99,
            between: 3,
            index: 0,
        }
    }

    /// Draws that always trigger a fumble with the given penalty.
    pub fn clumsy(penalty: u32) -> Self {
        Self {
            unit: 0.0,
            between: penalty,
            index: 0,
        }
    }
}

#[cfg(test)]
impl Fortune for FixedFortune {
    fn unit(&mut self) -> f64 {
        self.unit
    }

    fn between(&mut self, low: u32, high: u32) -> u32 {
        self.between.clamp(low, high)
    }

    fn index(&mut self, len: usize) -> usize {
        self.index.min(len - 1)
    }

    fn seconds(&mut self, low: f64, _high: f64) -> f64 {
        low
    }
}
