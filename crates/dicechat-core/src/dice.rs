//! Uniform dice rolls.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::DiceError;

/// Upper bounds accepted for a single roll request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RollLimits {
    pub max_sides: u32,
    pub max_count: u32,
}

impl Default for RollLimits {
    fn default() -> Self {
        Self {
            max_sides: 1000,
            max_count: 100,
        }
    }
}

/// Outcome of one validated roll request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Roll {
    pub dim: u32,
    pub count: u32,
    pub rolls: Vec<u32>,
}

/// Rolls `count` independent dice with faces `1..=dim`.
#[derive(Debug)]
pub struct DiceRoller {
    rng: StdRng,
    limits: RollLimits,
}

impl DiceRoller {
    pub fn new(limits: RollLimits) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            limits,
        }
    }

    /// Deterministic roller for tests and replays.
    pub fn seeded(seed: u64, limits: RollLimits) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            limits,
        }
    }

    pub fn limits(&self) -> RollLimits {
        self.limits
    }

    /// Check request parameters against the limits, returning them narrowed.
    pub fn validate(&self, dim: i64, count: i64) -> Result<(u32, u32), DiceError> {
        let sides = u32::try_from(dim)
            .ok()
            .filter(|d| (1..=self.limits.max_sides).contains(d))
            .ok_or(DiceError::InvalidSides {
                dim,
                max: self.limits.max_sides,
            })?;
        let count = u32::try_from(count)
            .ok()
            .filter(|c| (1..=self.limits.max_count).contains(c))
            .ok_or(DiceError::InvalidCount {
                count,
                max: self.limits.max_count,
            })?;
        Ok((sides, count))
    }

    /// Roll the dice. Both bounds of `1..=dim` are reachable.
    pub fn roll(&mut self, dim: i64, count: i64) -> Result<Roll, DiceError> {
        let (dim, count) = self.validate(dim, count)?;
        let rolls = (0..count).map(|_| self.rng.gen_range(1..=dim)).collect();
        Ok(Roll { dim, count, rolls })
    }
}

impl Default for DiceRoller {
    fn default() -> Self {
        Self::new(RollLimits::default())
    }
}
