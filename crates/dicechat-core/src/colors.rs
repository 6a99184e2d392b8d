//! Identity colors handed out to players on login.

use std::collections::VecDeque;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::RoomError;

/// Colors of the reference deployment.
pub const DEFAULT_PALETTE: [&str; 6] = [
    "#853535", "#32b450", "#467846", "#875082", "#50aab4", "#7d8723",
];

/// A hex color string such as `#853535`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed set of colors, each held by at most one player at a time.
///
/// The checkout order is decided once at construction. Released colors go
/// to the back of the queue.
#[derive(Clone, Debug)]
pub struct ColorPool {
    palette: Vec<Color>,
    available: VecDeque<Color>,
}

impl ColorPool {
    /// Pool that hands colors out in palette order. Duplicate entries are
    /// collapsed.
    pub fn new(palette: impl IntoIterator<Item = Color>) -> Self {
        let mut unique: Vec<Color> = Vec::new();
        for color in palette {
            if !unique.contains(&color) {
                unique.push(color);
            }
        }
        let available = unique.iter().cloned().collect();
        Self {
            palette: unique,
            available,
        }
    }

    /// Pool whose checkout order is a random permutation of `palette`.
    pub fn shuffled<R: Rng + ?Sized>(palette: impl IntoIterator<Item = Color>, rng: &mut R) -> Self {
        let mut pool = Self::new(palette);
        pool.available.make_contiguous().shuffle(rng);
        pool
    }

    /// Take the next free color.
    pub fn checkout(&mut self) -> Result<Color, RoomError> {
        self.available.pop_front().ok_or(RoomError::RoomFull)
    }

    /// Return a held color. Colors outside the palette, or ones that are
    /// already free, are ignored and `false` is returned.
    pub fn release(&mut self, color: Color) -> bool {
        if !self.palette.contains(&color) || self.available.contains(&color) {
            return false;
        }
        self.available.push_back(color);
        true
    }

    pub fn is_available(&self, color: &Color) -> bool {
        self.available.contains(color)
    }

    /// Number of colors that can still be checked out.
    pub fn available(&self) -> usize {
        self.available.len()
    }

    /// Number of colors currently checked out.
    pub fn held(&self) -> usize {
        self.palette.len() - self.available.len()
    }

    /// Total number of colors in the palette.
    pub fn capacity(&self) -> usize {
        self.palette.len()
    }
}
