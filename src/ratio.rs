//! Clock Ratios
//!
//! Fixed table relating an external clock period to the frequency of the
//! slope generator's ramp.

use serde::{Deserialize, Serialize};

/// A clock multiplier with the divisor used to re-phase the ramp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    pub multiplier: f32,
    pub divisor: u32,
}

impl Ratio {
    pub const fn new(multiplier: f32, divisor: u32) -> Self {
        Self {
            multiplier,
            divisor,
        }
    }

    /// Look up a table entry, clamping the index to the table bounds
    pub fn from_index(index: i32) -> Self {
        let clamped = index.clamp(0, RATIOS.len() as i32 - 1) as usize;
        RATIOS[clamped]
    }

    /// Look up a table entry from a float control value (truncated)
    pub fn from_control(value: f32) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        Self::from_index(value.clamp(0.0, (RATIOS.len() - 1) as f32) as i32)
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Self::new(1.0, 1)
    }
}

/// Division and multiplication ratios, slowest first
pub const RATIOS: [Ratio; 19] = [
    Ratio::new(0.0625, 16),
    Ratio::new(0.125, 8),
    Ratio::new(0.166_666_6, 6),
    Ratio::new(0.25, 4),
    Ratio::new(0.333_333_3, 3),
    Ratio::new(0.5, 2),
    Ratio::new(0.666_666_6, 3),
    Ratio::new(0.75, 4),
    Ratio::new(0.8, 5),
    Ratio::new(1.0, 1),
    Ratio::new(1.25, 4),
    Ratio::new(1.333_333_3, 3),
    Ratio::new(1.5, 2),
    Ratio::new(2.0, 1),
    Ratio::new(3.0, 1),
    Ratio::new(4.0, 1),
    Ratio::new(6.0, 1),
    Ratio::new(8.0, 1),
    Ratio::new(16.0, 1),
];
