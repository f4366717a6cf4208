//! One-pole parameter smoothing
//!
//! Knob and CV values are smoothed once per engine chunk rather than once per
//! sample. Targets are clamped before smoothing, so the smoothed value stays
//! in range without a second clamp.

use serde::{Deserialize, Serialize};

/// Single exponential smoothing step
#[inline]
pub fn one_pole(previous: f32, target: f32, coefficient: f32) -> f32 {
    previous + coefficient * (target - previous)
}

/// Persistent one-pole filter for a single control parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSmoother {
    value: f32,
    coefficient: f32,
    min: f32,
    max: f32,
}

impl ParameterSmoother {
    pub fn new(coefficient: f32, min: f32, max: f32) -> Self {
        Self {
            value: min.max(0.0).min(max),
            coefficient: coefficient.clamp(0.0, 1.0),
            min,
            max,
        }
    }

    /// Smoother for the normalized `[0, 1]` range
    pub fn unipolar(coefficient: f32) -> Self {
        Self::new(coefficient, 0.0, 1.0)
    }

    /// Clamp `target` to range and advance one step
    #[inline]
    pub fn step(&mut self, target: f32) -> f32 {
        let target = if target.is_nan() {
            self.value
        } else {
            target.clamp(self.min, self.max)
        };
        self.value = one_pole(self.value, target, self.coefficient);
        self.value
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn coefficient(&self) -> f32 {
        self.coefficient
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Jump straight to a value without smoothing
    pub fn reset(&mut self, value: f32) {
        self.value = value.clamp(self.min, self.max);
    }
}
