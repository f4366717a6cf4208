//! Gate Edge Extraction
//!
//! Raw gate, trigger and clock vectors are reduced to per-sample [`GateFlag`]s
//! before they reach an engine. Each logical line keeps one flag of history
//! so edges that straddle host calls or chunk boundaries are still seen.

use serde::{Deserialize, Serialize};

/// Level a raw sample must exceed to count as high.
///
/// Kept above zero so residual noise around 0 never registers as a gate.
pub const GATE_THRESHOLD: f32 = 0.01;

/// Per-sample gate classification consumed by engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GateFlag {
    /// Low, including the sample where a high gate falls
    #[default]
    Low,
    /// Steady high
    High,
    /// First high sample after a low one
    Rising,
}

impl GateFlag {
    #[inline]
    pub fn is_high(self) -> bool {
        matches!(self, GateFlag::High | GateFlag::Rising)
    }

    #[inline]
    pub fn is_rising(self) -> bool {
        self == GateFlag::Rising
    }
}

/// Whether a raw sample reads as high
#[inline]
pub fn is_high(sample: f32) -> bool {
    sample > GATE_THRESHOLD
}

/// Classify one sample given the flag produced for the previous sample
#[inline]
pub fn extract_gate_flag(previous: GateFlag, high: bool) -> GateFlag {
    match (high, previous.is_high()) {
        (true, false) => GateFlag::Rising,
        (true, true) => GateFlag::High,
        (false, _) => GateFlag::Low,
    }
}

/// Availability of a gate input.
///
/// A gate only drives an engine when it is both connected and switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GateInput {
    /// Nothing is connected
    #[default]
    Unavailable,
    /// Connected, but the user has it switched off
    Disabled,
    /// Connected and switched on
    Enabled,
}

impl GateInput {
    /// Apply a connection notification
    pub fn connect(self, connected: bool) -> Self {
        match (self, connected) {
            (_, false) => GateInput::Unavailable,
            (GateInput::Unavailable, true) => GateInput::Disabled,
            (state, true) => state,
        }
    }

    /// Apply an enable toggle; has no effect while unavailable
    pub fn enable(self, enabled: bool) -> Self {
        match self {
            GateInput::Unavailable => GateInput::Unavailable,
            _ if enabled => GateInput::Enabled,
            _ => GateInput::Disabled,
        }
    }

    /// Connect and enable together, or disconnect (the "plug" notification)
    pub fn plug(self, plugged: bool) -> Self {
        self.connect(plugged).enable(plugged)
    }

    #[inline]
    pub fn is_active(self) -> bool {
        self == GateInput::Enabled
    }
}

/// One logical gate line with its persisted edge history
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GateLine {
    previous: GateFlag,
    input: GateInput,
}

impl GateLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Line that starts connected and enabled (or unavailable)
    pub fn plugged(plugged: bool) -> Self {
        Self {
            previous: GateFlag::Low,
            input: GateInput::Unavailable.plug(plugged),
        }
    }

    pub fn input(&self) -> GateInput {
        self.input
    }

    pub fn set_input(&mut self, input: GateInput) {
        self.input = input;
    }

    pub fn previous(&self) -> GateFlag {
        self.previous
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.input.is_active()
    }

    /// Classify a single raw sample, advancing the line's history
    #[inline]
    pub fn step(&mut self, sample: f32) -> GateFlag {
        self.previous = extract_gate_flag(self.previous, is_high(sample));
        self.previous
    }

    /// Classify `raw` into `flags` sample by sample.
    ///
    /// Inactive lines leave their history untouched and report all-low.
    pub fn extract(&mut self, raw: &[f32], flags: &mut [GateFlag]) {
        if !self.is_active() {
            flags.fill(GateFlag::Low);
            return;
        }
        for (flag, &sample) in flags.iter_mut().zip(raw) {
            *flag = self.step(sample);
        }
    }

    pub fn reset(&mut self) {
        self.previous = GateFlag::Low;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_function_has_single_rising_edge() {
        let raw: Vec<f32> = (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();
        let mut line = GateLine::plugged(true);
        let mut flags = [GateFlag::Low; 20];
        line.extract(&raw, &mut flags);

        for flag in &flags[..10] {
            assert_eq!(*flag, GateFlag::Low);
        }
        assert_eq!(flags[10], GateFlag::Rising);
        for flag in &flags[11..] {
            assert_eq!(*flag, GateFlag::High);
        }
    }

    #[test]
    fn test_history_carries_across_calls() {
        let mut line = GateLine::plugged(true);
        let mut flags = [GateFlag::Low; 4];

        line.extract(&[0.0, 0.0, 0.0, 1.0], &mut flags);
        assert_eq!(flags[3], GateFlag::Rising);

        // Still high at the start of the next call: no new edge
        line.extract(&[1.0, 0.0, 1.0, 1.0], &mut flags);
        assert_eq!(flags, [GateFlag::High, GateFlag::Low, GateFlag::Rising, GateFlag::High]);
    }

    #[test]
    fn test_threshold_rejects_noise() {
        assert!(!is_high(0.0));
        assert!(!is_high(0.005));
        assert!(!is_high(GATE_THRESHOLD));
        assert!(is_high(0.02));
        assert_eq!(extract_gate_flag(GateFlag::Low, is_high(0.009)), GateFlag::Low);
    }

    #[test]
    fn test_inactive_line_reports_low() {
        let mut line = GateLine::new();
        let mut flags = [GateFlag::High; 3];
        line.extract(&[1.0, 1.0, 1.0], &mut flags);
        assert_eq!(flags, [GateFlag::Low; 3]);
        assert_eq!(line.previous(), GateFlag::Low);
    }

    #[test]
    fn test_gate_input_transitions() {
        let input = GateInput::Unavailable;
        assert_eq!(input.enable(true), GateInput::Unavailable);

        let input = input.connect(true);
        assert_eq!(input, GateInput::Disabled);
        assert!(!input.is_active());

        let input = input.enable(true);
        assert!(input.is_active());

        // Losing the connection drops the line entirely
        assert_eq!(input.connect(false), GateInput::Unavailable);
        assert_eq!(GateInput::Unavailable.plug(true), GateInput::Enabled);
        assert_eq!(GateInput::Enabled.plug(false), GateInput::Unavailable);
    }
}
