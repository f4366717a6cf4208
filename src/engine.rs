//! Engine Contracts
//!
//! The three wrapped engines are opaque collaborators. Adapters reach them
//! only through the traits here and the plain parameter structs they consume;
//! nothing in the adapters depends on how an engine computes its output.

use crate::gate::GateFlag;
use crate::host::SampleRate;
use crate::ratio::Ratio;
use serde::{Deserialize, Serialize};

// =============================================================================
// Voice
// =============================================================================

/// Knob-level settings of the voice engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoicePatch {
    /// Pitch as a MIDI note number
    pub note: f32,
    pub harmonics: f32,
    pub timbre: f32,
    pub morph: f32,
    pub frequency_modulation_amount: f32,
    pub timbre_modulation_amount: f32,
    pub morph_modulation_amount: f32,
    /// Synthesis model index
    pub engine: i32,
    pub decay: f32,
    pub lpg_colour: f32,
}

impl Default for VoicePatch {
    fn default() -> Self {
        Self {
            note: 48.0,
            harmonics: 0.1,
            timbre: 0.0,
            morph: 0.0,
            frequency_modulation_amount: 0.0,
            timbre_modulation_amount: 0.0,
            morph_modulation_amount: 0.0,
            engine: 0,
            decay: 0.0,
            lpg_colour: 0.0,
        }
    }
}

/// Signal-level modulations of the voice engine, refreshed once per chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceModulations {
    pub engine: f32,
    pub note: f32,
    pub frequency: f32,
    pub harmonics: f32,
    pub timbre: f32,
    pub morph: f32,
    pub trigger: f32,
    pub level: f32,

    pub frequency_patched: bool,
    pub timbre_patched: bool,
    pub morph_patched: bool,
    pub trigger_patched: bool,
    pub level_patched: bool,
}

impl VoiceModulations {
    /// Signal fields in host inlet order
    pub fn signals_mut(&mut self) -> [&mut f32; 8] {
        [
            &mut self.engine,
            &mut self.note,
            &mut self.frequency,
            &mut self.harmonics,
            &mut self.timbre,
            &mut self.morph,
            &mut self.trigger,
            &mut self.level,
        ]
    }
}

/// Macro-oscillator voice rendering short chunks of two channels
pub trait VoiceEngine: Send {
    /// Largest chunk one render call accepts
    const BLOCK_SIZE: usize;

    fn init(&mut self, sample_rate: SampleRate);

    /// Render `out.len()` samples (at most `BLOCK_SIZE`); `aux` has the same length
    fn render(
        &mut self,
        patch: &VoicePatch,
        modulations: &VoiceModulations,
        out: &mut [f32],
        aux: &mut [f32],
    );

    /// Engine actually sounding, which may differ from the patch when modulated
    fn active_engine(&self) -> i32;
}

// =============================================================================
// Slope generator
// =============================================================================

/// What the four slope outputs carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    #[default]
    Gates,
    Amplitude,
    Phase,
    Frequency,
}

impl OutputMode {
    /// Clamped selection from a host control value
    pub fn from_index(index: i32) -> Self {
        match index.clamp(0, 3) {
            0 => OutputMode::Gates,
            1 => OutputMode::Amplitude,
            2 => OutputMode::Phase,
            _ => OutputMode::Frequency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RampMode {
    /// Attack-decay, retriggered
    Ad,
    #[default]
    Looping,
    /// Attack-release, follows the gate
    Ar,
}

impl RampMode {
    pub fn from_index(index: i32) -> Self {
        match index.clamp(0, 2) {
            0 => RampMode::Ad,
            1 => RampMode::Looping,
            _ => RampMode::Ar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Range {
    #[default]
    Control,
    Audio,
}

impl Range {
    /// Any non-zero value selects audio range
    pub fn from_index(index: i32) -> Self {
        if index.clamp(0, 1) != 0 {
            Range::Audio
        } else {
            Range::Control
        }
    }
}

/// One sample of the four slope outputs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlopeSample {
    pub channel: [f32; 4],
}

/// Per-chunk control values handed to the slope generator
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlopeControls {
    pub ramp_mode: RampMode,
    pub output_mode: OutputMode,
    pub range: Range,
    /// Normalized frequency (cycles per sample)
    pub frequency: f32,
    pub slope: f32,
    pub shape: f32,
    pub smoothness: f32,
    pub shift: f32,
}

/// Polyphonic slope generator rendering exact blocks
pub trait SlopeEngine: Send {
    const BLOCK_SIZE: usize;

    fn init(&mut self, sample_rate: SampleRate);

    /// Return every channel to its initial phase
    fn reset(&mut self);

    /// Render `BLOCK_SIZE` samples.
    ///
    /// When `ramp` is given the generator follows that external phase instead
    /// of its own oscillator.
    fn render(
        &mut self,
        controls: &SlopeControls,
        gate_flags: &[GateFlag],
        ramp: Option<&[f32]>,
        out: &mut [SlopeSample],
    );
}

/// Derives a phase ramp and frequency from an external clock
pub trait RampExtractor: Send {
    /// `max_frequency` is in cycles per sample
    fn init(&mut self, sample_rate: SampleRate, max_frequency: f32);

    fn reset(&mut self);

    /// Track `clock`, fill `ramp` with the extracted phase, return the frequency
    fn process(
        &mut self,
        range: Range,
        audio_rate_ar: bool,
        ratio: Ratio,
        clock: &[GateFlag],
        ramp: &mut [f32],
    ) -> f32;
}

// =============================================================================
// Modulator
// =============================================================================

/// One stereo frame: carrier on the left, modulator on the right
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoFrame {
    pub l: f32,
    pub r: f32,
}

impl StereoFrame {
    pub const fn new(l: f32, r: f32) -> Self {
        Self { l, r }
    }
}

/// Mutable parameter block of the cross-modulator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModulatorParameters {
    pub channel_drive: [f32; 2],
    pub modulation_algorithm: f32,
    pub modulation_parameter: f32,
    /// 0 = external carrier, 1..=3 internal oscillator waveforms
    pub carrier_shape: u8,
    pub frequency_shift_pot: f32,
    pub frequency_shift_cv: f32,
    pub phase_shift: f32,
    /// Internal oscillator frequency in Hz
    pub note: f32,
}

impl Default for ModulatorParameters {
    fn default() -> Self {
        Self {
            channel_drive: [0.0; 2],
            modulation_algorithm: 0.0,
            modulation_parameter: 0.0,
            carrier_shape: 1,
            frequency_shift_pot: 0.0,
            frequency_shift_cv: 0.0,
            phase_shift: 0.0,
            note: 110.0,
        }
    }
}

/// Cross-modulation engine processing exact blocks of stereo frames
pub trait ModulatorEngine: Send {
    const BLOCK_SIZE: usize;

    fn init(&mut self, sample_rate: SampleRate);

    fn process(&mut self, input: &[StereoFrame], output: &mut [StereoFrame]);

    fn parameters(&self) -> &ModulatorParameters;

    fn parameters_mut(&mut self) -> &mut ModulatorParameters;

    fn set_bypass(&mut self, bypass: bool);

    fn set_easter_egg(&mut self, easter_egg: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selection_clamps() {
        assert_eq!(OutputMode::from_index(7), OutputMode::Frequency);
        assert_eq!(OutputMode::from_index(-1), OutputMode::Gates);
        assert_eq!(RampMode::from_index(1), RampMode::Looping);
        assert_eq!(RampMode::from_index(9), RampMode::Ar);
        assert_eq!(Range::from_index(5), Range::Audio);
        assert_eq!(Range::from_index(0), Range::Control);
    }

    #[test]
    fn test_modulations_inlet_order() {
        let mut modulations = VoiceModulations::default();
        for (i, field) in modulations.signals_mut().into_iter().enumerate() {
            *field = i as f32;
        }
        assert_eq!(modulations.engine, 0.0);
        assert_eq!(modulations.trigger, 6.0);
        assert_eq!(modulations.level, 7.0);
    }

    #[test]
    fn test_defaults() {
        let patch = VoicePatch::default();
        assert_eq!(patch.note, 48.0);
        assert!((patch.harmonics - 0.1).abs() < 1e-6);

        let params = ModulatorParameters::default();
        assert_eq!(params.carrier_shape, 1);
        assert_eq!(params.note, 110.0);
    }
}
