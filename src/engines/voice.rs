//! Macro-oscillator voice with a triggered decay envelope

use super::{note_to_hz, wrap_phase};
use crate::engine::{VoiceEngine, VoiceModulations, VoicePatch};
use crate::host::SampleRate;
use core::f32::consts::TAU;
use libm::Libm;

/// Number of synthesis models
pub const NUM_MODELS: i32 = 4;

/// Trigger sum (over one chunk) that counts as a strike
const TRIGGER_THRESHOLD: f32 = 0.3;

/// Four-model voice: sine, triangle, wavefolded sine and pulse.
///
/// `harmonics` detunes the aux oscillator, `timbre` sets fold depth or pulse
/// width, `morph` crossfades the model against a plain sine.
#[derive(Debug, Clone)]
pub struct SineVoice {
    sample_rate: f32,
    phase: f32,
    aux_phase: f32,
    envelope: f32,
    previous_trigger: f32,
    active_engine: i32,
}

impl SineVoice {
    pub fn new() -> Self {
        Self {
            sample_rate: 48_000.0,
            phase: 0.0,
            aux_phase: 0.0,
            envelope: 0.0,
            previous_trigger: 0.0,
            active_engine: 0,
        }
    }

    fn model(&self, engine: i32, phase: f32, timbre: f32) -> f32 {
        let sine = Libm::<f32>::sin(TAU * phase);
        match engine {
            0 => sine,
            1 => 1.0 - 4.0 * (phase - 0.5).abs(),
            2 => Libm::<f32>::sin(sine * (1.0 + 4.0 * timbre)),
            _ => {
                let width = 0.5 - 0.45 * timbre;
                if phase < width {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

impl Default for SineVoice {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl VoiceEngine for SineVoice {
    const BLOCK_SIZE: usize = 12;

    fn init(&mut self, sample_rate: SampleRate) {
        *self = Self::new();
        self.sample_rate = sample_rate.hz();
    }

    fn render(
        &mut self,
        patch: &VoicePatch,
        modulations: &VoiceModulations,
        out: &mut [f32],
        aux: &mut [f32],
    ) {
        let engine_offset = if modulations.engine.is_finite() {
            Libm::<f32>::round(modulations.engine * NUM_MODELS as f32) as i32
        } else {
            0
        };
        self.active_engine = (patch.engine + engine_offset).rem_euclid(NUM_MODELS);

        let mut note = patch.note + modulations.note;
        if modulations.frequency_patched {
            note += modulations.frequency * patch.frequency_modulation_amount * 60.0;
        }
        let note = if note.is_finite() {
            note.clamp(-24.0, 132.0)
        } else {
            patch.note
        };
        let increment = (note_to_hz(note) / self.sample_rate).min(0.49);

        let mut timbre = patch.timbre;
        if modulations.timbre_patched {
            timbre += modulations.timbre * patch.timbre_modulation_amount;
        }
        let mut morph = patch.morph;
        if modulations.morph_patched {
            morph += modulations.morph * patch.morph_modulation_amount;
        }
        let timbre = clamp_unit(timbre);
        let morph = clamp_unit(morph);
        let harmonics = clamp_unit(patch.harmonics + modulations.harmonics);

        // Envelope strikes on a rising trigger, otherwise the level gates the voice
        let gain_target = if modulations.trigger_patched {
            if modulations.trigger > TRIGGER_THRESHOLD && self.previous_trigger <= TRIGGER_THRESHOLD {
                self.envelope = 1.0;
            }
            self.previous_trigger = modulations.trigger;
            None
        } else if modulations.level_patched {
            Some(clamp_unit(modulations.level))
        } else {
            Some(1.0)
        };

        let decay_time = 0.01 + 2.0 * clamp_unit(patch.decay);
        let decay = Libm::<f32>::exp(-1.0 / (decay_time * self.sample_rate));
        let aux_ratio = 1.0 + Libm::<f32>::floor(harmonics * 4.0);

        for (out, aux) in out.iter_mut().zip(aux.iter_mut()) {
            let gain = match gain_target {
                Some(level) => level,
                None => {
                    self.envelope *= decay;
                    self.envelope
                }
            };

            let sine = Libm::<f32>::sin(TAU * self.phase);
            let shaped = self.model(self.active_engine, self.phase, timbre);
            *out = gain * (shaped + morph * (sine - shaped));
            *aux = gain * Libm::<f32>::sin(TAU * self.aux_phase);

            self.phase = wrap_phase(self.phase + increment);
            self.aux_phase = wrap_phase(self.aux_phase + (increment * aux_ratio).min(0.49));
        }
    }

    fn active_engine(&self) -> i32 {
        self.active_engine
    }
}
