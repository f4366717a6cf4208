//! Cross-modulator with an internal carrier oscillator

use super::wrap_phase;
use crate::engine::{ModulatorEngine, ModulatorParameters, StereoFrame};
use crate::host::SampleRate;
use core::f32::consts::{FRAC_PI_2, TAU};
use libm::Libm;

/// Soft clipper normalized so that `drive` never changes the peak level
#[inline]
fn saturate(sample: f32, drive: f32) -> f32 {
    let gain = 1.0 + 4.0 * drive;
    Libm::<f32>::tanh(sample * gain) * drive.min(1.0)
}

/// Blends four cross-modulation operators.
///
/// `modulation_algorithm` sweeps crossfade, ring modulation, rectified ring
/// modulation and a min/max comparator; `modulation_parameter` adds sine
/// folding on top. The easter egg replaces the algorithm with a frequency
/// shifter driven by the `frequency_shift_*` fields.
#[derive(Debug, Clone)]
pub struct CrossModulator {
    parameters: ModulatorParameters,
    sample_rate: f32,
    carrier_phase: f32,
    shifter_phase: f32,
    bypass: bool,
    easter_egg: bool,
}

impl CrossModulator {
    pub fn new() -> Self {
        Self {
            parameters: ModulatorParameters::default(),
            sample_rate: 48_000.0,
            carrier_phase: 0.0,
            shifter_phase: 0.0,
            bypass: false,
            easter_egg: false,
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn easter_egg(&self) -> bool {
        self.easter_egg
    }

    fn carrier(&mut self, external: f32) -> f32 {
        let shape = self.parameters.carrier_shape;
        if shape == 0 {
            return external;
        }
        let phase = self.carrier_phase;
        let increment = (self.parameters.note.max(0.0) / self.sample_rate).min(0.49);
        self.carrier_phase = wrap_phase(phase + increment);
        match shape {
            1 => Libm::<f32>::sin(TAU * phase),
            2 => 1.0 - 4.0 * (phase - 0.5).abs(),
            _ => 2.0 * phase - 1.0,
        }
    }
}

impl Default for CrossModulator {
    fn default() -> Self {
        Self::new()
    }
}

fn operator(index: usize, carrier: f32, modulator: f32) -> f32 {
    match index {
        0 => 0.5 * (carrier + modulator),
        1 => carrier * modulator,
        2 => carrier * modulator.abs(),
        _ => {
            if carrier.abs() > modulator.abs() {
                carrier
            } else {
                modulator
            }
        }
    }
}

impl ModulatorEngine for CrossModulator {
    const BLOCK_SIZE: usize = 16;

    fn init(&mut self, sample_rate: SampleRate) {
        let parameters = self.parameters;
        *self = Self::new();
        self.parameters = parameters;
        self.sample_rate = sample_rate.hz();
    }

    fn process(&mut self, input: &[StereoFrame], output: &mut [StereoFrame]) {
        if self.bypass {
            output.copy_from_slice(input);
            return;
        }

        let p = self.parameters;
        let drive_1 = p.channel_drive[0].clamp(0.0, 1.0);
        let drive_2 = p.channel_drive[1].clamp(0.0, 1.0);
        let position = p.modulation_algorithm.clamp(0.0, 1.0) * 3.0;
        let index = (position as usize).min(2);
        let blend = position - index as f32;
        let fold = 1.0 + 3.0 * p.modulation_parameter.clamp(0.0, 1.0);
        let shift = (p.frequency_shift_pot + p.frequency_shift_cv).clamp(-1.0, 1.0) * 1000.0;
        let shift_increment = (shift / self.sample_rate).clamp(-0.49, 0.49);

        for (frame, out) in input.iter().zip(output.iter_mut()) {
            let carrier = saturate(self.carrier(frame.l), drive_1);
            let modulator = saturate(frame.r, drive_2);

            let wet = if self.easter_egg {
                let angle = TAU * self.shifter_phase + p.phase_shift * TAU;
                self.shifter_phase = wrap_phase(self.shifter_phase + shift_increment);
                carrier * Libm::<f32>::cos(angle) - modulator * Libm::<f32>::sin(angle)
            } else {
                let a = operator(index, carrier, modulator);
                let b = operator(index + 1, carrier, modulator);
                a + blend * (b - a)
            };

            out.l = Libm::<f32>::sin(wet * fold * FRAC_PI_2);
            out.r = 0.5 * (carrier - modulator);
        }
    }

    fn parameters(&self) -> &ModulatorParameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut ModulatorParameters {
        &mut self.parameters
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    fn set_easter_egg(&mut self, easter_egg: bool) {
        self.easter_egg = easter_egg;
    }
}
