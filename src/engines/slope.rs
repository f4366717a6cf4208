//! Four-channel slope generator and clock-following ramp extractor

use super::wrap_phase;
use crate::engine::{
    OutputMode, RampExtractor, RampMode, Range, SlopeControls, SlopeEngine, SlopeSample,
};
use crate::gate::GateFlag;
use crate::host::SampleRate;
use crate::ratio::Ratio;
use crate::smoother::one_pole;
use libm::Libm;

/// Peak output level, in volts
const PEAK: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Running,
}

/// Slope generator producing four related outputs from one master ramp.
///
/// The master phase is shaped by `slope` (rise/fall balance), `shape`
/// (curvature) and `smoothness` (output lowpass). `shift` spreads the four
/// channels apart: in amplitude, phase or frequency depending on the output
/// mode.
#[derive(Debug, Clone)]
pub struct SlopeGenerator {
    phase: f32,
    stage: Stage,
    smoothed: [f32; 4],
}

impl SlopeGenerator {
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            stage: Stage::Idle,
            smoothed: [0.0; 4],
        }
    }

    /// Advance the master phase by one sample; returns true when a cycle ends
    fn advance(
        &mut self,
        ramp_mode: RampMode,
        frequency: f32,
        gate: GateFlag,
        slope: f32,
    ) -> bool {
        if gate.is_rising() {
            self.phase = 0.0;
            self.stage = Stage::Running;
        }
        match ramp_mode {
            RampMode::Looping => {
                let next = self.phase + frequency;
                self.phase = wrap_phase(next);
                next >= 1.0
            }
            RampMode::Ad => self.run_to_end(frequency),
            RampMode::Ar => {
                if gate.is_high() && self.stage == Stage::Running {
                    // Hold at the peak while the gate is high
                    self.phase = (self.phase + frequency).min(slope);
                    false
                } else {
                    self.run_to_end(frequency)
                }
            }
        }
    }

    fn run_to_end(&mut self, frequency: f32) -> bool {
        if self.stage != Stage::Running {
            return false;
        }
        self.phase += frequency;
        if self.phase >= 1.0 {
            self.phase = 1.0;
            self.stage = Stage::Idle;
            return true;
        }
        false
    }
}

impl Default for SlopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Asymmetric triangle with its peak at `slope`
#[inline]
fn tilt(phase: f32, slope: f32) -> f32 {
    let slope = slope.clamp(0.001, 0.999);
    if phase < slope {
        phase / slope
    } else {
        (1.0 - phase) / (1.0 - slope)
    }
}

/// Bend a unipolar value: below 0.5 exponential, above 0.5 logarithmic
#[inline]
fn bend(value: f32, shape: f32) -> f32 {
    let exponent = Libm::<f32>::exp2((0.5 - shape) * 4.0);
    Libm::<f32>::pow(value.clamp(0.0, 1.0), exponent)
}

/// Amplitude of channel `index` when `shift` pans a bump across the outputs
#[inline]
fn amplitude_gain(shift: f32, index: usize) -> f32 {
    (1.0 - (shift * 3.0 - index as f32).abs()).clamp(0.0, 1.0)
}

impl SlopeEngine for SlopeGenerator {
    const BLOCK_SIZE: usize = 8;

    fn init(&mut self, _sample_rate: SampleRate) {
        *self = Self::new();
    }

    fn reset(&mut self) {
        self.phase = 0.0;
        self.stage = Stage::Idle;
        self.smoothed = [0.0; 4];
    }

    fn render(
        &mut self,
        controls: &SlopeControls,
        gate_flags: &[GateFlag],
        ramp: Option<&[f32]>,
        out: &mut [SlopeSample],
    ) {
        let frequency = if controls.frequency.is_finite() {
            controls.frequency.clamp(0.0, 0.5)
        } else {
            0.0
        };
        let coefficient = 1.0 - 0.98 * controls.smoothness.clamp(0.0, 1.0);
        let harmonic_spread = Libm::<f32>::round(controls.shift.clamp(0.0, 1.0) * 3.0);

        for (i, sample) in out.iter_mut().enumerate() {
            let gate = gate_flags.get(i).copied().unwrap_or_default();
            let wrapped = match ramp {
                Some(ramp) => {
                    let next = ramp[i].clamp(0.0, 1.0);
                    let wrapped = next < self.phase;
                    self.phase = next;
                    wrapped
                }
                None => self.advance(controls.ramp_mode, frequency, gate, controls.slope),
            };

            for (n, channel) in sample.channel.iter_mut().enumerate() {
                let (phase, gain) = match controls.output_mode {
                    OutputMode::Gates => (self.phase, 1.0),
                    OutputMode::Amplitude => (self.phase, amplitude_gain(controls.shift, n)),
                    OutputMode::Phase => {
                        (wrap_phase(self.phase - controls.shift * 0.25 * n as f32), 1.0)
                    }
                    OutputMode::Frequency => {
                        (wrap_phase(self.phase * (1.0 + harmonic_spread * n as f32)), 1.0)
                    }
                };

                let value = bend(tilt(phase, controls.slope), controls.shape);
                self.smoothed[n] = one_pole(self.smoothed[n], value, coefficient);
                let value = self.smoothed[n];

                *channel = match (controls.output_mode, n) {
                    (OutputMode::Gates, 1) => (value * 2.0 - 1.0) * 5.0,
                    (OutputMode::Gates, 2) => {
                        if phase < controls.slope && phase < 1.0 {
                            PEAK
                        } else {
                            0.0
                        }
                    }
                    (OutputMode::Gates, 3) => {
                        if wrapped {
                            PEAK
                        } else {
                            0.0
                        }
                    }
                    _ => value * gain * PEAK,
                };
            }
        }
    }
}

/// Tracks the period of an incoming clock and produces a phase ramp at a
/// ratio of the clock frequency.
#[derive(Debug, Clone)]
pub struct ClockRamp {
    max_frequency: f32,
    samples_since_edge: u32,
    period: Option<f32>,
    edges: u32,
    phase: f32,
    frequency: f32,
}

impl ClockRamp {
    pub fn new() -> Self {
        Self {
            max_frequency: 0.4,
            samples_since_edge: 0,
            period: None,
            edges: 0,
            phase: 0.0,
            frequency: 0.0,
        }
    }

    /// Current clock period estimate, in samples
    pub fn period(&self) -> Option<f32> {
        self.period
    }
}

impl Default for ClockRamp {
    fn default() -> Self {
        Self::new()
    }
}

impl RampExtractor for ClockRamp {
    fn init(&mut self, _sample_rate: SampleRate, max_frequency: f32) {
        *self = Self::new();
        self.max_frequency = max_frequency;
    }

    fn reset(&mut self) {
        self.samples_since_edge = 0;
        self.period = None;
        self.edges = 0;
        self.phase = 0.0;
        self.frequency = 0.0;
    }

    fn process(
        &mut self,
        range: Range,
        audio_rate_ar: bool,
        ratio: Ratio,
        clock: &[GateFlag],
        ramp: &mut [f32],
    ) -> f32 {
        let limit = match range {
            Range::Control => self.max_frequency,
            Range::Audio => 0.4,
        };

        for (flag, out) in clock.iter().zip(ramp.iter_mut()) {
            self.samples_since_edge = self.samples_since_edge.saturating_add(1);

            if flag.is_rising() {
                let measured = self.samples_since_edge as f32;
                self.period = Some(match (self.period, range) {
                    (Some(previous), Range::Control) => one_pole(previous, measured, 0.5),
                    _ => measured,
                });
                self.samples_since_edge = 0;
                self.edges = self.edges.wrapping_add(1);
                // Re-phase on every `divisor` clock edges
                if self.edges % ratio.divisor.max(1) == 0 {
                    self.phase = 0.0;
                }
            }

            self.frequency = match self.period {
                Some(period) if period > 0.0 => (ratio.multiplier / period).clamp(0.0, limit),
                _ => 0.0,
            };

            if audio_rate_ar && !flag.is_high() {
                self.phase = 0.0;
            } else {
                self.phase = wrap_phase(self.phase + self.frequency);
            }
            *out = self.phase;
        }

        self.frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls(output_mode: OutputMode, ramp_mode: RampMode) -> SlopeControls {
        SlopeControls {
            ramp_mode,
            output_mode,
            range: Range::Control,
            frequency: 0.01,
            slope: 0.5,
            shape: 0.5,
            smoothness: 0.5,
            shift: 0.3,
        }
    }

    #[test]
    fn test_all_modes_bounded() {
        let modes = [
            OutputMode::Gates,
            OutputMode::Amplitude,
            OutputMode::Phase,
            OutputMode::Frequency,
        ];
        let ramps = [RampMode::Ad, RampMode::Looping, RampMode::Ar];
        let mut gates = [GateFlag::Low; 8];
        gates[0] = GateFlag::Rising;
        gates[1] = GateFlag::High;
        gates[2] = GateFlag::High;

        for mode in modes {
            for ramp_mode in ramps {
                let mut generator = SlopeGenerator::new();
                let mut out = [SlopeSample::default(); 8];
                for _ in 0..200 {
                    generator.render(&controls(mode, ramp_mode), &gates, None, &mut out);
                    for sample in &out {
                        for value in sample.channel {
                            assert!(value.is_finite());
                            assert!(value.abs() <= PEAK + 1e-3);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_ad_mode_idle_without_trigger() {
        let mut generator = SlopeGenerator::new();
        let mut out = [SlopeSample::default(); 8];
        let controls = controls(OutputMode::Amplitude, RampMode::Ad);
        generator.render(&controls, &[GateFlag::Low; 8], None, &mut out);
        assert!(out.iter().all(|s| s.channel[0] == 0.0));
    }

    #[test]
    fn test_external_ramp_drives_phase() {
        let mut generator = SlopeGenerator::new();
        let mut out = [SlopeSample::default(); 8];
        let ramp = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7];
        let controls = controls(OutputMode::Gates, RampMode::Looping);
        generator.render(&controls, &[GateFlag::Low; 8], Some(&ramp), &mut out);
        assert_eq!(generator.phase, 0.7);
    }

    #[test]
    fn test_clock_ramp_tracks_period() {
        let mut extractor = ClockRamp::new();
        extractor.init(SampleRate::new(48_000.0).unwrap(), 0.4);

        let mut clock = [GateFlag::Low; 8];
        clock[0] = GateFlag::Rising;
        let mut ramp = [0.0_f32; 8];

        let mut frequency = 0.0;
        for _ in 0..10 {
            frequency =
                extractor.process(Range::Audio, false, Ratio::default(), &clock, &mut ramp);
        }
        assert_eq!(extractor.period(), Some(8.0));
        assert!((frequency - 0.125).abs() < 1e-6);
        assert!(ramp.iter().all(|p| (0.0..1.0).contains(p)));

        let doubled = extractor.process(Range::Audio, false, Ratio::new(2.0, 1), &clock, &mut ramp);
        assert!((doubled - 0.25).abs() < 1e-6);

        extractor.reset();
        assert_eq!(extractor.period(), None);
    }

    #[test]
    fn test_clock_ramp_control_range_limit() {
        let mut extractor = ClockRamp::new();
        extractor.init(SampleRate::new(48_000.0).unwrap(), 40.0 / 48_000.0);
        let clock = [GateFlag::Rising, GateFlag::Low, GateFlag::Rising, GateFlag::Low];
        let mut ramp = [0.0_f32; 4];
        let frequency =
            extractor.process(Range::Control, false, Ratio::default(), &clock, &mut ramp);
        assert!(frequency <= 40.0 / 48_000.0 + 1e-9);
    }
}
