//! Slope adapter: drives a slope generator in exact 8-sample blocks, with an
//! optional external clock followed through a ramp extractor.

use super::{begin_render, clamped, parse_patch, PatchChange};
use crate::block::{try_zeroed, ChunkPolicy, ScratchBlock, SubBlockIterator};
use crate::engine::{
    OutputMode, RampExtractor, RampMode, Range, SlopeControls, SlopeEngine, SlopeSample,
};
use crate::engines::{ClockRamp, SlopeGenerator};
use crate::error::{AdapterError, ConfigError, MessageError};
use crate::gate::{GateFlag, GateLine};
use crate::host::{AdapterState, EngineAdapter, HostConfig, Lifecycle, SampleRate};
use crate::message::HostMessage;
use crate::patch_state::{ControlChannel, PatchStateTracker, SlotId};
use crate::port::{PortSpec, SignalKind};
use crate::ratio::Ratio;
use crate::smoother::ParameterSmoother;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Slots in registration order; ids match the host inlet order
pub const SLOTS: [&str; 7] = ["frequency", "shape", "slope", "smooth", "shift", "trigger", "clock"];

const FREQUENCY: SlotId = 0;
const SHAPE: SlotId = 1;
const SLOPE: SlotId = 2;
const SMOOTH: SlotId = 3;
const SHIFT: SlotId = 4;
const TRIGGER: SlotId = 5;
const CLOCK: SlotId = 6;

/// Coefficient of the per-block parameter smoothing
const SMOOTHING: f32 = 0.1;

/// Highest free-running frequency, in cycles per sample
const MAX_FREQUENCY: f32 = 0.4;

/// Highest clock-derived frequency in control range, in Hz
const MAX_CLOCK_HZ: f32 = 40.0;

/// Engine outputs are volts; hosts expect roughly unit range
const OUTPUT_GAIN: f32 = 0.1;

/// Creation-time settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeSettings {
    pub output_mode: OutputMode,
    pub ramp_mode: RampMode,
    pub range: Range,
    pub use_trigger: bool,
    pub use_clock: bool,
}

/// Knob, mode and plug messages understood by [`SlopeAdapter`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SlopeControl {
    /// Free-running frequency knob, in Hz
    Frequency(f32),
    Shape(f32),
    Slope(f32),
    Smoothness(f32),
    Shift(f32),
    /// Clock ratio table index, 0..=18
    Ratio(f32),
    OutputMode(OutputMode),
    RampMode(RampMode),
    Range(Range),
    Patch { slot: SlotId, change: PatchChange },
    Info,
}

impl TryFrom<&HostMessage> for SlopeControl {
    type Error = MessageError;

    fn try_from(message: &HostMessage) -> Result<Self, Self::Error> {
        if let Some((slot, change)) = parse_patch(message, &SLOTS)? {
            return Ok(SlopeControl::Patch { slot, change });
        }
        let control = match message.selector.as_str() {
            "freq" => SlopeControl::Frequency(message.float(0)?),
            "shape" => SlopeControl::Shape(message.float(0)?),
            "slope" => SlopeControl::Slope(message.float(0)?),
            "smooth" => SlopeControl::Smoothness(message.float(0)?),
            "shift" => SlopeControl::Shift(message.float(0)?),
            "ratio" => SlopeControl::Ratio(message.float(0)?),
            "output_mode" => SlopeControl::OutputMode(OutputMode::from_index(message.float(0)? as i32)),
            "ramp_mode" => SlopeControl::RampMode(RampMode::from_index(message.float(0)? as i32)),
            "range" => SlopeControl::Range(Range::from_index(message.float(0)? as i32)),
            "info" => SlopeControl::Info,
            _ => return Err(message.unknown()),
        };
        Ok(control)
    }
}

/// Drives a [`SlopeEngine`] and [`RampExtractor`] pair.
///
/// The host vector must be a multiple of `S::BLOCK_SIZE`. When the clock
/// line is active the generator follows the extracted clock frequency;
/// otherwise it runs free from the frequency knob plus CV.
pub struct SlopeAdapter<S: SlopeEngine = SlopeGenerator, X: RampExtractor = ClockRamp> {
    engine: S,
    extractor: X,
    lifecycle: Lifecycle,
    spec: PortSpec,
    chunks: SubBlockIterator,
    scratch: ScratchBlock,
    tracker: PatchStateTracker,
    sample_rate: SampleRate,
    output_mode: OutputMode,
    ramp_mode: RampMode,
    range: Range,
    ratio: Ratio,
    must_reset_extractor: bool,
    frequency: f32,
    gate_flags: Vec<GateFlag>,
    clock_flags: Vec<GateFlag>,
    ramp: Vec<f32>,
    out: Vec<SlopeSample>,
}

impl SlopeAdapter<SlopeGenerator, ClockRamp> {
    pub fn new(settings: SlopeSettings) -> Result<Self, AdapterError> {
        Self::with_engines(SlopeGenerator::new(), ClockRamp::new(), settings)
    }
}

impl<S: SlopeEngine, X: RampExtractor> SlopeAdapter<S, X> {
    pub fn with_engines(engine: S, extractor: X, settings: SlopeSettings) -> Result<Self, AdapterError> {
        let block = S::BLOCK_SIZE;
        let chunks = SubBlockIterator::new(block, ChunkPolicy::Exact);
        let smoothed = |knob| ControlChannel::new(knob, ParameterSmoother::unipolar(SMOOTHING));
        let tracker = PatchStateTracker::new()
            .with_control(SLOTS[FREQUENCY], ControlChannel::unsmoothed(1.0, 0.0, MAX_FREQUENCY))
            .with_control(SLOTS[SHAPE], smoothed(0.5))
            .with_control(SLOTS[SLOPE], smoothed(0.5))
            .with_control(SLOTS[SMOOTH], smoothed(0.5))
            .with_control(SLOTS[SHIFT], smoothed(0.3))
            .with_gate(SLOTS[TRIGGER], GateLine::plugged(settings.use_trigger))
            .with_gate(SLOTS[CLOCK], GateLine::plugged(settings.use_clock));

        let mut adapter = Self {
            engine,
            extractor,
            lifecycle: Lifecycle::new("slope", chunks.requirement()),
            spec: PortSpec::from_names(
                &[
                    ("frequency", SignalKind::Cv),
                    ("shape", SignalKind::Cv),
                    ("slope", SignalKind::Cv),
                    ("smooth", SignalKind::Cv),
                    ("shift", SignalKind::Cv),
                    ("trigger", SignalKind::Trigger),
                    ("clock", SignalKind::Clock),
                ],
                &[
                    ("out1", SignalKind::Cv),
                    ("out2", SignalKind::Cv),
                    ("out3", SignalKind::Cv),
                    ("out4", SignalKind::Cv),
                ],
            ),
            chunks,
            scratch: ScratchBlock::try_new(4, block)?,
            tracker,
            sample_rate: SampleRate::default(),
            output_mode: settings.output_mode,
            ramp_mode: settings.ramp_mode,
            range: settings.range,
            ratio: Ratio::default(),
            must_reset_extractor: false,
            frequency: 0.0,
            gate_flags: try_zeroed(block)?,
            clock_flags: try_zeroed(block)?,
            ramp: try_zeroed(block)?,
            out: try_zeroed(block)?,
        };
        adapter.initialize(SampleRate::default());
        Ok(adapter)
    }

    pub fn engine(&self) -> &S {
        &self.engine
    }

    pub fn extractor(&self) -> &X {
        &self.extractor
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    pub fn ratio(&self) -> Ratio {
        self.ratio
    }

    /// Smoothed value of a shaping slot
    pub fn smoothed(&self, slot: SlotId) -> f32 {
        self.tracker.smoothed(slot)
    }

    fn initialize(&mut self, rate: SampleRate) {
        self.sample_rate = rate;
        self.engine.init(rate);
        self.extractor.init(rate, MAX_CLOCK_HZ * rate.inv());
    }
}

impl<S: SlopeEngine, X: RampExtractor> EngineAdapter for SlopeAdapter<S, X> {
    type Control = SlopeControl;

    fn type_id(&self) -> &'static str {
        "slope"
    }

    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn prepare(&mut self, config: &HostConfig) -> Result<(), ConfigError> {
        if let Some(rate) = self.lifecycle.prepare(config)? {
            self.initialize(rate);
        }
        Ok(())
    }

    fn render(
        &mut self,
        config: &HostConfig,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
    ) -> Result<(), ConfigError> {
        let (len, reinit) =
            begin_render(&mut self.lifecycle, &self.spec, config, inputs, outputs)?;
        if let Some(rate) = reinit {
            self.initialize(rate);
        }

        let Self {
            engine,
            extractor,
            chunks,
            scratch,
            tracker,
            sample_rate,
            output_mode,
            ramp_mode,
            range,
            ratio,
            must_reset_extractor,
            frequency,
            gate_flags,
            clock_flags,
            ramp,
            out,
            ..
        } = self;

        chunks.run(len, scratch, outputs, |chunk, scratch| {
            let range_in = chunk.range();
            let offset = chunk.offset;

            let use_trigger = tracker.is_patched(TRIGGER);
            let use_clock = tracker.is_patched(CLOCK);

            if let Some(line) = tracker.gate_mut(TRIGGER) {
                line.extract(&inputs[TRIGGER][range_in.clone()], gate_flags);
            }

            *frequency = if use_clock {
                if *must_reset_extractor {
                    extractor.reset();
                }
                if let Some(line) = tracker.gate_mut(CLOCK) {
                    line.extract(&inputs[CLOCK][range_in], clock_flags);
                }
                *must_reset_extractor = false;
                let audio_rate_ar = *range == Range::Audio && *ramp_mode == RampMode::Ar;
                extractor.process(*range, audio_rate_ar, *ratio, clock_flags, ramp)
            } else {
                *must_reset_extractor = true;
                let raw = tracker.offset(FREQUENCY, inputs[FREQUENCY][offset]) * sample_rate.inv();
                clamped(raw, 0.0, MAX_FREQUENCY).unwrap_or(0.0)
            };

            let mut shaping = [0.0_f32; 4];
            for (value, slot) in shaping.iter_mut().zip([SHAPE, SLOPE, SMOOTH, SHIFT]) {
                let raw = tracker.offset(slot, inputs[slot][offset]);
                *value = tracker.smooth(slot, raw);
            }
            let [shape, slope, smoothness, shift] = shaping;

            let controls = SlopeControls {
                ramp_mode: *ramp_mode,
                output_mode: *output_mode,
                range: *range,
                frequency: *frequency,
                slope,
                shape,
                smoothness,
                shift,
            };
            let external_ramp = (!use_trigger && use_clock).then_some(&ramp[..]);
            engine.render(&controls, gate_flags, external_ramp, out);

            for (i, sample) in out.iter().enumerate() {
                for (channel, value) in sample.channel.iter().enumerate() {
                    scratch.channel_mut(channel)[i] = value * OUTPUT_GAIN;
                }
            }
        })?;
        Ok(())
    }

    fn apply(&mut self, control: SlopeControl) {
        let knob = |tracker: &mut PatchStateTracker, slot, value: f32, min, max| {
            if let Some(value) = clamped(value, min, max) {
                tracker.set_knob(slot, value);
            }
        };
        match control {
            SlopeControl::Frequency(hz) => knob(&mut self.tracker, FREQUENCY, hz, f32::MIN, f32::MAX),
            SlopeControl::Shape(v) => knob(&mut self.tracker, SHAPE, v, 0.0, 1.0),
            SlopeControl::Slope(v) => knob(&mut self.tracker, SLOPE, v, 0.0, 1.0),
            SlopeControl::Smoothness(v) => knob(&mut self.tracker, SMOOTH, v, 0.0, 1.0),
            SlopeControl::Shift(v) => knob(&mut self.tracker, SHIFT, v, 0.0, 1.0),
            SlopeControl::Ratio(index) => self.ratio = Ratio::from_control(index),
            SlopeControl::OutputMode(mode) => {
                if mode != self.output_mode {
                    self.engine.reset();
                    self.output_mode = mode;
                }
            }
            SlopeControl::RampMode(mode) => self.ramp_mode = mode,
            SlopeControl::Range(range) => self.range = range,
            SlopeControl::Patch { slot, change } => change.apply(&mut self.tracker, slot),
            SlopeControl::Info => log::info!("{:#}", self.snapshot()),
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        json!({
            "type": self.type_id(),
            "state": self.lifecycle.state(),
            "output_mode": self.output_mode,
            "ramp_mode": self.ramp_mode,
            "range": self.range,
            "ratio": self.ratio,
            "frequency": self.frequency,
            "use_trigger": self.tracker.is_patched(TRIGGER),
            "use_clock": self.tracker.is_patched(CLOCK),
            "slots": self.tracker,
        })
    }
}
