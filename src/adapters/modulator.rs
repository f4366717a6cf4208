//! Modulator adapter: streams host vectors of any length through a block ring
//! feeding a fixed-block cross-modulator.

use super::{begin_render, clamped, parse_patch, PatchChange};
use crate::engine::{ModulatorEngine, StereoFrame};
use crate::engines::CrossModulator;
use crate::error::{AdapterError, ConfigError, MessageError};
use crate::host::{AdapterState, BlockRequirement, EngineAdapter, HostConfig, Lifecycle};
use crate::message::HostMessage;
use crate::patch_state::{ControlChannel, PatchStateTracker, SlotId};
use crate::port::{PortSpec, SignalKind};
use crate::ring::BlockRing;
use crate::smoother::ParameterSmoother;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const SLOTS: [&str; 4] = ["level1", "level2", "algo", "timbre"];

const LEVEL1: SlotId = 0;
const LEVEL2: SlotId = 1;
const ALGO: SlotId = 2;
const TIMBRE: SlotId = 3;

const CARRIER_INPUT: usize = 0;
const MODULATOR_INPUT: usize = 1;
/// First CV inlet; CV inlets follow in slot order
const CV_INPUT: usize = 2;

const SMOOTHING: f32 = 0.1;

/// Algorithm knob spans eight detents
const ALGORITHM_SCALE: f32 = 0.125;

const MAX_CARRIER_HZ: f32 = 15_000.0;

/// Creation-time settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulatorSettings {
    /// 0 = external carrier, 1..=3 internal oscillator waveforms
    pub carrier_shape: u8,
    /// Internal oscillator frequency, in Hz
    pub note: f32,
}

impl Default for ModulatorSettings {
    fn default() -> Self {
        Self {
            carrier_shape: 1,
            note: 110.0,
        }
    }
}

/// Knob, switch and plug messages understood by [`ModulatorAdapter`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ModulatorControl {
    /// Algorithm knob, 0..8
    Algorithm(f32),
    Timbre(f32),
    Level1(f32),
    Level2(f32),
    OscShape(u8),
    /// Internal oscillator frequency, in Hz
    Frequency(f32),
    Bypass(bool),
    EasterEgg(bool),
    Patch { slot: SlotId, change: PatchChange },
    Info,
}

impl TryFrom<&HostMessage> for ModulatorControl {
    type Error = MessageError;

    fn try_from(message: &HostMessage) -> Result<Self, Self::Error> {
        if let Some((slot, change)) = parse_patch(message, &SLOTS)? {
            return Ok(ModulatorControl::Patch { slot, change });
        }
        let control = match message.selector.as_str() {
            "algo" => ModulatorControl::Algorithm(message.float(0)?),
            "timbre" => ModulatorControl::Timbre(message.float(0)?),
            "level1" => ModulatorControl::Level1(message.float(0)?),
            "level2" => ModulatorControl::Level2(message.float(0)?),
            "osc_shape" => {
                let shape = clamped(message.float(0)?, 0.0, 3.0).unwrap_or(0.0);
                ModulatorControl::OscShape(shape as u8)
            }
            "freq" => ModulatorControl::Frequency(message.float(0)?),
            "bypass" => ModulatorControl::Bypass(message.flag(0)?),
            "easteregg" => ModulatorControl::EasterEgg(message.flag(0)?),
            "patched1" => ModulatorControl::Patch {
                slot: LEVEL1,
                change: PatchChange::Plug(message.float(0)? > 0.0),
            },
            "patched2" => ModulatorControl::Patch {
                slot: LEVEL2,
                change: PatchChange::Plug(message.float(0)? > 0.0),
            },
            "info" => ModulatorControl::Info,
            _ => return Err(message.unknown()),
        };
        Ok(control)
    }
}

/// Drives a [`ModulatorEngine`] through a [`BlockRing`].
///
/// Any host vector length of at least one sample is accepted. The CV inlets
/// are read once per call, at its first sample.
pub struct ModulatorAdapter<E: ModulatorEngine = CrossModulator> {
    engine: E,
    lifecycle: Lifecycle,
    spec: PortSpec,
    ring: BlockRing<StereoFrame>,
    tracker: PatchStateTracker,
    settings: ModulatorSettings,
    bypass: bool,
    easter_egg: bool,
}

impl ModulatorAdapter<CrossModulator> {
    pub fn new(settings: ModulatorSettings) -> Result<Self, AdapterError> {
        Self::with_engine(CrossModulator::new(), settings)
    }
}

impl<E: ModulatorEngine> ModulatorAdapter<E> {
    pub fn with_engine(engine: E, settings: ModulatorSettings) -> Result<Self, AdapterError> {
        let smoothed = || ControlChannel::new(0.0, ParameterSmoother::unipolar(SMOOTHING));
        let tracker = PatchStateTracker::new()
            .with_control(SLOTS[LEVEL1], smoothed())
            .with_control(SLOTS[LEVEL2], smoothed())
            .with_control(SLOTS[ALGO], smoothed())
            .with_control(SLOTS[TIMBRE], smoothed());

        let mut adapter = Self {
            engine,
            lifecycle: Lifecycle::new("modulator", BlockRequirement::any()),
            spec: PortSpec::from_names(
                &[
                    ("carrier", SignalKind::Audio),
                    ("modulator", SignalKind::Audio),
                    ("level1", SignalKind::Cv),
                    ("level2", SignalKind::Cv),
                    ("algorithm", SignalKind::Cv),
                    ("timbre", SignalKind::Cv),
                ],
                &[("out", SignalKind::Audio), ("aux", SignalKind::Audio)],
            ),
            ring: BlockRing::try_new(E::BLOCK_SIZE)?,
            tracker,
            settings: ModulatorSettings {
                carrier_shape: settings.carrier_shape.min(3),
                note: clamped(settings.note, 0.0, MAX_CARRIER_HZ).unwrap_or(110.0),
            },
            bypass: false,
            easter_egg: false,
        };
        adapter.write_settings();
        Ok(adapter)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn ring(&self) -> &BlockRing<StereoFrame> {
        &self.ring
    }

    /// Smoothed value of a CV slot
    pub fn smoothed(&self, slot: SlotId) -> f32 {
        self.tracker.smoothed(slot)
    }

    fn set_knob(&mut self, slot: SlotId, value: f32) {
        if let Some(value) = clamped(value, 0.0, 1.0) {
            self.tracker.set_knob(slot, value);
        }
    }

    fn write_settings(&mut self) {
        let parameters = self.engine.parameters_mut();
        parameters.carrier_shape = self.settings.carrier_shape;
        parameters.note = self.settings.note;
        self.engine.set_bypass(self.bypass);
        self.engine.set_easter_egg(self.easter_egg);
    }

    /// Read the CV inlets at sample 0 and update the engine's parameters
    fn update_parameters(&mut self, inputs: &[&[f32]]) {
        let cv = |slot: SlotId| inputs[CV_INPUT + slot][0];
        let tracker = &mut self.tracker;

        let level1 = tracker.resolve(LEVEL1, cv(LEVEL1));
        let level2 = tracker.resolve(LEVEL2, cv(LEVEL2));
        let algo = tracker.offset(ALGO, cv(ALGO));
        let timbre = tracker.offset(TIMBRE, cv(TIMBRE));

        let parameters = self.engine.parameters_mut();
        parameters.channel_drive = [tracker.smooth(LEVEL1, level1), tracker.smooth(LEVEL2, level2)];
        parameters.modulation_algorithm = tracker.smooth(ALGO, algo);
        parameters.modulation_parameter = tracker.smooth(TIMBRE, timbre);
    }
}

impl<E: ModulatorEngine> EngineAdapter for ModulatorAdapter<E> {
    type Control = ModulatorControl;

    fn type_id(&self) -> &'static str {
        "modulator"
    }

    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn prepare(&mut self, config: &HostConfig) -> Result<(), ConfigError> {
        if let Some(rate) = self.lifecycle.prepare(config)? {
            self.engine.init(rate);
            self.write_settings();
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
            self.engine.init(rate);
            self.write_settings();
        }
        self.update_parameters(inputs);

        let Self { engine, ring, .. } = self;
        let (carrier, modulator) = (inputs[CARRIER_INPUT], inputs[MODULATOR_INPUT]);
        ring.process(
            len,
            |i| StereoFrame::new(carrier[i], modulator[i]),
            |i, frame| {
                outputs[0][i] = frame.l;
                outputs[1][i] = frame.r;
            },
            |input, output| engine.process(input, output),
        );
        Ok(())
    }

    fn apply(&mut self, control: ModulatorControl) {
        match control {
            ModulatorControl::Algorithm(v) => self.set_knob(ALGO, v * ALGORITHM_SCALE),
            ModulatorControl::Timbre(v) => self.set_knob(TIMBRE, v),
            ModulatorControl::Level1(v) => self.set_knob(LEVEL1, v),
            ModulatorControl::Level2(v) => self.set_knob(LEVEL2, v),
            ModulatorControl::OscShape(shape) => {
                self.settings.carrier_shape = shape.min(3);
                self.engine.parameters_mut().carrier_shape = self.settings.carrier_shape;
            }
            ModulatorControl::Frequency(hz) => {
                if let Some(hz) = clamped(hz, 0.0, MAX_CARRIER_HZ) {
                    self.settings.note = hz;
                    self.engine.parameters_mut().note = hz;
                }
            }
            ModulatorControl::Bypass(bypass) => {
                self.bypass = bypass;
                self.engine.set_bypass(bypass);
            }
            ModulatorControl::EasterEgg(enabled) => {
                self.easter_egg = enabled;
                self.engine.set_easter_egg(enabled);
            }
            ModulatorControl::Patch { slot, change } => change.apply(&mut self.tracker, slot),
            ModulatorControl::Info => log::info!("{:#}", self.snapshot()),
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        json!({
            "type": self.type_id(),
            "state": self.lifecycle.state(),
            "parameters": self.engine.parameters(),
            "bypass": self.bypass,
            "easter_egg": self.easter_egg,
            "ring": self.ring.cursor(),
            "slots": self.tracker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ModulatorParameters;
    use crate::host::{log_capture, SampleRate};
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::VecDeque;

    /// Identity engine counting block invocations
    #[derive(Default)]
    struct CountingModulator {
        parameters: ModulatorParameters,
        blocks: usize,
        inits: usize,
        last_rate: f32,
        bypass: bool,
    }

    impl ModulatorEngine for CountingModulator {
        const BLOCK_SIZE: usize = 16;

        fn init(&mut self, sample_rate: SampleRate) {
            self.inits += 1;
            self.last_rate = sample_rate.hz();
            self.parameters = Default::default();
            self.bypass = false;
        }

        fn process(&mut self, input: &[StereoFrame], output: &mut [StereoFrame]) {
            self.blocks += 1;
            output.copy_from_slice(input);
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

        fn set_easter_egg(&mut self, _easter_egg: bool) {}
    }

    fn counting() -> ModulatorAdapter<CountingModulator> {
        ModulatorAdapter::with_engine(CountingModulator::default(), ModulatorSettings::default())
            .unwrap()
    }

    fn render(
        adapter: &mut impl EngineAdapter,
        inputs: &[Vec<f32>],
    ) -> Result<(Vec<f32>, Vec<f32>), ConfigError> {
        render_at(adapter, &HostConfig::new(48_000.0, inputs[0].len()), inputs)
    }

    fn render_at(
        adapter: &mut impl EngineAdapter,
        config: &HostConfig,
        inputs: &[Vec<f32>],
    ) -> Result<(Vec<f32>, Vec<f32>), ConfigError> {
        let len = inputs[0].len();
        let inputs: Vec<&[f32]> = inputs.iter().map(|v| &v[..]).collect();
        let mut out = vec![0.0_f32; len];
        let mut aux = vec![0.0_f32; len];
        adapter.render(config, &inputs, &mut [&mut out[..], &mut aux[..]])?;
        Ok((out, aux))
    }

    fn silent(len: usize) -> Vec<Vec<f32>> {
        vec![vec![0.0; len]; 6]
    }

    #[test]
    fn test_block_count_across_random_chunkings() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let mut adapter = counting();
            let blocks = rng.gen_range(1..12);
            let mut remaining = blocks * 16;
            while remaining > 0 {
                let len = rng.gen_range(1..=remaining.min(50));
                render(&mut adapter, &silent(len)).unwrap();
                remaining -= len;
            }
            assert_eq!(adapter.engine().blocks, blocks);
            assert_eq!(adapter.ring().write_index(), 0);
        }
    }

    #[test]
    fn test_output_delayed_by_block_less_one() {
        let mut adapter = counting();
        let mut first = silent(20);
        first[CARRIER_INPUT] = (0..20).map(|i| i as f32 + 1.0).collect();
        first[MODULATOR_INPUT] = (0..20).map(|i| -(i as f32) - 1.0).collect();
        let (out, aux) = render(&mut adapter, &first).unwrap();

        assert!(out[..15].iter().all(|s| *s == 0.0));
        assert_eq!(out[15], 1.0);
        assert_eq!(aux[19], -5.0);
        assert_eq!(adapter.ring().write_index(), 4);
    }

    #[test]
    fn test_any_host_length_accepted() {
        let mut adapter = counting();
        for len in [1, 3, 17, 100] {
            assert!(render(&mut adapter, &silent(len)).is_ok());
        }
        assert_eq!(adapter.state(), AdapterState::Active);
        assert_eq!(adapter.engine().blocks, 121 / 16);
    }

    #[test]
    fn test_level_follows_patch_state() {
        let mut adapter = counting();
        adapter.apply(ModulatorControl::Level1(1.0));
        let mut inputs = silent(4);
        inputs[CV_INPUT + LEVEL1] = vec![0.2; 4];

        // Unpatched: knob governs, CV ignored
        render(&mut adapter, &inputs).unwrap();
        assert_abs_diff_eq!(adapter.smoothed(LEVEL1), 0.1, epsilon = 1e-6);

        adapter.handle_message(&HostMessage::parse("patched1 1").unwrap()).unwrap();
        render(&mut adapter, &inputs).unwrap();
        assert_abs_diff_eq!(adapter.smoothed(LEVEL1), 0.1 + 0.1 * (0.2 - 0.1), epsilon = 1e-6);
        assert_abs_diff_eq!(
            adapter.engine().parameters().channel_drive[0],
            adapter.smoothed(LEVEL1)
        );
    }

    #[test]
    fn test_algorithm_scaled_and_offset_by_cv() {
        let mut adapter = counting();
        adapter.handle_message(&HostMessage::parse("algo 4").unwrap()).unwrap();
        let mut inputs = silent(2);
        inputs[CV_INPUT + ALGO] = vec![0.25; 2];
        for _ in 0..200 {
            render(&mut adapter, &inputs).unwrap();
        }
        assert_abs_diff_eq!(
            adapter.engine().parameters().modulation_algorithm,
            0.75,
            epsilon = 1e-4
        );

        adapter.apply(ModulatorControl::Algorithm(100.0));
        for _ in 0..200 {
            render(&mut adapter, &inputs).unwrap();
        }
        assert_abs_diff_eq!(adapter.smoothed(ALGO), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_settings_survive_reinit() {
        let mut adapter = counting();
        adapter.handle_message(&HostMessage::parse("freq 440").unwrap()).unwrap();
        adapter.handle_message(&HostMessage::parse("osc_shape 7").unwrap()).unwrap();
        adapter.handle_message(&HostMessage::parse("bypass 1").unwrap()).unwrap();
        adapter.prepare(&HostConfig::new(96_000.0, 64)).unwrap();

        assert_eq!(adapter.engine().inits, 1);
        assert_eq!(adapter.engine().parameters().note, 440.0);
        assert_eq!(adapter.engine().parameters().carrier_shape, 3);
        assert!(adapter.engine().bypass);

        adapter.handle_message(&HostMessage::parse("freq 99999").unwrap()).unwrap();
        assert_eq!(adapter.engine().parameters().note, MAX_CARRIER_HZ);
    }

    #[test]
    fn test_drain_queued_controls() {
        let mut adapter = counting();
        let mut queue =
            VecDeque::from([ModulatorControl::Timbre(0.5), ModulatorControl::Bypass(true)]);
        assert_eq!(adapter.drain(&mut queue), 2);
        assert!(adapter.engine().bypass);
    }

    #[cfg(feature = "rtrb")]
    #[test]
    fn test_drain_from_control_channel() {
        let mut adapter = counting();
        let (mut tx, mut rx) = crate::message::control_channel(4);
        tx.push(ModulatorControl::Level2(0.3)).unwrap();
        assert_eq!(adapter.drain(&mut rx), 1);
        assert_eq!(adapter.drain(&mut rx), 0);
        assert_eq!(adapter.tracker.knob(LEVEL2), 0.3);
    }

    #[test]
    fn test_silence_in_bounded_out() {
        let mut adapter = ModulatorAdapter::new(ModulatorSettings::default()).unwrap();
        adapter.apply(ModulatorControl::Level1(1.0));
        adapter.apply(ModulatorControl::Level2(1.0));
        for len in [1, 31, 64, 256] {
            let (out, aux) = render(&mut adapter, &silent(len)).unwrap();
            assert!(out.iter().chain(aux.iter()).all(|s| s.is_finite() && s.abs() <= 1.0));
        }
    }

    #[test]
    fn test_rate_change_survives_rejected_call() {
        let mut adapter = counting();
        render_at(&mut adapter, &HostConfig::new(48_000.0, 64), &silent(64)).unwrap();
        assert_eq!(adapter.engine().last_rate, 48_000.0);

        // New rate arrives with an empty call
        let faster = HostConfig::new(96_000.0, 64);
        assert!(render_at(&mut adapter, &faster, &silent(0)).is_err());
        assert_eq!(adapter.engine().inits, 1);

        render_at(&mut adapter, &faster, &silent(64)).unwrap();
        assert_eq!(adapter.engine().inits, 2);
        assert_eq!(adapter.engine().last_rate, 96_000.0);
    }

    #[test]
    fn test_rejection_reported_once() {
        let mut adapter = counting();
        render(&mut adapter, &silent(8)).unwrap();

        let mut inputs = silent(8);
        inputs[MODULATOR_INPUT] = vec![0.0; 3];
        let records = log_capture::records_during(|| {
            for _ in 0..5 {
                assert_eq!(render(&mut adapter, &inputs), Err(ConfigError::LengthMismatch));
            }
        });
        assert_eq!(records, 1);
        assert_eq!(adapter.ring().write_index(), 8);
    }

    #[test]
    fn test_rejects_empty_and_mismatched_vectors() {
        let mut adapter = counting();
        assert!(render(&mut adapter, &silent(0)).is_err());

        let mut inputs = silent(8);
        inputs[3] = vec![0.0; 4];
        assert_eq!(render(&mut adapter, &inputs), Err(ConfigError::LengthMismatch));
        assert_eq!(adapter.engine().blocks, 0);

        assert!(render(&mut adapter, &silent(8)).is_ok());
        assert_eq!(adapter.snapshot()["ring"]["write_index"], 8);
    }
}
