//! Voice adapter: drives a macro-oscillator voice in short chunks.

use super::{begin_render, clamped, parse_patch, PatchChange};
use crate::block::{ChunkPolicy, ScratchBlock, SubBlockIterator};
use crate::engine::{VoiceEngine, VoiceModulations, VoicePatch};
use crate::engines::SineVoice;
use crate::error::{AdapterError, ConfigError, MessageError};
use crate::gate::GateLine;
use crate::host::{AdapterState, EngineAdapter, HostConfig, Lifecycle};
use crate::message::HostMessage;
use crate::patch_state::{PatchStateTracker, SlotId};
use crate::port::{PortSpec, SignalKind};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Plug slots, in registration order
pub const SLOTS: [&str; 5] = ["freq", "timbre", "morph", "trig", "level"];

const FREQ: SlotId = 0;
const TIMBRE: SlotId = 1;
const MORPH: SlotId = 2;
const TRIG: SlotId = 3;
const LEVEL: SlotId = 4;

/// Host inlet carrying the trigger signal
const TRIGGER_INPUT: usize = 6;

/// Creation-time settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub engine: i32,
}

/// Knob, plug and query messages understood by [`VoiceAdapter`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum VoiceControl {
    /// Fine transposition, -1..1
    Frequency(f32),
    /// Coarse octave, 0..1
    Octave(f32),
    /// Pitch as a MIDI note, bypassing the octave/transposition knobs
    Note(f32),
    Harmonics(f32),
    Timbre(f32),
    Morph(f32),
    FrequencyModAmount(f32),
    TimbreModAmount(f32),
    MorphModAmount(f32),
    Decay(f32),
    LpgColour(f32),
    Engine(i32),
    Patch { slot: SlotId, change: PatchChange },
    /// Log the active engine
    GetEngine,
    /// Log a parameter dump
    Info,
}

impl TryFrom<&HostMessage> for VoiceControl {
    type Error = MessageError;

    fn try_from(message: &HostMessage) -> Result<Self, Self::Error> {
        if let Some((slot, change)) = parse_patch(message, &SLOTS)? {
            return Ok(VoiceControl::Patch { slot, change });
        }
        let control = match message.selector.as_str() {
            "frequency" => VoiceControl::Frequency(message.float(0)?),
            "octave" => VoiceControl::Octave(message.float(0)?),
            "note" => VoiceControl::Note(message.float(0)?),
            "harmonics" => VoiceControl::Harmonics(message.float(0)?),
            "timbre" => VoiceControl::Timbre(message.float(0)?),
            "morph" => VoiceControl::Morph(message.float(0)?),
            "freq_mod" => VoiceControl::FrequencyModAmount(message.float(0)?),
            "timbre_mod" => VoiceControl::TimbreModAmount(message.float(0)?),
            "morph_mod" => VoiceControl::MorphModAmount(message.float(0)?),
            "decay" => VoiceControl::Decay(message.float(0)?),
            "lpg_colour" => VoiceControl::LpgColour(message.float(0)?),
            "engine" => VoiceControl::Engine(message.float(0)? as i32),
            "get_engine" => VoiceControl::GetEngine,
            "info" => VoiceControl::Info,
            _ => return Err(message.unknown()),
        };
        Ok(control)
    }
}

/// MIDI note selected by the transposition and octave knobs
pub fn knob_note(transposition: f32, octave: f32) -> f32 {
    let octave = (octave * 9.0) as i32;
    if octave < 8 {
        transposition * 7.0 + octave as f32 * 12.0 + 12.0
    } else {
        60.0 + transposition * 48.0
    }
}

/// Drives a [`VoiceEngine`] in chunks of `E::BLOCK_SIZE`.
///
/// The host vector need not divide evenly: the last chunk of a call may be
/// shorter. Every inlet is sampled once at the start of each chunk.
pub struct VoiceAdapter<E: VoiceEngine = SineVoice> {
    engine: E,
    lifecycle: Lifecycle,
    spec: PortSpec,
    chunks: SubBlockIterator,
    scratch: ScratchBlock,
    patch: VoicePatch,
    modulations: VoiceModulations,
    transposition: f32,
    octave: f32,
    tracker: PatchStateTracker,
}

impl VoiceAdapter<SineVoice> {
    pub fn new(settings: VoiceSettings) -> Result<Self, AdapterError> {
        Self::with_engine(SineVoice::new(), settings)
    }
}

impl<E: VoiceEngine> VoiceAdapter<E> {
    pub fn with_engine(engine: E, settings: VoiceSettings) -> Result<Self, AdapterError> {
        let chunks = SubBlockIterator::new(E::BLOCK_SIZE, ChunkPolicy::AllowPartial);
        // Knobs live in the patch; the engine reads these slots' patch flags
        let tracker = PatchStateTracker::new()
            .with_flag(SLOTS[FREQ])
            .with_flag(SLOTS[TIMBRE])
            .with_flag(SLOTS[MORPH])
            .with_gate(SLOTS[TRIG], GateLine::new())
            .with_flag(SLOTS[LEVEL]);

        let mut adapter = Self {
            engine,
            lifecycle: Lifecycle::new("voice", chunks.requirement()),
            spec: PortSpec::from_names(
                &[
                    ("engine", SignalKind::Cv),
                    ("note", SignalKind::Cv),
                    ("frequency", SignalKind::Cv),
                    ("harmonics", SignalKind::Cv),
                    ("timbre", SignalKind::Cv),
                    ("morph", SignalKind::Cv),
                    ("trigger", SignalKind::Trigger),
                    ("level", SignalKind::Cv),
                ],
                &[("out", SignalKind::Audio), ("aux", SignalKind::Audio)],
            ),
            chunks,
            scratch: ScratchBlock::try_new(2, E::BLOCK_SIZE)?,
            patch: VoicePatch::default(),
            modulations: VoiceModulations::default(),
            transposition: 0.0,
            octave: 0.5,
            tracker,
        };
        adapter.apply(VoiceControl::Engine(settings.engine));
        Ok(adapter)
    }

    pub fn patch(&self) -> &VoicePatch {
        &self.patch
    }

    pub fn modulations(&self) -> &VoiceModulations {
        &self.modulations
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Engine currently sounding
    pub fn active_engine(&self) -> i32 {
        self.engine.active_engine()
    }

    fn update_note(&mut self) {
        self.patch.note = knob_note(self.transposition, self.octave);
    }

    fn sync_patched_flags(&mut self) {
        let tracker = &self.tracker;
        let m = &mut self.modulations;
        m.frequency_patched = tracker.is_patched(FREQ);
        m.timbre_patched = tracker.is_patched(TIMBRE);
        m.morph_patched = tracker.is_patched(MORPH);
        m.trigger_patched = tracker.is_patched(TRIG);
        m.level_patched = tracker.is_patched(LEVEL);
    }
}

impl<E: VoiceEngine> EngineAdapter for VoiceAdapter<E> {
    type Control = VoiceControl;

    fn type_id(&self) -> &'static str {
        "voice"
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
        }
        self.sync_patched_flags();

        let Self {
            engine,
            chunks,
            scratch,
            patch,
            modulations,
            ..
        } = self;

        chunks.run(len, scratch, outputs, |chunk, scratch| {
            for (field, input) in modulations.signals_mut().into_iter().zip(inputs) {
                *field = input[chunk.offset];
            }
            if modulations.trigger_patched {
                modulations.trigger = inputs[TRIGGER_INPUT][chunk.range()].iter().sum();
            }
            let (out, aux) = scratch.pair_mut(0, 1);
            engine.render(patch, modulations, &mut out[..chunk.len], &mut aux[..chunk.len]);
        })?;
        Ok(())
    }

    fn apply(&mut self, control: VoiceControl) {
        let patch = &mut self.patch;
        match control {
            VoiceControl::Frequency(v) => {
                if let Some(v) = clamped(v, -1.0, 1.0) {
                    self.transposition = v;
                    self.update_note();
                }
            }
            VoiceControl::Octave(v) => {
                if let Some(v) = clamped(v, 0.0, 1.0) {
                    self.octave = v;
                    self.update_note();
                }
            }
            VoiceControl::Note(v) => {
                if let Some(v) = clamped(v, 0.0, 127.0) {
                    patch.note = v;
                }
            }
            VoiceControl::Harmonics(v) => {
                patch.harmonics = clamped(v, 0.0, 1.0).unwrap_or(patch.harmonics)
            }
            VoiceControl::Timbre(v) => patch.timbre = clamped(v, 0.0, 1.0).unwrap_or(patch.timbre),
            VoiceControl::Morph(v) => patch.morph = clamped(v, 0.0, 1.0).unwrap_or(patch.morph),
            VoiceControl::FrequencyModAmount(v) => {
                patch.frequency_modulation_amount =
                    clamped(v, -1.0, 1.0).unwrap_or(patch.frequency_modulation_amount)
            }
            VoiceControl::TimbreModAmount(v) => {
                patch.timbre_modulation_amount =
                    clamped(v, -1.0, 1.0).unwrap_or(patch.timbre_modulation_amount)
            }
            VoiceControl::MorphModAmount(v) => {
                patch.morph_modulation_amount =
                    clamped(v, -1.0, 1.0).unwrap_or(patch.morph_modulation_amount)
            }
            VoiceControl::Decay(v) => patch.decay = clamped(v, 0.0, 1.0).unwrap_or(patch.decay),
            VoiceControl::LpgColour(v) => {
                patch.lpg_colour = clamped(v, 0.0, 1.0).unwrap_or(patch.lpg_colour)
            }
            VoiceControl::Engine(engine) => patch.engine = engine.max(0),
            VoiceControl::Patch { slot, change } => {
                change.apply(&mut self.tracker, slot);
                self.sync_patched_flags();
            }
            VoiceControl::GetEngine => log::info!("active_engine {}", self.active_engine()),
            VoiceControl::Info => log::info!("{:#}", self.snapshot()),
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        json!({
            "type": self.type_id(),
            "state": self.lifecycle.state(),
            "patch": self.patch,
            "modulations": self.modulations,
            "transposition": self.transposition,
            "octave": self.octave,
            "active_engine": self.active_engine(),
            "slots": self.tracker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::log_capture;
    use crate::host::SampleRate;

    /// Records every render call
    #[derive(Default)]
    struct CountingVoice {
        inits: usize,
        renders: usize,
        samples: usize,
        last_rate: f32,
        last_modulations: VoiceModulations,
    }

    impl VoiceEngine for CountingVoice {
        const BLOCK_SIZE: usize = 12;

        fn init(&mut self, sample_rate: SampleRate) {
            self.inits += 1;
            self.last_rate = sample_rate.hz();
        }

        fn render(
            &mut self,
            _patch: &VoicePatch,
            modulations: &VoiceModulations,
            out: &mut [f32],
            aux: &mut [f32],
        ) {
            for (i, (o, a)) in out.iter_mut().zip(aux.iter_mut()).enumerate() {
                *o = (self.samples + i) as f32;
                *a = -1.0;
            }
            self.renders += 1;
            self.samples += out.len();
            self.last_modulations = *modulations;
        }

        fn active_engine(&self) -> i32 {
            7
        }
    }

    fn run(
        adapter: &mut VoiceAdapter<impl VoiceEngine>,
        config: &HostConfig,
        inputs: &[Vec<f32>],
        len: usize,
    ) -> (Result<(), ConfigError>, Vec<f32>, Vec<f32>) {
        let inputs: Vec<&[f32]> = inputs.iter().map(|v| &v[..]).collect();
        let mut out = vec![9.0_f32; len];
        let mut aux = vec![9.0_f32; len];
        let result = adapter.render(config, &inputs, &mut [&mut out[..], &mut aux[..]]);
        (result, out, aux)
    }

    fn counting() -> VoiceAdapter<CountingVoice> {
        VoiceAdapter::with_engine(CountingVoice::default(), VoiceSettings::default()).unwrap()
    }

    fn silent_inputs(len: usize) -> Vec<Vec<f32>> {
        vec![vec![0.0; len]; 8]
    }

    #[test]
    fn test_chunks_cover_host_vector() {
        let mut adapter = counting();
        let config = HostConfig::new(48_000.0, 64);
        let (result, out, aux) = run(&mut adapter, &config, &silent_inputs(64), 64);

        assert!(result.is_ok());
        assert_eq!(adapter.engine().renders, 6);
        assert_eq!(adapter.engine().inits, 1);
        for (i, sample) in out.iter().enumerate() {
            assert_eq!(*sample, i as f32);
        }
        assert!(aux.iter().all(|s| *s == -1.0));
    }

    #[test]
    fn test_rejects_small_host_block() {
        let mut adapter = counting();
        let config = HostConfig::new(48_000.0, 8);
        let (result, out, _) = run(&mut adapter, &config, &silent_inputs(8), 8);

        assert_eq!(
            result,
            Err(ConfigError::BlockTooSmall {
                block_size: 8,
                minimum: 12
            })
        );
        assert!(matches!(adapter.state(), AdapterState::Rejected(_)));
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(adapter.engine().renders, 0);
    }

    #[test]
    fn test_sample_rate_change_reinitializes() {
        let mut adapter = counting();
        adapter.prepare(&HostConfig::new(44_100.0, 24)).unwrap();
        let config = HostConfig::new(44_100.0, 24);
        let (result, _, _) = run(&mut adapter, &config, &silent_inputs(24), 24);
        assert!(result.is_ok());
        assert_eq!(adapter.engine().inits, 1);

        let config = HostConfig::new(96_000.0, 24);
        let (result, _, _) = run(&mut adapter, &config, &silent_inputs(24), 24);
        assert!(result.is_ok());
        assert_eq!(adapter.engine().inits, 2);
        assert_eq!(adapter.engine().last_rate, 96_000.0);
    }

    #[test]
    fn test_rate_change_survives_rejected_call() {
        let mut adapter = counting();
        let (result, _, _) = run(&mut adapter, &HostConfig::new(48_000.0, 24), &silent_inputs(24), 24);
        assert!(result.is_ok());

        // New rate arrives with a call too short for one engine block
        let faster = HostConfig::new(96_000.0, 24);
        let (result, _, _) = run(&mut adapter, &faster, &silent_inputs(8), 8);
        assert!(result.is_err());
        assert_eq!(adapter.engine().last_rate, 48_000.0);

        let (result, _, _) = run(&mut adapter, &faster, &silent_inputs(24), 24);
        assert!(result.is_ok());
        assert_eq!(adapter.engine().inits, 2);
        assert_eq!(adapter.engine().last_rate, 96_000.0);
    }

    #[test]
    fn test_rejection_reported_once() {
        let mut adapter = counting();
        let config = HostConfig::new(48_000.0, 24);
        run(&mut adapter, &config, &silent_inputs(24), 24).0.unwrap();

        let records = log_capture::records_during(|| {
            for _ in 0..5 {
                let (result, out, _) = run(&mut adapter, &config, &silent_inputs(8), 8);
                assert!(result.is_err());
                assert!(out.iter().all(|s| *s == 0.0));
            }
        });
        assert_eq!(records, 1);
        assert_eq!(adapter.engine().renders, 2);
    }

    #[test]
    fn test_inputs_sampled_at_chunk_start() {
        let mut adapter = counting();
        let mut inputs = silent_inputs(24);
        // Timbre CV ramps; the second chunk starts at sample 12
        inputs[4] = (0..24).map(|i| i as f32 / 100.0).collect();
        let (result, _, _) = run(&mut adapter, &HostConfig::new(48_000.0, 24), &inputs, 24);

        assert!(result.is_ok());
        assert!((adapter.engine().last_modulations.timbre - 0.12).abs() < 1e-6);
        assert!(!adapter.engine().last_modulations.timbre_patched);
    }

    #[test]
    fn test_trigger_sum_when_patched() {
        let mut adapter = counting();
        let mut inputs = silent_inputs(12);
        inputs[TRIGGER_INPUT] = vec![0.5; 12];

        let config = HostConfig::new(48_000.0, 12);
        run(&mut adapter, &config, &inputs, 12);
        assert_eq!(adapter.engine().last_modulations.trigger, 0.5);

        adapter.apply(VoiceControl::Patch {
            slot: TRIG,
            change: PatchChange::Plug(true),
        });
        run(&mut adapter, &config, &inputs, 12);
        assert!(adapter.modulations().trigger_patched);
        assert!((adapter.engine().last_modulations.trigger - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_knob_note() {
        assert_eq!(knob_note(0.0, 0.5), 60.0);
        assert_eq!(knob_note(1.0, 0.0), 19.0);
        assert_eq!(knob_note(0.5, 1.0), 84.0);

        let mut adapter = VoiceAdapter::new(VoiceSettings::default()).unwrap();
        assert_eq!(adapter.patch().note, 48.0);
        adapter.apply(VoiceControl::Octave(0.5));
        assert_eq!(adapter.patch().note, 60.0);
        adapter.apply(VoiceControl::Frequency(-4.0));
        assert_eq!(adapter.patch().note, 53.0);
        adapter.apply(VoiceControl::Note(64.5));
        assert_eq!(adapter.patch().note, 64.5);
    }

    #[test]
    fn test_parse_and_clamp_messages() {
        let mut adapter = VoiceAdapter::new(VoiceSettings { engine: 2 }).unwrap();
        assert_eq!(adapter.patch().engine, 2);

        adapter.handle_message(&HostMessage::parse("timbre 3").unwrap()).unwrap();
        assert_eq!(adapter.patch().timbre, 1.0);
        adapter.handle_message(&HostMessage::parse("freq_mod -2").unwrap()).unwrap();
        assert_eq!(adapter.patch().frequency_modulation_amount, -1.0);
        adapter.handle_message(&HostMessage::parse("plug level 1").unwrap()).unwrap();
        assert!(adapter.modulations().level_patched);

        assert_eq!(
            adapter.handle_message(&HostMessage::parse("wobble 1").unwrap()),
            Err(MessageError::UnknownSelector("wobble".into()))
        );
        assert_eq!(
            adapter.handle_message(&HostMessage::parse("plug pitch 1").unwrap()),
            Err(MessageError::UnknownSlot("pitch".into()))
        );
    }

    #[test]
    fn test_trigger_needs_connection_and_enable() {
        let mut adapter = VoiceAdapter::new(VoiceSettings::default()).unwrap();
        adapter.handle_message(&HostMessage::parse("enable trig 1").unwrap()).unwrap();
        assert!(!adapter.modulations().trigger_patched);
        adapter.handle_message(&HostMessage::parse("connect trig 1").unwrap()).unwrap();
        assert!(!adapter.modulations().trigger_patched);
        adapter.handle_message(&HostMessage::parse("enable trig 1").unwrap()).unwrap();
        assert!(adapter.modulations().trigger_patched);
    }

    #[test]
    fn test_silence_in_bounded_out() {
        let mut adapter = VoiceAdapter::new(VoiceSettings::default()).unwrap();
        for len in [12, 64, 100, 256] {
            let config = HostConfig::new(48_000.0, len);
            for _ in 0..4 {
                let (result, out, aux) = run(&mut adapter, &config, &silent_inputs(len), len);
                assert!(result.is_ok());
                assert!(out.iter().chain(aux.iter()).all(|s| s.is_finite() && s.abs() <= 1.0));
            }
        }
    }

    #[test]
    fn test_snapshot_and_get_engine() {
        let adapter = counting();
        assert_eq!(adapter.active_engine(), 7);
        let snapshot = adapter.snapshot();
        assert_eq!(snapshot["type"], "voice");
        assert_eq!(snapshot["patch"]["note"], 48.0);
        assert_eq!(snapshot["active_engine"], 7);
    }
}
