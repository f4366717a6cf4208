//! # Sluice: Host-Vector Adapters for Fixed-Block Engines
//!
//! `sluice` sits between a host that hands over audio in vectors of whatever
//! size it likes and synthesis engines that only render fixed blocks. It
//! covers three engine shapes:
//!
//! - **Voice** - renders blocks of 12 samples; host vectors are split into
//!   chunks with a shorter trailing chunk allowed
//! - **Slope generator** - renders blocks of 8 samples; host vectors must be a
//!   whole multiple of 8
//! - **Modulator** - processes blocks of 16 frames through a persistent ring,
//!   so any host vector length works at a fixed latency
//!
//! Around the block machinery sit the pieces every adapter shares: gate edge
//! extraction, one-pole parameter smoothing, explicit patch-state tracking and
//! the clock ratio table.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sluice::prelude::*;
//!
//! let config = HostConfig::new(48_000.0, 64);
//! let mut voice = VoiceAdapter::new(VoiceSettings::default()).unwrap();
//! voice.prepare(&config).unwrap();
//!
//! // Controls arrive as host messages
//! let message = HostMessage::parse("timbre 0.7").unwrap();
//! voice.handle_message(&message).unwrap();
//!
//! // One render call per host vector
//! let silence = [0.0_f32; 64];
//! let inputs = [&silence[..]; 8];
//! let mut out = [0.0_f32; 64];
//! let mut aux = [0.0_f32; 64];
//! voice.render(&config, &inputs, &mut [&mut out[..], &mut aux[..]]).unwrap();
//! ```

pub mod adapters;
pub mod block;
pub mod engine;
pub mod engines;
pub mod error;
pub mod gate;
pub mod host;
pub mod message;
pub mod patch_state;
pub mod port;
pub mod ratio;
pub mod ring;
pub mod smoother;

/// Prelude module for convenient imports
pub mod prelude {
    // Adapters
    pub use crate::adapters::{
        ModulatorAdapter, ModulatorControl, ModulatorSettings, PatchChange, SlopeAdapter,
        SlopeControl, SlopeSettings, VoiceAdapter, VoiceControl, VoiceSettings,
    };

    // Host contract
    pub use crate::host::{
        AdapterState, BlockRequirement, EngineAdapter, HostConfig, Lifecycle, SampleRate,
    };
    pub use crate::port::{PortDef, PortId, PortSpec, SignalKind};

    // Block processing
    pub use crate::block::{Chunk, ChunkPolicy, ScratchBlock, SubBlockIterator};
    pub use crate::ring::{BlockRing, RingCursor};

    // Shared signal conditioning
    pub use crate::gate::{GateFlag, GateInput, GateLine};
    pub use crate::patch_state::{ControlChannel, PatchStateTracker, SlotId};
    pub use crate::ratio::{Ratio, RATIOS};
    pub use crate::smoother::ParameterSmoother;

    // Engine contracts and reference engines
    pub use crate::engine::{
        ModulatorEngine, ModulatorParameters, OutputMode, RampExtractor, RampMode, Range,
        SlopeControls, SlopeEngine, SlopeSample, StereoFrame, VoiceEngine, VoiceModulations,
        VoicePatch,
    };
    pub use crate::engines::{ClockRamp, CrossModulator, SineVoice, SlopeGenerator};

    // Control path
    pub use crate::message::{Atom, HostMessage, MessageReceiver};
    #[cfg(feature = "rtrb")]
    pub use crate::message::{control_channel, ControlReceiver, ControlSender};

    // Errors
    pub use crate::error::{AdapterError, ConfigError, MessageError};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
