//! Engine Adapters
//!
//! One driver per wrapped engine. Each owns its engine exclusively, knows its
//! host ports, and composes the gate, smoothing, patch and block machinery
//! into a single render entry point.

mod modulator;
mod slope;
mod voice;

pub use modulator::{ModulatorAdapter, ModulatorControl, ModulatorSettings};
pub use slope::{SlopeAdapter, SlopeControl, SlopeSettings};
pub use voice::{VoiceAdapter, VoiceControl, VoiceSettings};

use crate::error::{ConfigError, MessageError};
use crate::host::{host_len, silence, HostConfig, Lifecycle, SampleRate};
use crate::message::HostMessage;
use crate::patch_state::{PatchStateTracker, SlotId};
use crate::port::PortSpec;
use serde::Serialize;

/// A plug-state notification for one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PatchChange {
    /// Connect and enable together, or disconnect
    Plug(bool),
    /// Connection change only (gate slots keep their enable toggle)
    Connect(bool),
    /// User toggle of a gate slot
    Enable(bool),
}

impl PatchChange {
    pub fn apply(self, tracker: &mut PatchStateTracker, slot: SlotId) {
        match self {
            PatchChange::Plug(patched) => tracker.set_patched(slot, patched),
            PatchChange::Connect(connected) => tracker.set_connected(slot, connected),
            PatchChange::Enable(enabled) => tracker.set_enabled(slot, enabled),
        }
    }
}

/// Parse `plug|connect|enable <slot> <value>`.
///
/// `slots` lists slot names in registration order. Returns `Ok(None)` for any
/// other selector.
pub(crate) fn parse_patch(
    message: &HostMessage,
    slots: &[&str],
) -> Result<Option<(SlotId, PatchChange)>, MessageError> {
    let change: fn(bool) -> PatchChange = match message.selector.as_str() {
        "plug" => PatchChange::Plug,
        "connect" => PatchChange::Connect,
        "enable" => PatchChange::Enable,
        _ => return Ok(None),
    };
    let name = message.symbol(0)?;
    let slot = slots
        .iter()
        .position(|s| *s == name)
        .ok_or_else(|| MessageError::UnknownSlot(name.to_string()))?;
    Ok(Some((slot, change(message.flag(1)?))))
}

/// Clamp a control value, discarding non-finite input
#[inline]
pub(crate) fn clamped(value: f32, min: f32, max: f32) -> Option<f32> {
    value.is_finite().then(|| value.clamp(min, max))
}

/// Checks shared by every render call.
///
/// Returns the host vector length and, when the sampling rate changed, the
/// rate to re-initialize the engine with. Outputs are silenced on error.
pub(crate) fn begin_render(
    lifecycle: &mut Lifecycle,
    spec: &PortSpec,
    config: &HostConfig,
    inputs: &[&[f32]],
    outputs: &mut [&mut [f32]],
) -> Result<(usize, Option<SampleRate>), ConfigError> {
    let result = host_len(spec, inputs, outputs)
        .map_err(|err| lifecycle.reject(err))
        .and_then(|len| lifecycle.begin(config, len).map(|rate| (len, rate)));
    if result.is_err() {
        silence(outputs);
    }
    result
}
