//! Patch State Tracking
//!
//! Each modulation slot records explicitly whether the host has a signal
//! patched into it. The flag is independent of the signal itself: an
//! unpatched inlet still delivers a (zero) vector, and that must not be
//! mistaken for a CV of zero volts.

use crate::gate::GateLine;
use crate::smoother::ParameterSmoother;
use serde::Serialize;

/// Index of a slot within a tracker, in registration order
pub type SlotId = usize;

/// Knob value, patch flag and smoothing state of one control parameter
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ControlChannel {
    pub knob: f32,
    pub patched: bool,
    smoother: ParameterSmoother,
}

impl ControlChannel {
    pub fn new(knob: f32, smoother: ParameterSmoother) -> Self {
        Self {
            knob,
            patched: false,
            smoother,
        }
    }

    /// Channel that follows its target without lag
    pub fn unsmoothed(knob: f32, min: f32, max: f32) -> Self {
        Self::new(knob, ParameterSmoother::new(1.0, min, max))
    }

    /// The live CV when patched, otherwise the knob
    #[inline]
    pub fn resolve(&self, cv: f32) -> f32 {
        if self.patched {
            cv
        } else {
            self.knob
        }
    }

    /// Knob with the CV added as an offset
    #[inline]
    pub fn offset(&self, cv: f32) -> f32 {
        self.knob + cv
    }

    /// Clamp and smooth a raw target, returning the new smoothed value
    #[inline]
    pub fn update(&mut self, raw: f32) -> f32 {
        self.smoother.step(raw)
    }

    #[inline]
    pub fn smoothed(&self) -> f32 {
        self.smoother.value()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
enum SlotState {
    Control(ControlChannel),
    Gate(GateLine),
    /// Patch flag only; the engine reads the raw signal itself
    Flag(bool),
}

#[derive(Debug, Clone, Serialize)]
struct Slot {
    name: &'static str,
    state: SlotState,
}

/// Per-instance record of knob values and patch connections
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchStateTracker {
    slots: Vec<Slot>,
}

impl PatchStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a control slot; its id is its registration index
    pub fn with_control(mut self, name: &'static str, channel: ControlChannel) -> Self {
        self.slots.push(Slot {
            name,
            state: SlotState::Control(channel),
        });
        self
    }

    /// Register a gate slot
    pub fn with_gate(mut self, name: &'static str, line: GateLine) -> Self {
        self.slots.push(Slot {
            name,
            state: SlotState::Gate(line),
        });
        self
    }

    /// Register a slot that records only whether a signal is patched
    pub fn with_flag(mut self, name: &'static str) -> Self {
        self.slots.push(Slot {
            name,
            state: SlotState::Flag(false),
        });
        self
    }

    /// Record a plug or unplug notification.
    ///
    /// Gate slots are connected and enabled together, or dropped to unavailable.
    pub fn set_patched(&mut self, slot: SlotId, patched: bool) {
        match self.slots.get_mut(slot).map(|s| &mut s.state) {
            Some(SlotState::Control(channel)) => channel.patched = patched,
            Some(SlotState::Gate(line)) => line.set_input(line.input().plug(patched)),
            Some(SlotState::Flag(flag)) => *flag = patched,
            None => log::warn!("plug notification for unknown slot {slot}"),
        }
    }

    /// Record a connection change on a gate slot, keeping the enable intent
    pub fn set_connected(&mut self, slot: SlotId, connected: bool) {
        if let Some(line) = self.gate_mut(slot) {
            line.set_input(line.input().connect(connected));
        }
    }

    /// Toggle a gate slot on or off; ignored while nothing is connected
    pub fn set_enabled(&mut self, slot: SlotId, enabled: bool) {
        if let Some(line) = self.gate_mut(slot) {
            line.set_input(line.input().enable(enabled));
        }
    }

    pub fn set_knob(&mut self, slot: SlotId, value: f32) {
        if let Some(channel) = self.channel_mut(slot) {
            channel.knob = value;
        }
    }

    pub fn knob(&self, slot: SlotId) -> f32 {
        self.channel(slot).map(|c| c.knob).unwrap_or(0.0)
    }

    /// Whether a slot is currently driven by an external signal
    pub fn is_patched(&self, slot: SlotId) -> bool {
        match self.slots.get(slot).map(|s| &s.state) {
            Some(SlotState::Control(channel)) => channel.patched,
            Some(SlotState::Gate(line)) => line.is_active(),
            Some(SlotState::Flag(flag)) => *flag,
            None => false,
        }
    }

    /// Value governing a slot: the live CV if patched, else the knob.
    ///
    /// Gate slots fall back to a constant "no gate" (0.0).
    pub fn resolve(&self, slot: SlotId, cv: f32) -> f32 {
        match self.slots.get(slot).map(|s| &s.state) {
            Some(SlotState::Control(channel)) => channel.resolve(cv),
            Some(SlotState::Gate(line)) if line.is_active() => cv,
            Some(SlotState::Flag(true)) => cv,
            _ => 0.0,
        }
    }

    /// Knob of a control slot with `cv` added as an offset
    pub fn offset(&self, slot: SlotId, cv: f32) -> f32 {
        self.channel(slot).map(|c| c.offset(cv)).unwrap_or(cv)
    }

    /// Clamp and smooth a raw target for a control slot
    pub fn smooth(&mut self, slot: SlotId, raw: f32) -> f32 {
        self.channel_mut(slot).map(|c| c.update(raw)).unwrap_or(0.0)
    }

    pub fn smoothed(&self, slot: SlotId) -> f32 {
        self.channel(slot).map(|c| c.smoothed()).unwrap_or(0.0)
    }

    pub fn channel(&self, slot: SlotId) -> Option<&ControlChannel> {
        match self.slots.get(slot).map(|s| &s.state) {
            Some(SlotState::Control(channel)) => Some(channel),
            _ => None,
        }
    }

    pub fn channel_mut(&mut self, slot: SlotId) -> Option<&mut ControlChannel> {
        match self.slots.get_mut(slot).map(|s| &mut s.state) {
            Some(SlotState::Control(channel)) => Some(channel),
            _ => None,
        }
    }

    pub fn gate(&self, slot: SlotId) -> Option<&GateLine> {
        match self.slots.get(slot).map(|s| &s.state) {
            Some(SlotState::Gate(line)) => Some(line),
            _ => None,
        }
    }

    pub fn gate_mut(&mut self, slot: SlotId) -> Option<&mut GateLine> {
        match self.slots.get_mut(slot).map(|s| &mut s.state) {
            Some(SlotState::Gate(line)) => Some(line),
            _ => None,
        }
    }
}
