//! Reference Engines
//!
//! Small engines implementing the collaborator traits so every adapter can be
//! run and tested on its own. They follow the parameter conventions of the
//! engines they stand in for but make no attempt at reproducing their sound.

mod modulator;
mod slope;
mod voice;

pub use modulator::CrossModulator;
pub use slope::{ClockRamp, SlopeGenerator};
pub use voice::SineVoice;

use libm::Libm;

/// MIDI note to Hz, A4 = 440
#[inline]
pub fn note_to_hz(note: f32) -> f32 {
    440.0 * Libm::<f32>::exp2((note - 69.0) / 12.0)
}

#[inline]
fn wrap_phase(phase: f32) -> f32 {
    phase - Libm::<f32>::floor(phase)
}
