//! Error types
//!
//! Configuration problems are the only errors that reach the render path.
//! Out-of-range control values never become errors: they are clamped where
//! they are stored.

use serde::Serialize;
use thiserror::Error;

/// Host setup that an adapter cannot run with
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize)]
pub enum ConfigError {
    /// Host vector is shorter than the engine's fixed block
    #[error("host block size {block_size} is smaller than the engine block of {minimum} samples")]
    BlockTooSmall { block_size: usize, minimum: usize },

    /// Engine requires exact chunks and the host vector does not divide evenly
    #[error("host block size {block_size} is not a multiple of {multiple}")]
    BlockNotMultiple { block_size: usize, multiple: usize },

    #[error("invalid sample rate {0}")]
    InvalidSampleRate(f32),

    /// Wrong number of input or output vectors handed to render
    #[error("expected {expected} channels, found {found}")]
    ChannelMismatch { expected: usize, found: usize },

    /// Input and output vectors of one call differ in length
    #[error("host vectors differ in length")]
    LengthMismatch,
}

/// Errors raised while parsing a host control message
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MessageError {
    #[error("unknown selector '{0}'")]
    UnknownSelector(String),

    #[error("selector '{selector}' is missing an argument")]
    MissingArgument { selector: String },

    #[error("unknown slot '{0}'")]
    UnknownSlot(String),
}

/// Errors raised while building or driving an adapter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Scratch or ring buffers could not be reserved
    #[error("failed to allocate {bytes} bytes of scratch memory")]
    Allocation { bytes: usize },

    #[error(transparent)]
    Message(#[from] MessageError),
}
