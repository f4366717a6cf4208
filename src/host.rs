//! Host Contract
//!
//! The host delivers one render call per audio block with a fixed set of
//! input and output vectors. Everything an adapter needs to know about the
//! host (sampling rate, nominal block size) travels in a [`HostConfig`]
//! owned by the caller and passed down explicitly; nothing is shared
//! between instances.

use crate::error::{ConfigError, MessageError};
use crate::message::{HostMessage, MessageReceiver};
use crate::port::PortSpec;
use serde::{Deserialize, Serialize};

/// Sampling rate and host vector size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    pub sample_rate: f32,
    pub block_size: usize,
}

impl HostConfig {
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
        }
    }

    /// Check the sampling rate and return it as an engine context
    pub fn sample_rate(&self) -> Result<SampleRate, ConfigError> {
        SampleRate::new(self.sample_rate)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new(48_000.0, 64)
    }
}

/// A validated sampling rate with its reciprocal
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleRate {
    hz: f32,
    inv: f32,
}

impl SampleRate {
    pub fn new(hz: f32) -> Result<Self, ConfigError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(ConfigError::InvalidSampleRate(hz));
        }
        Ok(Self { hz, inv: 1.0 / hz })
    }

    #[inline]
    pub fn hz(&self) -> f32 {
        self.hz
    }

    /// Seconds per sample
    #[inline]
    pub fn inv(&self) -> f32 {
        self.inv
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self {
            hz: 48_000.0,
            inv: 1.0 / 48_000.0,
        }
    }
}

/// Host vector lengths an adapter can run with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockRequirement {
    pub minimum: usize,
    pub multiple: Option<usize>,
}

impl BlockRequirement {
    /// Any positive length
    pub fn any() -> Self {
        Self {
            minimum: 1,
            multiple: None,
        }
    }

    pub fn at_least(minimum: usize) -> Self {
        Self {
            minimum,
            multiple: None,
        }
    }

    /// A positive multiple of `block`
    pub fn multiple_of(block: usize) -> Self {
        Self {
            minimum: block,
            multiple: Some(block),
        }
    }

    pub fn check(&self, block_size: usize) -> Result<(), ConfigError> {
        if block_size < self.minimum.max(1) {
            return Err(ConfigError::BlockTooSmall {
                block_size,
                minimum: self.minimum.max(1),
            });
        }
        match self.multiple {
            Some(multiple) if block_size % multiple != 0 => {
                Err(ConfigError::BlockNotMultiple {
                    block_size,
                    multiple,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Whether an adapter is rendering
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub enum AdapterState {
    /// Not yet configured
    #[default]
    Idle,
    Active,
    /// Refusing to render until a compatible configuration arrives
    Rejected(ConfigError),
}

/// Tracks configuration validity and detects sample-rate changes
#[derive(Debug, Clone)]
pub struct Lifecycle {
    name: &'static str,
    requirement: BlockRequirement,
    state: AdapterState,
    sample_rate: Option<SampleRate>,
}

impl Lifecycle {
    pub fn new(name: &'static str, requirement: BlockRequirement) -> Self {
        Self {
            name,
            requirement,
            state: AdapterState::Idle,
            sample_rate: None,
        }
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn requirement(&self) -> BlockRequirement {
        self.requirement
    }

    pub fn sample_rate(&self) -> Option<SampleRate> {
        self.sample_rate
    }

    /// Validate a configuration.
    ///
    /// Returns the rate the engine must be initialized with when it differs
    /// from the current one, or `None` when the engine state can be kept.
    pub fn prepare(&mut self, config: &HostConfig) -> Result<Option<SampleRate>, ConfigError> {
        match self.validate(config, config.block_size) {
            Ok(rate) => Ok(self.activate(config, rate)),
            Err(err) => Err(self.reject(err)),
        }
    }

    /// Checks made at the start of every render call.
    ///
    /// Nothing is committed unless the configuration and the call length
    /// both pass, so a rejected call never consumes a pending rate change.
    pub fn begin(
        &mut self,
        config: &HostConfig,
        len: usize,
    ) -> Result<Option<SampleRate>, ConfigError> {
        let checked = self
            .validate(config, config.block_size)
            .and_then(|rate| self.requirement.check(len).map(|_| rate));
        match checked {
            Ok(rate) => Ok(self.activate(config, rate)),
            Err(err) => Err(self.reject(err)),
        }
    }

    fn validate(&self, config: &HostConfig, block_size: usize) -> Result<SampleRate, ConfigError> {
        let rate = config.sample_rate()?;
        self.requirement.check(block_size)?;
        Ok(rate)
    }

    fn activate(&mut self, config: &HostConfig, rate: SampleRate) -> Option<SampleRate> {
        if self.state != AdapterState::Active {
            log::debug!(
                "{}: active at {} Hz, {} samples per call",
                self.name,
                rate.hz(),
                config.block_size
            );
        }
        self.state = AdapterState::Active;

        if self.sample_rate.map(|current| current.hz()) == Some(rate.hz()) {
            None
        } else {
            self.sample_rate = Some(rate);
            Some(rate)
        }
    }

    /// Enter the rejected state, reporting each distinct error once
    pub fn reject(&mut self, err: ConfigError) -> ConfigError {
        if self.state != AdapterState::Rejected(err) {
            log::error!("{}: {err}", self.name);
        }
        self.state = AdapterState::Rejected(err);
        err
    }
}

/// Verify vector counts and lengths, returning the common length
pub fn host_len(
    spec: &PortSpec,
    inputs: &[&[f32]],
    outputs: &[&mut [f32]],
) -> Result<usize, ConfigError> {
    if inputs.len() != spec.num_inputs() {
        return Err(ConfigError::ChannelMismatch {
            expected: spec.num_inputs(),
            found: inputs.len(),
        });
    }
    if outputs.len() != spec.num_outputs() {
        return Err(ConfigError::ChannelMismatch {
            expected: spec.num_outputs(),
            found: outputs.len(),
        });
    }

    let len = outputs.first().map(|o| o.len()).unwrap_or(0);
    let uniform = inputs.iter().all(|i| i.len() == len) && outputs.iter().all(|o| o.len() == len);
    if uniform {
        Ok(len)
    } else {
        Err(ConfigError::LengthMismatch)
    }
}

/// Zero every output vector
pub fn silence(outputs: &mut [&mut [f32]]) {
    for output in outputs.iter_mut() {
        output.fill(0.0);
    }
}

/// A host-facing driver wrapping one fixed-block engine
pub trait EngineAdapter: Send {
    /// Parsed, validated control message
    type Control: Copy + Send + 'static;

    /// Short identifier, e.g. "voice"
    fn type_id(&self) -> &'static str;

    /// Inlets and outlets, in the order render expects them
    fn port_spec(&self) -> &PortSpec;

    fn state(&self) -> AdapterState;

    /// Validate a host configuration and (re)initialize the engine if needed
    fn prepare(&mut self, config: &HostConfig) -> Result<(), ConfigError>;

    /// Render one host call.
    ///
    /// On any configuration problem the outputs are silenced and the error is
    /// returned; the adapter does not render until the problem is resolved.
    fn render(
        &mut self,
        config: &HostConfig,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
    ) -> Result<(), ConfigError>;

    /// Apply a knob, plug or mode change
    fn apply(&mut self, control: Self::Control);

    /// Read-only parameter dump
    fn snapshot(&self) -> serde_json::Value;

    /// Apply every queued control, returning how many were applied
    fn drain<R>(&mut self, receiver: &mut R) -> usize
    where
        R: MessageReceiver<Self::Control>,
        Self: Sized,
    {
        let mut applied = 0;
        while let Some(control) = receiver.pop() {
            self.apply(control);
            applied += 1;
        }
        applied
    }

    /// Parse and apply a host message
    fn handle_message(&mut self, message: &HostMessage) -> Result<(), MessageError>
    where
        Self: Sized,
        Self::Control: for<'a> TryFrom<&'a HostMessage, Error = MessageError>,
    {
        let control = Self::Control::try_from(message)?;
        log::debug!("{}: {}", self.type_id(), message.selector);
        self.apply(control);
        Ok(())
    }
}
