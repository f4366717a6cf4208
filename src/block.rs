//! Sub-Block Iteration
//!
//! Engines that render in small fixed chunks are driven by slicing the host
//! vector into consecutive chunks of the engine block size. Control inputs are
//! sampled once per chunk, the engine renders into a scratch block, and the
//! scratch block is copied back into every host output at the chunk offset.

use crate::error::{AdapterError, ConfigError};
use crate::host::BlockRequirement;

/// How a trailing remainder shorter than the engine block is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPolicy {
    /// Engine renders exactly one block per call; host vectors must divide evenly
    Exact,
    /// Engine accepts a shorter final chunk
    AllowPartial,
}

/// Allocate a zeroed vector, reporting allocation failure instead of aborting
pub(crate) fn try_zeroed<T: Copy + Default>(len: usize) -> Result<Vec<T>, AdapterError> {
    let mut samples = Vec::new();
    samples
        .try_reserve_exact(len)
        .map_err(|_| AdapterError::Allocation {
            bytes: len * core::mem::size_of::<T>(),
        })?;
    samples.resize(len, T::default());
    Ok(samples)
}

/// Multi-channel scratch buffer holding one engine block
#[derive(Debug, Clone)]
pub struct ScratchBlock {
    channels: Vec<Vec<f32>>,
    block_size: usize,
}

impl ScratchBlock {
    pub fn try_new(num_channels: usize, block_size: usize) -> Result<Self, AdapterError> {
        let channels = (0..num_channels)
            .map(|_| try_zeroed(block_size))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            channels,
            block_size,
        })
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Two distinct channels borrowed mutably at once
    pub fn pair_mut(&mut self, first: usize, second: usize) -> (&mut [f32], &mut [f32]) {
        assert!(first < second, "channels must be given in ascending order");
        let (head, tail) = self.channels.split_at_mut(second);
        (&mut head[first], &mut tail[0])
    }
}

/// One chunk of the host vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: usize,
    pub len: usize,
}

impl Chunk {
    #[inline]
    pub fn range(&self) -> core::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Iterator over the chunks of one host vector
#[derive(Debug, Clone)]
pub struct Chunks {
    offset: usize,
    len: usize,
    block_size: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.offset >= self.len {
            return None;
        }
        let chunk = Chunk {
            offset: self.offset,
            len: self.block_size.min(self.len - self.offset),
        };
        self.offset += self.block_size;
        Some(chunk)
    }
}

/// Drives a fixed-block engine across a variable-length host vector
#[derive(Debug, Clone, Copy)]
pub struct SubBlockIterator {
    block_size: usize,
    policy: ChunkPolicy,
}

impl SubBlockIterator {
    pub fn new(block_size: usize, policy: ChunkPolicy) -> Self {
        assert!(block_size > 0, "engine block size must be positive");
        Self { block_size, policy }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn policy(&self) -> ChunkPolicy {
        self.policy
    }

    /// Host block constraints implied by the engine block and policy
    pub fn requirement(&self) -> BlockRequirement {
        match self.policy {
            ChunkPolicy::Exact => BlockRequirement::multiple_of(self.block_size),
            ChunkPolicy::AllowPartial => BlockRequirement::at_least(self.block_size),
        }
    }

    pub fn validate(&self, len: usize) -> Result<(), ConfigError> {
        self.requirement().check(len)
    }

    /// Chunks covering `[0, len)` in order
    pub fn chunks(&self, len: usize) -> Chunks {
        Chunks {
            offset: 0,
            len,
            block_size: self.block_size,
        }
    }

    /// Render every chunk of a host call and scatter it into `outputs`.
    ///
    /// `render` fills the first `chunk.len` samples of each scratch channel;
    /// scratch channel `n` is copied into `outputs[n]`. Returns the number of
    /// chunks rendered.
    pub fn run<F>(
        &self,
        len: usize,
        scratch: &mut ScratchBlock,
        outputs: &mut [&mut [f32]],
        mut render: F,
    ) -> Result<usize, ConfigError>
    where
        F: FnMut(Chunk, &mut ScratchBlock),
    {
        self.validate(len)?;
        if outputs.len() > scratch.num_channels() {
            return Err(ConfigError::ChannelMismatch {
                expected: scratch.num_channels(),
                found: outputs.len(),
            });
        }

        let mut rendered = 0;
        for chunk in self.chunks(len) {
            render(chunk, scratch);
            for (index, output) in outputs.iter_mut().enumerate() {
                output[chunk.range()].copy_from_slice(&scratch.channel(index)[..chunk.len]);
            }
            rendered += 1;
        }
        Ok(rendered)
    }
}
