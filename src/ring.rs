//! Block Ring Adapter
//!
//! Engines that only process whole blocks of a fixed size are driven through a
//! pair of ring buffers whose cursor persists across host calls. The block
//! boundary can fall anywhere inside a host call, so host vectors of any
//! length are accepted.
//!
//! Output for a sample is read at the cursor position after it has been
//! advanced for that sample. With an identity engine the output therefore
//! trails the input by `block_size - 1` samples, and the first
//! `block_size - 1` samples emitted are silence.

use crate::block::try_zeroed;
use crate::error::AdapterError;
use serde::Serialize;

/// Paired input/output rings with a persistent write cursor
#[derive(Debug, Clone)]
pub struct BlockRing<T> {
    input: Vec<T>,
    output: Vec<T>,
    write_index: usize,
    blocks_processed: u64,
}

impl<T: Copy + Default> BlockRing<T> {
    pub fn try_new(block_size: usize) -> Result<Self, AdapterError> {
        assert!(block_size > 0, "ring block size must be positive");
        Ok(Self {
            input: try_zeroed(block_size)?,
            output: try_zeroed(block_size)?,
            write_index: 0,
            blocks_processed: 0,
        })
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.input.len()
    }

    #[inline]
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Number of full blocks handed to the engine since construction or reset
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed
    }

    /// Push one input frame and return the output frame for the same sample.
    ///
    /// `process` runs exactly when the cursor wraps.
    #[inline]
    pub fn push<P>(&mut self, frame: T, process: P) -> T
    where
        P: FnOnce(&[T], &mut [T]),
    {
        self.input[self.write_index] = frame;
        self.write_index += 1;
        if self.write_index == self.input.len() {
            process(&self.input, &mut self.output);
            self.blocks_processed += 1;
            self.write_index = 0;
        }
        self.output[self.write_index]
    }

    /// Stream `len` host samples through the ring.
    ///
    /// `read_input(i)` supplies the frame for host sample `i`,
    /// `write_output(i, frame)` receives the emitted frame.
    pub fn process<R, W, P>(
        &mut self,
        len: usize,
        mut read_input: R,
        mut write_output: W,
        mut process_block: P,
    ) where
        R: FnMut(usize) -> T,
        W: FnMut(usize, T),
        P: FnMut(&[T], &mut [T]),
    {
        for i in 0..len {
            let frame = self.push(read_input(i), &mut process_block);
            write_output(i, frame);
        }
    }

    /// Clear both rings and rewind the cursor
    pub fn reset(&mut self) {
        self.input.fill(T::default());
        self.output.fill(T::default());
        self.write_index = 0;
        self.blocks_processed = 0;
    }

    /// Cursor state for diagnostics
    pub fn cursor(&self) -> RingCursor {
        RingCursor {
            write_index: self.write_index,
            block_size: self.block_size(),
            blocks_processed: self.blocks_processed,
        }
    }
}

/// Serializable view of a ring's cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RingCursor {
    pub write_index: usize,
    pub block_size: usize,
    pub blocks_processed: u64,
}
