//! The decoder-side block-split capture store.
//!
//! One of these exists per captured category (literals, insert/copy, see
//! [`crate::command::BlockCategory`]) when `save_info_for_recompression` is
//! set. It records, in *global* uncompressed-stream coordinates, the
//! boundaries of every block the decoder committed.

use crate::alloc::{BrotliAlloc, RawBuffer};
use crate::error::{BrotliError, Result};

/// Initial capacity for a freshly-initialized store (`BROTLI_INIT_STORED_BLOCK_SPLITS`
/// in the original source; this crate picks 16).
pub const INIT_STORED_BLOCK_SPLITS: usize = 16;

pub struct BlockSplitStore {
    alloc: BrotliAlloc,
    types: RawBuffer<u8>,
    positions_begin: RawBuffer<u32>,
    positions_end: RawBuffer<u32>,
    num_blocks: usize,
    num_types: usize,
    num_types_prev_metablocks: usize,
}

impl BlockSplitStore {
    pub fn init(alloc: BrotliAlloc) -> Result<Self> {
        Ok(Self {
            alloc,
            types: RawBuffer::alloc(alloc, INIT_STORED_BLOCK_SPLITS)?,
            positions_begin: RawBuffer::alloc(alloc, INIT_STORED_BLOCK_SPLITS)?,
            positions_end: RawBuffer::alloc(alloc, INIT_STORED_BLOCK_SPLITS)?,
            num_blocks: 0,
            num_types: 0,
            num_types_prev_metablocks: 0,
        })
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    #[must_use]
    pub fn num_types(&self) -> usize {
        self.num_types
    }

    #[must_use]
    pub fn num_types_prev_metablocks(&self) -> usize {
        self.num_types_prev_metablocks
    }

    #[must_use]
    pub fn types_alloc_size(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn positions_alloc_size(&self) -> usize {
        self.positions_begin.len()
    }

    #[must_use]
    pub fn types(&self) -> &[u8] {
        &self.types.as_slice()[..self.num_blocks]
    }

    #[must_use]
    pub fn positions_begin(&self) -> &[u32] {
        &self.positions_begin.as_slice()[..self.num_blocks]
    }

    #[must_use]
    pub fn positions_end(&self) -> &[u32] {
        &self.positions_end.as_slice()[..self.num_blocks]
    }

    /// `BrotliEnsureCapacityBlockSplits`. On failure, `self` is left
    /// byte-for-byte as it was on entry: both the reallocation *and* the copy
    /// into the new buffer happen before anything is written back into
    /// `self`.
    pub fn ensure_capacity(&mut self, requested: usize) -> Result<()> {
        let types_ok = self.types.len() >= requested;
        let positions_ok = self.positions_begin.len() >= requested;
        if types_ok && positions_ok {
            return Ok(());
        }
        let new_size = requested
            .checked_mul(2)
            .ok_or(BrotliError::CapacityOverflow)?;

        let grown_types = if types_ok {
            None
        } else {
            let mut buf = RawBuffer::<u8>::alloc(self.alloc, new_size)?;
            buf.as_mut_slice()[..self.num_blocks].copy_from_slice(self.types());
            Some(buf)
        };

        let grown_positions = if positions_ok {
            None
        } else {
            let mut begin = RawBuffer::<u32>::alloc(self.alloc, new_size)?;
            begin.as_mut_slice()[..self.num_blocks].copy_from_slice(self.positions_begin());
            let mut end = RawBuffer::<u32>::alloc(self.alloc, new_size)?;
            end.as_mut_slice()[..self.num_blocks].copy_from_slice(self.positions_end());
            Some((begin, end))
        };

        if let Some(buf) = grown_types {
            log::debug!(
                "block-split types store grown {} -> {new_size}",
                self.types.len()
            );
            self.types = buf;
        }
        if let Some((begin, end)) = grown_positions {
            log::debug!(
                "block-split positions store grown {} -> {new_size}",
                self.positions_begin.len()
            );
            self.positions_begin = begin;
            self.positions_end = end;
        }
        Ok(())
    }

    /// The decoder half of `MetablockBegin` for one category: grows the
    /// store if needed and opens the tentative slot at `num_blocks`. The
    /// caller (`state.rs`) is responsible for tracking that a slot is open
    /// (`saved_position_*_begin`).
    pub fn open_tentative_block(&mut self, global_position: u32) -> Result<()> {
        self.ensure_capacity(self.num_blocks + 1)?;
        let type_id = self.num_types_prev_metablocks;
        self.types.as_mut_slice()[self.num_blocks] = type_id as u8;
        self.positions_begin.as_mut_slice()[self.num_blocks] = global_position;
        self.num_types = self.num_types.max(type_id + 1);
        Ok(())
    }

    /// The decoder half of `CleanupAfterMetablock` for one category: closes
    /// the tentative slot opened by `open_tentative_block`, committing it.
    pub fn close_tentative_block(&mut self, global_position: u32) {
        self.positions_end.as_mut_slice()[self.num_blocks] = global_position;
        self.num_blocks += 1;
        self.num_types_prev_metablocks = self.num_types;
    }

    /// Converts the committed entries into an encoder-side
    /// [`crate::splitter::BlockSplit`] (one length per committed block,
    /// `lengths[i] = positions_end[i] - positions_begin[i]`), the form the
    /// encoder's reconciliation pass consumes.
    #[must_use]
    pub fn to_block_split(&self) -> crate::splitter::BlockSplit {
        let types = self.types().to_vec();
        let lengths = self
            .positions_begin()
            .iter()
            .zip(self.positions_end())
            .map(|(&b, &e)| e - b)
            .collect();
        crate::splitter::BlockSplit::from_parts(types, lengths, self.num_types)
    }
}
