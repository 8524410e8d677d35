//! The decoder state container and its metablock lifecycle.

use bitflags::bitflags;

use crate::alloc::BrotliAlloc;
use crate::block_split::BlockSplitStore;
use crate::command::BlockCategory;
use crate::error::{BrotliError, Result};
use crate::huffman::HuffmanTreeGroup;

bitflags! {
    /// The boolean mode toggles the decoder tracks, collected into one
    /// bitset (the pack's own `bitflags` dependency choice) instead of six
    /// separate `bool` fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DecoderFlags: u8 {
        const IS_LAST_METABLOCK          = 1 << 0;
        const IS_UNCOMPRESSED             = 1 << 1;
        const IS_METADATA                 = 1 << 2;
        const SHOULD_WRAP_RINGBUFFER       = 1 << 3;
        const LARGE_WINDOW                 = 1 << 4;
        const CANNY_RINGBUFFER_ALLOCATION  = 1 << 5;
    }
}

/// `{16, 15, 11, 4}`, the decoder's four-entry last-distance ring at init.
const INITIAL_DIST_RB: [i32; 4] = [16, 15, 11, 4];

/// `block_length[k] = 2^24` reset at every `MetablockBegin`.
const INITIAL_BLOCK_LENGTH: u32 = 1 << 24;

/// `block_type_rb = {1, 0, 1, 0, 1, 0}`, the six-entry ring encoding the
/// last two types per category, "only type is 0" initial configuration.
const INITIAL_BLOCK_TYPE_RB: [u32; 6] = [1, 0, 1, 0, 1, 0];

pub struct DecoderState {
    alloc: BrotliAlloc,
    flags: DecoderFlags,
    /// Current write offset into the ringbuffer, modulo its size.
    pos: u64,
    /// Count of completed ringbuffer wrap-arounds.
    rb_roundtrips: u64,
    /// log2 of the sliding window size; fixed for the state's lifetime.
    window_bits: u32,
    dist_rb: [i32; 4],
    dist_rb_idx: usize,
    mtf_upper_bound: u32,
    block_length: [u32; 3],
    num_block_types: [u32; 3],
    block_type_rb: [u32; 6],
    meta_block_remaining_len: i64,
    save_info_for_recompression: bool,
    saved_position_literals_begin: bool,
    saved_position_lengths_begin: bool,
    literal_split_store: Option<BlockSplitStore>,
    insert_copy_split_store: Option<BlockSplitStore>,
    /// Per-category Huffman tree groups, reallocated once per metablock
    /// header and released in `cleanup_after_metablock`.
    tree_groups: [Option<HuffmanTreeGroup>; 3],
    /// Sticky error slot, set but never cleared automatically.
    error: Option<BrotliError>,
}

impl DecoderState {
    /// `Init`. `window_bits` is fixed for the state's lifetime.
    pub fn init(alloc: BrotliAlloc, window_bits: u32, save_info_for_recompression: bool) -> Result<Self> {
        let (literal_split_store, insert_copy_split_store) = if save_info_for_recompression {
            (
                Some(BlockSplitStore::init(alloc)?),
                Some(BlockSplitStore::init(alloc)?),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            alloc,
            flags: DecoderFlags::empty(),
            pos: 0,
            rb_roundtrips: 0,
            window_bits,
            dist_rb: INITIAL_DIST_RB,
            dist_rb_idx: 0,
            mtf_upper_bound: 63,
            block_length: [INITIAL_BLOCK_LENGTH; 3],
            num_block_types: [1; 3],
            block_type_rb: INITIAL_BLOCK_TYPE_RB,
            meta_block_remaining_len: 0,
            save_info_for_recompression,
            saved_position_literals_begin: false,
            saved_position_lengths_begin: false,
            literal_split_store,
            insert_copy_split_store,
            tree_groups: [None, None, None],
            error: None,
        })
    }

    /// The allocator this state (and anything it owns) routes memory
    /// through, exposed so callers building per-metablock `HuffmanTreeGroup`s
    /// reuse the same `(alloc, free, opaque)` triple rather than installing
    /// a second one.
    #[must_use]
    pub fn alloc(&self) -> BrotliAlloc {
        self.alloc
    }

    #[must_use]
    pub fn flags(&self) -> DecoderFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: DecoderFlags) {
        self.flags = flags;
    }

    #[must_use]
    pub fn error(&self) -> Option<BrotliError> {
        self.error
    }

    /// `pos + (rb_roundtrips << window_bits)`, the only correct formula
    /// while `window_bits` is fixed across the stream.
    #[must_use]
    pub fn global_position(&self) -> u32 {
        (self.pos + (self.rb_roundtrips << self.window_bits)) as u32
    }

    /// Advances the ringbuffer write cursor by `n` bytes, tracking
    /// wrap-arounds.
    pub fn advance_position(&mut self, n: u64) {
        let ring_size = 1u64 << self.window_bits;
        self.pos += n;
        while self.pos >= ring_size {
            self.pos -= ring_size;
            self.rb_roundtrips += 1;
        }
    }

    #[must_use]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    #[must_use]
    pub fn rb_roundtrips(&self) -> u64 {
        self.rb_roundtrips
    }

    #[must_use]
    pub fn dist_rb(&self) -> [i32; 4] {
        self.dist_rb
    }

    #[must_use]
    pub fn block_length(&self, category: BlockCategory) -> u32 {
        self.block_length[category.index()]
    }

    #[must_use]
    pub fn num_block_types(&self, category: BlockCategory) -> u32 {
        self.num_block_types[category.index()]
    }

    #[must_use]
    pub fn literal_split_store(&self) -> Option<&BlockSplitStore> {
        self.literal_split_store.as_ref()
    }

    #[must_use]
    pub fn insert_copy_split_store(&self) -> Option<&BlockSplitStore> {
        self.insert_copy_split_store.as_ref()
    }

    /// Hands the literal-category store to the caller without dropping the
    /// rest of the state. The block-split stores persist until explicit
    /// disposal by the caller.
    pub fn take_literal_split_store(&mut self) -> Option<BlockSplitStore> {
        self.literal_split_store.take()
    }

    pub fn take_insert_copy_split_store(&mut self) -> Option<BlockSplitStore> {
        self.insert_copy_split_store.take()
    }

    /// `MetablockBegin`. Resets per-metablock counters and, if
    /// recompression capture is enabled, opens a tentative slot in each
    /// store.
    pub fn metablock_begin(&mut self) -> Result<()> {
        self.meta_block_remaining_len = 0;
        self.block_length = [INITIAL_BLOCK_LENGTH; 3];
        self.num_block_types = [1; 3];
        self.block_type_rb = INITIAL_BLOCK_TYPE_RB;
        self.tree_groups = [None, None, None];

        if self.save_info_for_recompression {
            let global_position = self.global_position();
            if let Some(store) = self.literal_split_store.as_mut() {
                if let Err(e) = store.open_tentative_block(global_position) {
                    self.error = Some(e);
                    return Err(e);
                }
                self.saved_position_literals_begin = true;
            }
            if let Some(store) = self.insert_copy_split_store.as_mut() {
                if let Err(e) = store.open_tentative_block(global_position) {
                    self.error = Some(e);
                    return Err(e);
                }
                self.saved_position_lengths_begin = true;
            }
        }
        log::trace!(
            "metablock_begin: global_position={} literal_blocks={:?} insert_copy_blocks={:?}",
            self.global_position(),
            self.literal_split_store.as_ref().map(BlockSplitStore::num_blocks),
            self.insert_copy_split_store.as_ref().map(BlockSplitStore::num_blocks),
        );
        Ok(())
    }

    /// `CleanupAfterMetablock`. Releases the per-metablock Huffman
    /// tree groups and, if a tentative block was opened, commits it.
    pub fn cleanup_after_metablock(&mut self) {
        self.tree_groups = [None, None, None];

        let global_position = self.global_position();
        if self.saved_position_literals_begin {
            if let Some(store) = self.literal_split_store.as_mut() {
                store.close_tentative_block(global_position);
            }
            self.saved_position_literals_begin = false;
        }
        if self.saved_position_lengths_begin {
            if let Some(store) = self.insert_copy_split_store.as_mut() {
                store.close_tentative_block(global_position);
            }
            self.saved_position_lengths_begin = false;
        }
        log::trace!(
            "cleanup_after_metablock: literal_blocks={:?} insert_copy_blocks={:?}",
            self.literal_split_store.as_ref().map(BlockSplitStore::num_blocks),
            self.insert_copy_split_store.as_ref().map(BlockSplitStore::num_blocks),
        );
    }

    /// `Cleanup`: finishes any open metablock, then releases the
    /// per-metablock Huffman tree groups one final time. The block-split
    /// stores are not dropped here, see `take_*_split_store`.
    pub fn cleanup(&mut self) {
        self.cleanup_after_metablock();
    }

    pub fn install_tree_group(&mut self, category: BlockCategory, group: HuffmanTreeGroup) {
        self.tree_groups[category.index()] = Some(group);
    }

    #[must_use]
    pub fn tree_group(&self, category: BlockCategory) -> Option<&HuffmanTreeGroup> {
        self.tree_groups[category.index()].as_ref()
    }
}

impl Drop for DecoderState {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metablock_commits_zero_length_block() {
        let mut state = DecoderState::init(BrotliAlloc::default(), 22, true).unwrap();
        state.metablock_begin().unwrap();
        state.cleanup_after_metablock();

        let store = state.literal_split_store().unwrap();
        assert_eq!(store.num_blocks(), 1);
        assert_eq!(store.positions_begin()[0], store.positions_end()[0]);
        assert_eq!(store.num_types_prev_metablocks(), 1);
    }

    #[test]
    fn two_back_to_back_metablocks_commit_adjacent_blocks() {
        let mut state = DecoderState::init(BrotliAlloc::default(), 22, true).unwrap();

        state.metablock_begin().unwrap();
        state.advance_position(1000);
        state.cleanup_after_metablock();

        state.metablock_begin().unwrap();
        state.advance_position(500);
        state.cleanup_after_metablock();

        let store = state.literal_split_store().unwrap();
        assert_eq!(store.positions_end()[0] - store.positions_begin()[0], 1000);
        assert_eq!(store.positions_begin()[1], store.positions_end()[0]);
        assert_eq!(store.positions_end()[1] - store.positions_begin()[1], 500);
    }

    #[test]
    fn metablock_spanning_ringbuffer_wrap_tracks_roundtrip() {
        let mut state = DecoderState::init(BrotliAlloc::default(), 10, true).unwrap();
        state.metablock_begin().unwrap();
        state.advance_position(1500);
        state.cleanup_after_metablock();

        let store = state.literal_split_store().unwrap();
        assert_eq!(store.positions_end()[0] - store.positions_begin()[0], 1500);
        assert_eq!(state.rb_roundtrips(), 1);
        assert_eq!(state.pos(), 476);
    }

    #[test]
    fn saved_position_flags_clear_after_cleanup() {
        let mut state = DecoderState::init(BrotliAlloc::default(), 22, true).unwrap();
        state.metablock_begin().unwrap();
        assert!(state.saved_position_literals_begin);
        assert!(state.saved_position_lengths_begin);
        state.cleanup_after_metablock();
        assert!(!state.saved_position_literals_begin);
        assert!(!state.saved_position_lengths_begin);
    }

    #[test]
    fn recompression_disabled_keeps_stores_absent() {
        let mut state = DecoderState::init(BrotliAlloc::default(), 22, false).unwrap();
        state.metablock_begin().unwrap();
        state.cleanup_after_metablock();
        assert!(state.literal_split_store().is_none());
        assert!(state.insert_copy_split_store().is_none());
    }

    #[test]
    fn init_distance_ring_matches_spec_constants() {
        let state = DecoderState::init(BrotliAlloc::default(), 22, false).unwrap();
        assert_eq!(state.dist_rb(), [16, 15, 11, 4]);
    }
}
