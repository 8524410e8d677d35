//! Huffman tree group manager.
//!
//! Huffman table *construction* (canonical-code assignment) is an external
//! collaborator; this module only owns the packed memory layout a group of
//! `ntrees` decoded tables live in, mirroring
//! `BrotliDecoderHuffmanTreeGroupInit`'s single allocation.

use std::mem;
use std::slice;

use crate::alloc::{BrotliAlloc, RawBuffer};
use crate::error::{BrotliError, Result};

/// One entry of a canonical Huffman decode table. Table *contents* are
/// populated by the external construction algorithm; this crate only
/// allocates and indexes the storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HuffmanCode {
    pub bits: u8,
    pub value: u16,
}

/// Stand-in for brotli's published `kMaxHuffmanTableSize` lookup, which
/// belongs to the externally-owned Huffman table construction machinery.
/// Keeps the same 32-symbol bucket shape (`(alphabet_size_limit + 31) >> 5`)
/// without claiming to reproduce the exact published constants: a canonical
/// decode table never needs more than twice its alphabet size, plus headroom
/// for the longest code in a bucket of that width.
#[must_use]
pub fn max_table_size(alphabet_size_limit: u16) -> usize {
    let bucket = (alphabet_size_limit as usize + 31) >> 5;
    bucket * 64 + 32
}

/// A group of `ntrees` Huffman decode tables sharing one packed allocation:
/// an offset array (one `usize` per tree) followed immediately by the
/// `ntrees * max_table_size` code table.
pub struct HuffmanTreeGroup {
    alphabet_size_max: u16,
    alphabet_size_limit: u16,
    num_htrees: u16,
    max_table_size: usize,
    /// Byte length of the leading offset array; the code table begins here.
    codes_byte_offset: usize,
    storage: RawBuffer<u8>,
}

impl HuffmanTreeGroup {
    pub fn init(
        alloc: BrotliAlloc,
        alphabet_size_max: u16,
        alphabet_size_limit: u16,
        ntrees: u16,
    ) -> Result<Self> {
        let table_size = max_table_size(alphabet_size_limit);
        let ntrees_usize = ntrees as usize;
        let codes_byte_offset = ntrees_usize
            .checked_mul(mem::size_of::<usize>())
            .ok_or(BrotliError::CapacityOverflow)?;
        let code_table_len = ntrees_usize
            .checked_mul(table_size)
            .ok_or(BrotliError::CapacityOverflow)?;
        let code_table_bytes = code_table_len
            .checked_mul(mem::size_of::<HuffmanCode>())
            .ok_or(BrotliError::CapacityOverflow)?;
        let total_bytes = codes_byte_offset
            .checked_add(code_table_bytes)
            .ok_or(BrotliError::CapacityOverflow)?;

        let mut storage = RawBuffer::<u8>::alloc(alloc, total_bytes)?;
        {
            let bytes = storage.as_mut_slice();
            for i in 0..ntrees_usize {
                let offset = i * table_size;
                let start = i * mem::size_of::<usize>();
                bytes[start..start + mem::size_of::<usize>()]
                    .copy_from_slice(&offset.to_ne_bytes());
            }
        }

        Ok(Self {
            alphabet_size_max,
            alphabet_size_limit,
            num_htrees: ntrees,
            max_table_size: table_size,
            codes_byte_offset,
            storage,
        })
    }

    #[must_use]
    pub fn alphabet_size_max(&self) -> u16 {
        self.alphabet_size_max
    }

    #[must_use]
    pub fn alphabet_size_limit(&self) -> u16 {
        self.alphabet_size_limit
    }

    #[must_use]
    pub fn num_htrees(&self) -> u16 {
        self.num_htrees
    }

    #[must_use]
    pub fn max_table_size(&self) -> usize {
        self.max_table_size
    }

    /// The offset (into [`Self::codes`]) of each tree's code table. Exists
    /// mainly so the packing invariant is directly testable:
    /// `codes_byte_offset == htrees().len() * size_of::<usize>()`.
    #[must_use]
    pub fn htrees(&self) -> &[usize] {
        if self.num_htrees == 0 {
            return &[];
        }
        let bytes = self.storage.as_slice();
        // SAFETY: `bytes` is at least `codes_byte_offset` bytes long and the
        // allocator guarantees alignment sufficient for `usize` (see
        // alloc.rs); every `usize` in this range was written by `init`.
        unsafe { slice::from_raw_parts(bytes.as_ptr().cast::<usize>(), self.num_htrees as usize) }
    }

    #[must_use]
    pub fn codes(&self) -> &[HuffmanCode] {
        let len = self.num_htrees as usize * self.max_table_size;
        if len == 0 {
            return &[];
        }
        let bytes = self.storage.as_slice();
        // SAFETY: `bytes.len() == codes_byte_offset + len * size_of::<HuffmanCode>()`
        // by construction in `init`.
        unsafe {
            let ptr = bytes.as_ptr().add(self.codes_byte_offset);
            slice::from_raw_parts(ptr.cast::<HuffmanCode>(), len)
        }
    }

    #[must_use]
    pub fn codes_mut(&mut self) -> &mut [HuffmanCode] {
        let len = self.num_htrees as usize * self.max_table_size;
        if len == 0 {
            return &mut [];
        }
        let offset = self.codes_byte_offset;
        let bytes = self.storage.as_mut_slice();
        // SAFETY: see `codes`.
        unsafe {
            let ptr = bytes.as_mut_ptr().add(offset);
            slice::from_raw_parts_mut(ptr.cast::<HuffmanCode>(), len)
        }
    }

    /// The `index`-th tree's code table (`self.max_table_size` entries).
    #[must_use]
    pub fn tree(&self, index: u16) -> &[HuffmanCode] {
        let offset = index as usize * self.max_table_size;
        &self.codes()[offset..offset + self.max_table_size]
    }

    #[must_use]
    pub fn tree_mut(&mut self, index: u16) -> &mut [HuffmanCode] {
        let offset = index as usize * self.max_table_size;
        let table_size = self.max_table_size;
        &mut self.codes_mut()[offset..offset + table_size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_allocation_layout_invariant() {
        let group = HuffmanTreeGroup::init(BrotliAlloc::default(), 256, 256, 3).unwrap();
        assert_eq!(group.htrees().len(), 3);
        assert_eq!(
            group.codes_byte_offset,
            group.htrees().len() * mem::size_of::<usize>()
        );
        // Offsets are monotonically spaced by max_table_size, mirroring the
        // C source's `htrees[i] = codes + i * max_table_size` layout.
        for (i, &off) in group.htrees().iter().enumerate() {
            assert_eq!(off, i * group.max_table_size());
        }
    }

    #[test]
    fn tree_accessors_are_disjoint_and_sized() {
        let mut group = HuffmanTreeGroup::init(BrotliAlloc::default(), 18, 18, 4).unwrap();
        for i in 0..4u16 {
            let t = group.tree_mut(i);
            assert_eq!(t.len(), group.max_table_size);
            t[0] = HuffmanCode { bits: i as u8, value: i };
        }
        for i in 0..4u16 {
            assert_eq!(group.tree(i)[0].bits, i as u8);
        }
    }

    #[test]
    fn zero_trees_never_allocates() {
        let group = HuffmanTreeGroup::init(BrotliAlloc::default(), 4, 4, 0).unwrap();
        assert!(group.htrees().is_empty());
        assert!(group.codes().is_empty());
    }
}
