//! The encoder's three-way block splitter and its generic, non-clustering
//! stand-in splitter.

use crate::command::{Command, EncoderParams};
use crate::error::{BrotliError, Result};

/// The encoder-side block split: `lengths[i]` is a symbol count, not an
/// absolute position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSplit {
    types: Vec<u8>,
    lengths: Vec<u32>,
    num_types: usize,
}

impl BlockSplit {
    #[must_use]
    pub fn from_parts(types: Vec<u8>, lengths: Vec<u32>, num_types: usize) -> Self {
        debug_assert_eq!(types.len(), lengths.len());
        Self {
            types,
            lengths,
            num_types,
        }
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn types(&self) -> &[u8] {
        &self.types
    }

    #[must_use]
    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    #[must_use]
    pub fn num_types(&self) -> usize {
        self.num_types
    }

    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.lengths.iter().map(|&l| u64::from(l)).sum()
    }
}

/// The tunable constants named for each of the three splitter passes.
/// `ReferenceSplitter` only consults `stride_length`; the rest are carried
/// so a real clustering splitter is a drop-in replacement.
#[derive(Debug, Clone, Copy)]
pub struct SplitParams {
    pub symbols_per_histogram: usize,
    pub max_histograms: usize,
    pub stride_length: usize,
    pub block_switch_cost: f64,
}

/// Stands in for "the generic splitter": assigns symbols to
/// `stride_length`-sized blocks and cycles block types modulo
/// `max_histograms`, with no histogram-cost clustering whatsoever.
pub trait Histogrammable<Symbol> {
    fn split(&self, symbols: &[Symbol], params: &SplitParams) -> BlockSplit;
}

pub struct ReferenceSplitter;

impl<Symbol> Histogrammable<Symbol> for ReferenceSplitter {
    fn split(&self, symbols: &[Symbol], params: &SplitParams) -> BlockSplit {
        let n = symbols.len();
        if n == 0 {
            return BlockSplit::from_parts(Vec::new(), Vec::new(), 0);
        }
        let stride = params.stride_length.max(1);
        let num_blocks = n.div_ceil(stride);
        let num_types = num_blocks.min(params.max_histograms.max(1));

        let mut types = Vec::with_capacity(num_blocks);
        let mut lengths = Vec::with_capacity(num_blocks);
        let mut remaining = n;
        for i in 0..num_blocks {
            types.push((i % num_types) as u8);
            let len = remaining.min(stride);
            lengths.push(len as u32);
            remaining -= len;
        }
        BlockSplit::from_parts(types, lengths, num_types)
    }
}

fn literal_split_params(params: &EncoderParams) -> SplitParams {
    SplitParams {
        symbols_per_histogram: 544,
        max_histograms: if params.quality >= 11 { 100 } else { 10 },
        stride_length: 2000,
        block_switch_cost: 400.0,
    }
}

fn command_split_params(_params: &EncoderParams) -> SplitParams {
    SplitParams {
        symbols_per_histogram: 1080,
        max_histograms: 10,
        stride_length: 4000,
        block_switch_cost: 400.0,
    }
}

fn distance_split_params(_params: &EncoderParams) -> SplitParams {
    SplitParams {
        symbols_per_histogram: 544,
        max_histograms: 10,
        stride_length: 2000,
        block_switch_cost: 400.0,
    }
}

/// `CountLiterals`.
fn count_literals(cmds: &[Command]) -> u64 {
    cmds.iter().map(|c| u64::from(c.insert_len)).sum()
}

/// `CopyLiteralsToByteArray`: walks the command stream, copying each
/// command's inserted literal bytes out of the ringbuffer `data` (splitting
/// the copy across the wrap boundary when needed).
fn copy_literals_to_byte_array(
    cmds: &[Command],
    data: &[u8],
    pos: usize,
    mask: usize,
    literals_count: usize,
) -> Vec<u8> {
    let ring_size = mask + 1;
    let mut out = Vec::with_capacity(literals_count);
    let mut from_pos = pos & mask;
    for cmd in cmds {
        let insert_len = cmd.insert_len as usize;
        if insert_len > 0 {
            if from_pos + insert_len > ring_size {
                let first = ring_size - from_pos;
                out.extend_from_slice(&data[from_pos..from_pos + first]);
                out.extend_from_slice(&data[0..insert_len - first]);
            } else {
                out.extend_from_slice(&data[from_pos..from_pos + insert_len]);
            }
        }
        from_pos = (from_pos + insert_len + cmd.copy_len() as usize) % ring_size;
    }
    out
}

/// The reconciliation branch, operating on a clone of `stored`'s
/// lengths/types so a `ReconciliationExhausted` failure never touches the
/// caller's copy.
fn reconcile_literal_split(stored: &BlockSplit, literals_count: u64) -> Result<BlockSplit> {
    let mut lengths = stored.lengths.clone();
    let mut types = stored.types.clone();
    let stored_count: u64 = lengths.iter().map(|&l| u64::from(l)).sum();

    if literals_count < stored_count {
        let mut deficit = stored_count - literals_count;
        while lengths.len() > 1 && u64::from(*lengths.last().unwrap()) <= deficit {
            deficit -= u64::from(lengths.pop().unwrap());
            types.pop();
        }
        let last_len = u64::from(*lengths.last().unwrap());
        if deficit >= last_len {
            log::warn!(
                "literal reconciliation deficit {deficit} consumes the entire remaining stored split"
            );
            return Err(BrotliError::ReconciliationExhausted);
        }
        *lengths.last_mut().unwrap() = (last_len - deficit) as u32;
    } else if literals_count > stored_count {
        let surplus = (literals_count - stored_count) as u32;
        if let Some(last) = lengths.last_mut() {
            *last += surplus;
        }
    }

    Ok(BlockSplit::from_parts(types, lengths, stored.num_types))
}

pub struct SplitBlockOutput {
    pub literal: BlockSplit,
    pub insert_copy: BlockSplit,
    pub distance: BlockSplit,
}

/// The encoder's three-way split. `current_metablock` indexes
/// `stored_lit_splits`; it is only advanced along the reconciliation path,
/// matching the original's "only consumed when actually reconciled"
/// bookkeeping.
pub fn split_block(
    cmds: &[Command],
    data: &[u8],
    pos: usize,
    mask: usize,
    params: &EncoderParams,
    stored_lit_splits: &[BlockSplit],
    metablocks_count: usize,
    current_metablock: &mut usize,
) -> Result<SplitBlockOutput> {
    let literals_count = count_literals(cmds);
    let literal_bytes =
        copy_literals_to_byte_array(cmds, data, pos, mask, literals_count as usize);

    let no_stored_split = metablocks_count == 0
        || stored_lit_splits
            .get(*current_metablock)
            .map_or(true, |s| s.num_blocks() == 0);

    let literal = if no_stored_split {
        ReferenceSplitter.split(&literal_bytes, &literal_split_params(params))
    } else {
        let reconciled =
            reconcile_literal_split(&stored_lit_splits[*current_metablock], literals_count)?;
        *current_metablock += 1;
        reconciled
    };

    let cmd_prefixes: Vec<u16> = cmds.iter().map(|c| c.cmd_prefix).collect();
    let insert_copy = ReferenceSplitter.split(&cmd_prefixes, &command_split_params(params));

    let dist_prefixes: Vec<u16> = cmds
        .iter()
        .filter(|c| c.has_distance())
        .map(|c| c.dist_prefix & 0x3FF)
        .collect();
    let distance = ReferenceSplitter.split(&dist_prefixes, &distance_split_params(params));

    Ok(SplitBlockOutput {
        literal,
        insert_copy,
        distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(lengths: &[u32]) -> BlockSplit {
        let types = (0..lengths.len() as u8).collect();
        BlockSplit::from_parts(types, lengths.to_vec(), lengths.len())
    }

    #[test]
    fn reconciliation_deficit_shortens_last_block() {
        let s = stored(&[100, 50, 30]);
        let out = reconcile_literal_split(&s, 177).unwrap();
        assert_eq!(out.lengths(), &[100, 50, 27]);
        assert_eq!(out.num_blocks(), 3);
    }

    #[test]
    fn reconciliation_deficit_drops_whole_trailing_block() {
        let s = stored(&[100, 50, 30]);
        let out = reconcile_literal_split(&s, 120).unwrap();
        assert_eq!(out.lengths(), &[100, 20]);
        assert_eq!(out.num_blocks(), 2);
    }

    #[test]
    fn reconciliation_surplus_extends_last_block() {
        let s = stored(&[100, 50, 30]);
        let out = reconcile_literal_split(&s, 185).unwrap();
        assert_eq!(out.lengths(), &[100, 50, 35]);
        assert_eq!(out.num_blocks(), 3);
    }

    #[test]
    fn reconciliation_total_exhaustion_is_reported() {
        let s = stored(&[10]);
        let err = reconcile_literal_split(&s, 0).unwrap_err();
        assert_eq!(err, BrotliError::ReconciliationExhausted);
        // `s` itself must be untouched.
        assert_eq!(s.lengths(), &[10]);
    }

    #[test]
    fn reference_splitter_cycles_types_modulo_max_histograms() {
        let params = SplitParams {
            symbols_per_histogram: 10,
            max_histograms: 2,
            stride_length: 4,
            block_switch_cost: 0.0,
        };
        let symbols = [0u8; 10];
        let split = ReferenceSplitter.split(&symbols, &params);
        assert_eq!(split.lengths(), &[4, 4, 2]);
        assert_eq!(split.types(), &[0, 1, 0]);
        assert_eq!(split.num_types(), 2);
    }

    #[test]
    fn copy_literals_splits_across_ring_wrap() {
        let data = (0u8..16).collect::<Vec<_>>();
        let mask = 15; // ring size 16
        let cmds = [Command::new(6, 0, 0, 0)];
        // from_pos starts at 12, so insert_len 6 wraps: bytes 12..16 then 0..2.
        let out = copy_literals_to_byte_array(&cmds, &data, 12, mask, 6);
        assert_eq!(out, vec![12, 13, 14, 15, 0, 1]);
    }

    #[test]
    fn no_stored_split_falls_back_to_generic_splitter() {
        let cmds = [Command::new(5, 0, 0, 0)];
        let data = vec![0u8; 8];
        let params = EncoderParams::default();
        let mut current = 0;
        let out = split_block(&cmds, &data, 0, 7, &params, &[], 0, &mut current).unwrap();
        assert_eq!(out.literal.total_length(), 5);
        assert_eq!(current, 0, "generic fallback never advances current_metablock");
    }
}
