use std::{error, fmt};

/// Errors surfaced by the decoder state, the block-split store, the Huffman
/// tree group allocator, and the encoder's block splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrotliError {
    /// The allocator returned null. Internal structures that were being
    /// grown are left exactly as they were before the call.
    OutOfMemory,
    /// A requested capacity could not be represented (`requested * 2`
    /// overflowed `usize`, or similar).
    CapacityOverflow,
    /// Reconciliation needed to drop more literals than the entire stored
    /// split contains. The original source treated this as unreachable;
    /// this crate reports it instead of underflowing.
    ReconciliationExhausted,
}

impl fmt::Display for BrotliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OutOfMemory => "allocator returned null",
            Self::CapacityOverflow => "requested capacity overflows usize",
            Self::ReconciliationExhausted => {
                "literal reconciliation deficit exceeds the entire stored split"
            }
        })
    }
}

impl error::Error for BrotliError {}

pub type Result<T> = std::result::Result<T, BrotliError>;
