//! Error taxonomy for the core (spec.md §7).
//!
//! Format/boundary/usage/logic errors are distinguished so callers can
//! tell a fatal corruption (`Format`) apart from a usage mistake
//! (`Usage`) or an internal invariant violation (`Logic`). Cancellation
//! is not represented here: it unwinds cleanly without an error, per §7.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// Invalid magic, CRC mismatch, bad Huffman table, out-of-range
    /// back-reference, non-zero padding in an uncompressed deflate block.
    /// Fatal for the chunk being decoded.
    #[error("format error: {0}")]
    Format(String),

    /// EOF encountered where the decoder (not the finder) required more
    /// data. Boundary errors are swallowed in the finder (treated as "no
    /// more data") but fatal here.
    #[error("unexpected end of stream: {0}")]
    Boundary(String),

    /// Invalid-argument class: seek out of range, push to a finalized
    /// map, non-monotonic offsets, conflicting window, etc.
    #[error("invalid argument: {0}")]
    Usage(String),

    /// Internal invariant violated (watermark inconsistency, prefetch
    /// map collision, chunk too large for cache). Indicates a bug.
    #[error("internal error: {0}")]
    Logic(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn format(msg: impl Into<String>) -> Self {
        CoreError::Format(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        CoreError::Usage(msg.into())
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        CoreError::Logic(msg.into())
    }

    pub fn boundary(msg: impl Into<String>) -> Self {
        CoreError::Boundary(msg.into())
    }
}
