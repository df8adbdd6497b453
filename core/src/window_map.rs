//! C8 — WindowMap: gzip-only table from a chunk's encoded offset to the
//! trailing decompressed window needed to seed its deflate dictionary
//! (spec.md §4.8).
//!
//! At the gzip-member decode granularity chosen for this crate (see
//! `SPEC_FULL.md` §2 — each independently decodable unit is already a
//! full gzip member with its own header, so there is no mid-deflate-block
//! dictionary to carry across a split), entries in practice always carry
//! an empty window. The type is still implemented to the full contract
//! so a future move to mid-block splitting (closer to `rapidgzip`'s
//! `WindowMap`, see `original_source/src/rapidgzip/WindowMap.hpp`) is a
//! pure addition, not a rewrite.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{CoreError, Result};

/// The trailing bytes of decoded output immediately preceding a chunk,
/// used to prime the next chunk's deflate dictionary. `Arc` so clones
/// are cheap when the same window backs multiple lookups.
pub type Window = Arc<Vec<u8>>;

pub struct WindowMap {
    entries: RwLock<HashMap<u64, Window>>,
}

impl WindowMap {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a window for `encoded_offset_bits` if absent. Idempotent:
    /// inserting the same bytes again for the same offset is a no-op.
    /// Inserting *different* bytes for an offset already present is a
    /// `Usage` error (two windows disagreeing about the same chunk's
    /// preceding context indicates a genuine bug upstream).
    pub fn emplace(&self, encoded_offset_bits: u64, window: Window) -> Result<()> {
        let mut guard = self.entries.write().unwrap();
        match guard.get(&encoded_offset_bits) {
            Some(existing) if **existing == *window => Ok(()),
            Some(_) => Err(CoreError::usage(format!(
                "conflicting window for encoded offset {encoded_offset_bits}"
            ))),
            None => {
                guard.insert(encoded_offset_bits, window);
                Ok(())
            }
        }
    }

    pub fn get(&self, encoded_offset_bits: u64) -> Option<Window> {
        self.entries.read().unwrap().get(&encoded_offset_bits).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WindowMap {
    fn default() -> Self {
        Self::new()
    }
}
