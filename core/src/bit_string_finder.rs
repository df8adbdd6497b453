//! C3 — BitStringFinder: scans a byte source for a fixed bit pattern at
//! any bit alignment, using a precomputed shifted-pattern lookup table
//! (spec.md §3, §4.3).
//!
//! This replaces `kassoulet-bz2zstd`'s `Scanner`, which generated 8
//! byte-shifted variants of each magic and matched them with an
//! Aho-Corasick automaton (`parallel_bzip2/src/scanner.rs`). That
//! approach is specialized to exactly the two bzip2 magics known ahead
//! of time; spec.md's `BitStringFinder` is a general single-pattern
//! primitive (gzip member headers, bzip2 block/EOS magics, and index
//! validation probes all reuse it), so the lookup table here is built
//! from any caller-supplied `(pattern, width)` rather than the two
//! magics baked into `Scanner::new`. The core idea — precompute one
//! comparison per bit alignment so a single window test finds a match
//! regardless of alignment — is the same technique, generalized and
//! expressed as an explicit table instead of an automaton.

use crate::byte_source::ByteSource;
use crate::error::{CoreError, Result};

/// One `(shiftedValue, mask)` pair per possible bit alignment `s` within
/// a 64-bit window: `(window & mask) == shiftedValue` tests whether the
/// pattern starts at window-relative bit offset `s`.
struct ShiftedPatternLut {
    /// Indexed by alignment `s` in `0..=64-width`.
    entries: Vec<(u64, u64)>,
    width: u32,
}

impl ShiftedPatternLut {
    fn new(pattern: u64, width: u32) -> Self {
        let max_s = 64 - width;
        let mask_w: u64 = if width == 64 { !0 } else { (1u64 << width) - 1 };
        let mut entries = Vec::with_capacity(max_s as usize + 1);
        for s in 0..=max_s {
            let shift = 64 - s - width;
            let mask = mask_w << shift;
            let shifted_value = (pattern & mask_w) << shift;
            entries.push((shifted_value, mask));
        }
        Self { entries, width }
    }

    /// Smallest alignment `s >= min_s` at which the pattern matches
    /// `window`, if any.
    fn find_from(&self, window: u64, min_s: u32) -> Option<u32> {
        let max_s = 64 - self.width;
        if min_s > max_s {
            return None;
        }
        for s in min_s..=max_s {
            let (shifted_value, mask) = self.entries[s as usize];
            if (window & mask) == shifted_value {
                return Some(s);
            }
        }
        None
    }
}

/// Sequential scanner for a fixed `<=56`-bit pattern at arbitrary bit
/// alignment (spec.md §4.3).
pub struct BitStringFinder {
    source: Box<dyn ByteSource>,
    lut: ShiftedPatternLut,
    width: u32,
    /// Sliding 64-bit window over the most recently loaded stream bits.
    window: u64,
    /// Total bits pulled from the source into `window` so far (a
    /// multiple of 8); `window` holds bits `[loaded_bits - 64,
    /// loaded_bits)` once `loaded_bits >= 64`.
    loaded_bits: u64,
    /// Absolute bit offset below which every valid alignment has
    /// already been tested and, if matching, reported.
    searched_until: u64,
    source_exhausted: bool,
}

impl BitStringFinder {
    pub fn new(source: Box<dyn ByteSource>, pattern: u64, width: u32) -> Result<Self> {
        if width == 0 || width > 56 {
            return Err(CoreError::usage(format!(
                "pattern width {width} must be in 1..=56"
            )));
        }
        Ok(Self {
            source,
            lut: ShiftedPatternLut::new(pattern, width),
            width,
            window: 0,
            loaded_bits: 0,
            searched_until: 0,
            source_exhausted: false,
        })
    }

    /// The stream bit offset corresponding to the window's bit 63 (the
    /// oldest bit currently held), which may be negative before 64 bits
    /// have been loaded.
    #[inline]
    fn window_base(&self) -> i64 {
        self.loaded_bits as i64 - 64
    }

    fn refill(&mut self) {
        if self.source_exhausted {
            return;
        }
        // spec.md: load up to floor((64-w)/8) bytes per refill.
        let batch = ((64 - self.width) / 8).max(1);
        let mut byte = [0u8; 1];
        for _ in 0..batch {
            match self.source.read(&mut byte) {
                Ok(1) => {
                    self.window = (self.window << 8) | byte[0] as u64;
                    self.loaded_bits += 8;
                }
                _ => {
                    self.source_exhausted = true;
                    break;
                }
            }
        }
    }

    /// Smallest alignment that hasn't yet been tested, given how much
    /// real (non-padding) data has been loaded.
    fn min_untested_s(&self) -> u32 {
        let base = self.window_base();
        let from_watermark = if (self.searched_until as i64) > base {
            (self.searched_until as i64 - base) as u32
        } else {
            0
        };
        let from_real_data = if self.loaded_bits < 64 {
            (64 - self.loaded_bits) as u32
        } else {
            0
        };
        from_watermark.max(from_real_data)
    }

    /// Returns the next absolute bit offset at which the pattern
    /// occurs, MSB-first, or `None` once the source is exhausted and no
    /// further match exists. Calls are stateful; results are
    /// monotonically increasing.
    pub fn find(&mut self) -> Option<u64> {
        loop {
            let min_s = self.min_untested_s();
            if let Some(s) = self.lut.find_from(self.window, min_s) {
                let offset = (self.window_base() + s as i64) as u64;
                self.searched_until = offset + 1;
                return Some(offset);
            }

            if self.source_exhausted {
                return None;
            }
            self.refill();
        }
    }

    pub fn eof(&self) -> bool {
        self.source_exhausted && self.min_untested_s() > 64 - self.width
    }
}

/// One-off sequential scan for `pattern` starting no earlier than
/// `start_bit`, over a fresh clone of `source`. Used where a caller
/// already knows roughly where to look (e.g. the bzip2 EOS magic,
/// which immediately follows the last data block but isn't found by a
/// [`crate::block_finder::BlockFinder`] scanning only for the data-block
/// magic) rather than needing the full parallel scan.
///
/// `source` need not be positioned at `start_bit`; this seeks its own
/// clone to the containing byte and discards any match before
/// `start_bit` that the byte-granular restart incidentally exposes.
pub fn find_pattern_from(
    source: &dyn ByteSource,
    start_bit: u64,
    pattern: u64,
    width: u32,
) -> Result<Option<u64>> {
    let mut clone = source.try_clone().map_err(CoreError::Io)?;
    let byte_floor = start_bit / 8;
    clone.seek(byte_floor).map_err(CoreError::Io)?;
    let base_bit = byte_floor * 8;
    let mut finder = BitStringFinder::new(clone, pattern, width)?;
    loop {
        match finder.find() {
            Some(local) => {
                let absolute = base_bit + local;
                if absolute >= start_bit {
                    return Ok(Some(absolute));
                }
            }
            None => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::SliceSource;
    use std::sync::Arc;

    fn finder(data: &[u8], pattern: u64, width: u32) -> BitStringFinder {
        let data: Arc<[u8]> = Arc::from(data);
        BitStringFinder::new(Box::new(SliceSource::new(data)), pattern, width).unwrap()
    }

    #[test]
    fn finds_byte_aligned_pattern() {
        let mut f = finder(&[0x31, 0x41, 0x59, 0x26, 0x53, 0x59], 0x314159265359, 48);
        assert_eq!(f.find(), Some(0));
        assert_eq!(f.find(), None);
        assert!(f.eof());
    }

    #[test]
    fn finds_shifted_pattern() {
        let magic: u64 = 0x314159265359;
        let shift = 3;
        let val = (magic << 16) >> shift;
        let bytes = val.to_be_bytes();
        let mut f = finder(&bytes, magic, 48);
        assert_eq!(f.find(), Some(shift as u64));
    }

    #[test]
    fn results_strictly_increasing_across_multiple_matches() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x31, 0x41, 0x59, 0x26, 0x53, 0x59]);
        data.extend_from_slice(b"xx");
        data.extend_from_slice(&[0x31, 0x41, 0x59, 0x26, 0x53, 0x59]);
        let mut f = finder(&data, 0x314159265359, 48);
        let a = f.find().unwrap();
        let b = f.find().unwrap();
        assert!(a < b);
        assert_eq!(f.find(), None);
    }

    #[test]
    fn width_out_of_range_is_invalid_argument() {
        let data: Arc<[u8]> = Arc::from(&b""[..]);
        assert!(BitStringFinder::new(Box::new(SliceSource::new(data.clone())), 1, 0).is_err());
        assert!(BitStringFinder::new(Box::new(SliceSource::new(data)), 1, 57).is_err());
    }

    #[test]
    fn width_one_pattern_does_not_double_report_across_refill() {
        // All-ones stream with width-1 pattern `1`: every bit matches,
        // so results must be the dense sequence 0,1,2,... with no
        // duplicates or gaps introduced by the refill batching.
        let data = vec![0xFFu8; 32];
        let mut f = finder(&data, 1, 1);
        // 56 bits come from the first refill batch (7 bytes); push past
        // that so a second refill is exercised too.
        for expected in 0..60u64 {
            assert_eq!(f.find(), Some(expected));
        }
    }

    #[test]
    fn find_pattern_from_skips_earlier_match() {
        let magic: u64 = 0x314159265359;
        let mut data = vec![0u8; 16];
        data[0..6].copy_from_slice(&magic.to_be_bytes()[2..]);
        data[8..14].copy_from_slice(&magic.to_be_bytes()[2..]);
        let src: Arc<[u8]> = Arc::from(&data[..]);
        let source = SliceSource::new(src);
        let found = find_pattern_from(&source, 1, magic, 48).unwrap();
        assert_eq!(found, Some(64));
    }

    #[test]
    fn find_pattern_from_returns_none_past_end() {
        let data = vec![0u8; 8];
        let src: Arc<[u8]> = Arc::from(&data[..]);
        let source = SliceSource::new(src);
        assert_eq!(
            find_pattern_from(&source, 0, 0x314159265359, 48).unwrap(),
            None
        );
    }
}
