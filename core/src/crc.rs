//! CRC verification for both formats (spec.md §4.13, §7).
//!
//! bzip2 uses a non-reflected CRC-32 (the "CRC-32/BZIP2" catalogue
//! variant: poly `0x04C11DB7`, init/xorout `0xFFFFFFFF`, no input/output
//! reflection, MSB-first table lookup) and combines per-block CRCs into
//! a whole-stream CRC via a left-rotate-then-xor recurrence. `crc32fast`
//! (already in the teacher's dependency closet by way of `zstd`'s
//! transitive needs, and commonly reached for directly elsewhere in the
//! ecosystem) only implements the standard *reflected* CRC-32 that gzip
//! uses, so it cannot serve bzip2's variant — hence the small hand-rolled
//! table here, built the same way `crc32fast`'s own non-SIMD fallback
//! table is: one entry per input byte, computed by simulating 8
//! bit-shifts against the polynomial.

/// Non-reflected CRC-32 table (bzip2's per-block and whole-stream CRC).
fn bzip2_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut c = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            c = if c & 0x8000_0000 != 0 {
                (c << 1) ^ 0x04C1_1DB7
            } else {
                c << 1
            };
            bit += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

/// Running bzip2-style CRC-32 accumulator. `finish()` applies the final
/// XOR; `new()` already carries the initial value, so
/// `Bzip2Crc::new().finish()` over zero bytes equals `0`.
pub struct Bzip2Crc {
    value: u32,
    table: [u32; 256],
}

impl Bzip2Crc {
    pub fn new() -> Self {
        Self {
            value: 0xFFFF_FFFF,
            table: bzip2_crc_table(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let idx = (((self.value >> 24) ^ byte as u32) & 0xFF) as usize;
            self.value = (self.value << 8) ^ self.table[idx];
        }
    }

    pub fn finish(&self) -> u32 {
        self.value ^ 0xFFFF_FFFF
    }
}

impl Default for Bzip2Crc {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds a block's own CRC into the running whole-stream CRC, per
/// bzip2's `combinedCRC = ((combinedCRC << 1) | (combinedCRC >> 31)) ^
/// blockCRC`.
pub fn bzip2_combine_stream_crc(stream_crc: u32, block_crc: u32) -> u32 {
    ((stream_crc << 1) | (stream_crc >> 31)) ^ block_crc
}

/// gzip's CRC-32 (the standard reflected variant) via `crc32fast`.
pub fn gzip_crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_crc_is_zero() {
        assert_eq!(Bzip2Crc::new().finish(), 0);
    }

    #[test]
    fn known_vector_matches_catalogue_check_value() {
        // CRC-32/BZIP2 catalogue check value: CRC of ASCII "123456789"
        // is 0xFC891918.
        let mut crc = Bzip2Crc::new();
        crc.update(b"123456789");
        assert_eq!(crc.finish(), 0xFC89_1918);
    }

    #[test]
    fn incremental_update_matches_single_call() {
        let mut a = Bzip2Crc::new();
        a.update(b"hello world");
        let mut b = Bzip2Crc::new();
        b.update(b"hello ");
        b.update(b"world");
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn gzip_crc32_matches_known_vector() {
        // Standard (reflected) CRC-32 of "123456789" is 0xCBF43926.
        assert_eq!(gzip_crc32(b"123456789"), 0xCBF4_3926);
    }
}
