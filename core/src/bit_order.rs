//! Bit-order strategies used by [`crate::bit_reader::BitReader`].
//!
//! bzip2 is most-significant-bit-first; gzip/deflate (RFC 1951) is
//! least-significant-bit-first. Both share the refill/seek bookkeeping in
//! `BitReader`; only how a byte's bits land in the buffer and how a
//! value is extracted differs, so that bookkeeping is factored out here
//! instead of duplicated per format (spec.md §9: "Template specializations
//! for every bit width" is replaced by a single generic reader
//! parameterized over this trait instead of one type per width/order).

/// A zero-sized marker selecting how `BitReader` packs bits into its
/// internal buffer. `Msb` for bzip2, `Lsb` for gzip/deflate.
pub trait BitOrder: Send + Sync + 'static {
    /// Insert `byte`'s 8 bits into `buffer`, which already holds `valid`
    /// valid bits out of `width`. Caller guarantees `valid + 8 <= width`.
    fn push_byte(buffer: u64, valid: u32, width: u32, byte: u8) -> u64;

    /// Remove the next `n` valid bits from `buffer` (which holds at
    /// least `n` valid bits out of `width`), returning `(value, rest)`.
    /// `value`'s `n` low bits hold the extracted bits; bits above are
    /// zero.
    fn extract(buffer: u64, n: u32, width: u32) -> (u64, u64);

    /// Combine a read that had to be split in two because not enough
    /// buffer room was available to refill across the whole request in
    /// one pass (see `BitReader::read`): `hi`/`hi_len` were read first,
    /// `lo`/`lo_len` second.
    fn combine_split(hi: u64, hi_len: u32, lo: u64, lo_len: u32) -> u64;
}

/// Most-significant-bit-first packing (bzip2).
///
/// The buffer is conceptually right-padded: of its `width` bits, the
/// top `valid` bits hold unconsumed stream bits in original order (the
/// oldest unconsumed bit is the buffer's MSB). A read takes the top `n`
/// bits and shifts the rest back up to the top.
#[derive(Debug, Clone, Copy, Default)]
pub struct Msb;

impl BitOrder for Msb {
    #[inline]
    fn push_byte(buffer: u64, valid: u32, width: u32, byte: u8) -> u64 {
        debug_assert!(valid + 8 <= width);
        buffer | ((byte as u64) << (width - valid - 8))
    }

    #[inline]
    fn extract(buffer: u64, n: u32, width: u32) -> (u64, u64) {
        if n == 0 {
            return (0, buffer);
        }
        let value = buffer >> (width - n);
        let rest = if n == width { 0 } else { buffer << n };
        (value, rest)
    }

    #[inline]
    fn combine_split(hi: u64, hi_len: u32, lo: u64, lo_len: u32) -> u64 {
        (hi << lo_len) | lo
    }
}

/// Least-significant-bit-first packing (gzip/deflate, RFC 1951).
///
/// New bytes are stacked above existing valid bits; a read takes the
/// low `n` bits, which are always the earliest-read, not-yet-consumed
/// ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lsb;

impl BitOrder for Lsb {
    #[inline]
    fn push_byte(buffer: u64, valid: u32, width: u32, byte: u8) -> u64 {
        debug_assert!(valid + 8 <= width);
        buffer | ((byte as u64) << valid)
    }

    #[inline]
    fn extract(buffer: u64, n: u32, _width: u32) -> (u64, u64) {
        if n == 0 {
            return (0, buffer);
        }
        if n == 64 {
            (buffer, 0)
        } else {
            let mask = (1u64 << n) - 1;
            (buffer & mask, buffer >> n)
        }
    }

    #[inline]
    fn combine_split(hi: u64, hi_len: u32, lo: u64, lo_len: u32) -> u64 {
        hi | (lo << hi_len)
    }
}
