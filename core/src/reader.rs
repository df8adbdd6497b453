//! C14 — ParallelReader: the facade spec.md §4.14 describes, tying
//! `BlockMap` (C7), `BlockFinder` (C6) and `BlockFetcher` (C12) together
//! into a single `read`/`seek`-able random-access decompressed stream.
//!
//! No teacher equivalent (`parallel_bzip2::Bz2Decoder` only ever reads
//! forward once), so the `read` loop below follows spec.md §4.14's
//! pseudocode directly: grow the block map on demand, fetch through the
//! cache, copy the overlapping slice, advance. The supplemental pieces
//! — multi-stream probing and the `TrailingGarbagePolicy` it consults —
//! come from SPEC_FULL.md §2, grounded on the original's
//! `ParallelBZ2Reader.hpp`/`ParallelGzipReader.hpp`.

use std::sync::Arc;

use tracing::warn;

use crate::block_fetcher::{BlockFetcher, Codec};
use crate::block_finder::BlockFinder;
use crate::block_map::{BlockMap, BlockRecord};
use crate::byte_source::{ByteSource, SliceSource};
use crate::crc::bzip2_combine_stream_crc;
use crate::error::{CoreError, Result};
use crate::format::{BZIP2_BLOCK_MAGIC, GZIP_MAGIC};
use crate::parallel_bit_string_finder::ParallelBitStringFinder;

/// How the reader reacts to bytes that follow a stream's own
/// end-of-stream marker but don't look like the start of another
/// concatenated stream (spec.md §9's open question on invalid trailing
/// data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingGarbagePolicy {
    /// Log and stop scanning for further blocks; the stream still reads
    /// as everything decoded up to the garbage.
    Warn,
    /// Fail the read outright.
    Error,
}

/// Byte-granularity seek target, mirroring `std::io::SeekFrom` (the
/// bit-granularity `bit_reader::SeekFrom` is a different type, used one
/// layer down).
#[derive(Debug, Clone, Copy)]
pub enum SeekFrom {
    Start(u64),
    Current(i64),
    End(i64),
}

/// C14. Owns the growing `BlockMap` and the (swappable, on index
/// import) `BlockFinder`, and drives `BlockFetcher` to serve random-access
/// reads over the decompressed byte stream spec.md §4.14 describes.
pub struct ParallelReader {
    codec: Codec,
    block_map: BlockMap,
    block_finder: Arc<BlockFinder>,
    fetcher: BlockFetcher,
    position: u64,
    eof: bool,
    closed: bool,
    trailing_garbage_policy: TrailingGarbagePolicy,
    total_size_bits: u64,
    /// Running whole-stream CRC for the bzip2 stream currently being
    /// discovered, folded one data block at a time via
    /// `crc::bzip2_combine_stream_crc` and checked against the EOS
    /// block's own declared CRC (spec.md §4.13, §8). Reset to 0 whenever
    /// a new stream starts, so concatenated bzip2 streams each get their
    /// own fresh accumulation.
    bzip2_stream_crc: u32,
}

impl ParallelReader {
    /// Opens `data` (the whole compressed stream, held in memory — a
    /// `Vec<u8>`, `Arc<[u8]>`, or a `memmap2::Mmap`) for random-access
    /// decompression. `parallelism` controls both the decode thread pool
    /// and (divided by 8, per spec.md §4.4) the scanner's worker count.
    pub fn open<T>(
        data: Arc<T>,
        codec: Codec,
        parallelism: usize,
        trailing_garbage_policy: TrailingGarbagePolicy,
    ) -> Result<Self>
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        let parallelism = parallelism.max(1);
        let finder_parallelism = parallelism.div_ceil(8).max(1);
        let (pattern, width) = match codec {
            Codec::Bzip2 => (BZIP2_BLOCK_MAGIC, 48),
            Codec::Gzip => (GZIP_MAGIC as u64, 16),
        };
        let total_size_bits = data.as_ref().as_ref().len() as u64 * 8;

        let scan = ParallelBitStringFinder::new(data.clone(), pattern, width, finder_parallelism, 1 << 20)?;
        let block_finder = Arc::new(BlockFinder::new(scan));
        let source: Box<dyn ByteSource> = Box::new(SliceSource::new(data));
        let fetcher = BlockFetcher::new(source, codec, block_finder.clone(), parallelism);

        Ok(Self {
            codec,
            block_map: BlockMap::new(),
            block_finder,
            fetcher,
            position: 0,
            eof: false,
            closed: false,
            trailing_garbage_policy,
            total_size_bits,
            bzip2_stream_crc: 0,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CoreError::logic("operation on a closed reader"));
        }
        Ok(())
    }

    fn known_decoded_end(&self) -> u64 {
        self.block_map.back().map(|b| b.decoded_end_bytes()).unwrap_or(0)
    }

    /// Repeatedly discovers the next block until one contains
    /// `self.position`, or the map is finalized without reaching it.
    fn locate(&mut self) -> Result<Option<BlockRecord>> {
        loop {
            if let Some(info) = self.block_map.find_data_offset(self.position) {
                if info.contains(self.position) {
                    return Ok(Some(info));
                }
            }
            if self.advance_block_map()?.is_none() {
                return Ok(None);
            }
        }
    }

    /// Discovers and pushes exactly one more block (spec.md §4.14's
    /// `read` loop body): look up the next offset from the block finder,
    /// decode it through the fetcher, record it, and — for bzip2 — check
    /// whether an end-of-stream block immediately follows.
    fn advance_block_map(&mut self) -> Result<Option<BlockRecord>> {
        let next_idx = self.block_map.data_block_count();
        let Some(offset) = self.block_finder.get(next_idx, None) else {
            if self.block_map.back().is_none() {
                // No data block was ever found at all — e.g. a
                // zero-content bzip2 stream whose only block is the EOS
                // marker right after the stream header, which the
                // block-magic scanner never sees since its magic differs
                // from a data block's.
                self.probe_leading_eos()?;
            }
            self.block_map.finalize();
            return Ok(None);
        };

        let chunk = self.fetcher.get(offset, Some(next_idx as u64))?;
        self.block_map
            .push(chunk.encoded_offset_bits, chunk.encoded_size_bits, chunk.data.len() as u64)?;

        match self.codec {
            Codec::Bzip2 => {
                self.bzip2_stream_crc = bzip2_combine_stream_crc(self.bzip2_stream_crc, chunk.calculated_crc);
                let hdr = self
                    .fetcher
                    .read_block_header(chunk.encoded_offset_bits + chunk.encoded_size_bits)?;
                if hdr.is_end_of_stream {
                    if self.bzip2_stream_crc != hdr.expected_crc {
                        return Err(CoreError::format(format!(
                            "bzip2 stream CRC mismatch: expected {:08x}, calculated {:08x}",
                            hdr.expected_crc, self.bzip2_stream_crc
                        )));
                    }
                    self.bzip2_stream_crc = 0;
                    self.block_map
                        .push(hdr.encoded_offset_bits, hdr.encoded_size_bits, 0)?;
                    if hdr.is_end_of_file {
                        self.block_map.finalize();
                    } else {
                        self.probe_next_stream(hdr.encoded_offset_bits + hdr.encoded_size_bits)?;
                    }
                }
            }
            Codec::Gzip => {
                if chunk.is_end_of_file {
                    self.block_map.finalize();
                }
            }
        }

        Ok(self.block_map.find_data_offset(self.position))
    }

    /// Handles the zero-data-block bzip2 case: read the EOS block's
    /// header directly at the fixed offset right after the 32-bit stream
    /// header ("BZh" + level digit), since nothing found it by scanning.
    fn probe_leading_eos(&mut self) -> Result<()> {
        if self.codec != Codec::Bzip2 {
            return Ok(());
        }
        if self.total_size_bits < 32 {
            return Err(CoreError::format("bzip2 stream shorter than its own header"));
        }
        let hdr = self.fetcher.read_block_header(32)?;
        if hdr.is_end_of_stream {
            if hdr.expected_crc != 0 {
                return Err(CoreError::format(format!(
                    "bzip2 stream CRC mismatch: expected {:08x}, calculated 00000000",
                    hdr.expected_crc
                )));
            }
            self.block_map.push(hdr.encoded_offset_bits, hdr.encoded_size_bits, 0)?;
        }
        Ok(())
    }

    /// spec.md §6 / SPEC_FULL.md §2: after a bzip2 EOS block, decide
    /// whether another stream is concatenated right after it. Gzip
    /// doesn't need this — its member scanner already finds subsequent
    /// members unambiguously at this crate's member granularity, and a
    /// member's own `is_end_of_file` flag (computed from its footer's end
    /// byte against the source's length) already tells `advance_block_map`
    /// when to stop.
    fn probe_next_stream(&mut self, after_bit: u64) -> Result<()> {
        if after_bit >= self.total_size_bits {
            self.block_map.finalize();
            return Ok(());
        }
        let aligned_byte = after_bit.div_ceil(8);
        let mut probe = self.fetcher.open_source_clone()?;
        probe.seek(aligned_byte).map_err(CoreError::Io)?;
        let mut header = [0u8; 4];
        let n = probe.read(&mut header).map_err(CoreError::Io)?;

        if n == 0 {
            // Clean end of file: nothing follows at all.
            self.block_map.finalize();
            return Ok(());
        }
        let looks_like_stream_header =
            n == 4 && &header[0..3] == b"BZh" && (b'1'..=b'9').contains(&header[3]);
        if looks_like_stream_header {
            // A concatenated stream's own blocks are discovered by the
            // same global scanner; nothing further to do here.
            return Ok(());
        }

        match self.trailing_garbage_policy {
            TrailingGarbagePolicy::Warn => {
                warn!(byte_offset = aligned_byte, "trailing garbage after bzip2 stream; truncating block scan");
            }
            TrailingGarbagePolicy::Error => {
                return Err(CoreError::format(format!(
                    "trailing garbage after bzip2 stream at byte offset {aligned_byte}"
                )));
            }
        }
        self.truncate_block_finder();
        self.block_map.finalize();
        Ok(())
    }

    /// Rebuilds the block finder from only the offsets already confirmed
    /// good, so it stops chasing coincidental magic-like byte sequences
    /// inside trailing garbage.
    fn truncate_block_finder(&mut self) {
        let known: Vec<u64> = self
            .block_map
            .block_offsets()
            .into_iter()
            .filter(|b| !b.is_eos())
            .map(|b| b.encoded_offset_bits)
            .collect();
        let new_finder = Arc::new(BlockFinder::from_known_offsets(known));
        self.fetcher.reset_for_new_block_finder(new_finder.clone());
        self.block_finder = new_finder;
    }

    fn ensure_known_up_to(&mut self, target: u64) -> Result<()> {
        while !self.block_map.finalized() && self.known_decoded_end() < target {
            if self.advance_block_map()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Reads up to `buf.len()` decompressed bytes starting at the
    /// current position, returning how many were produced (`0` only at
    /// true end of stream). Mirrors `std::io::Read::read`'s contract but
    /// returns `CoreError` instead of `io::Error`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        let mut produced = 0usize;
        while produced < buf.len() {
            if self.eof {
                break;
            }
            let Some(info) = self.locate()? else {
                self.eof = true;
                break;
            };
            let chunk = self.fetcher.get(info.encoded_offset_bits, None)?;
            let start = (self.position - info.decoded_offset_bytes) as usize;
            let n = (chunk.data.len() - start).min(buf.len() - produced);
            buf[produced..produced + n].copy_from_slice(&chunk.data[start..start + n]);
            produced += n;
            self.position += n as u64;
        }
        Ok(produced)
    }

    /// Moves the logical decoded-byte position. A forward seek past
    /// everything discovered so far grows the block map exactly as
    /// `read` would, without copying any bytes out.
    pub fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        self.ensure_open()?;
        let target: i128 = match from {
            SeekFrom::Start(o) => o as i128,
            SeekFrom::Current(d) => self.position as i128 + d as i128,
            SeekFrom::End(d) => self.size()? as i128 + d as i128,
        };
        if target < 0 {
            return Err(CoreError::usage("seek to a negative position"));
        }
        let target = target as u64;
        self.ensure_known_up_to(target)?;
        let known_end = self.known_decoded_end();
        self.position = target.min(known_end);
        self.eof = self.block_map.finalized() && target >= known_end;
        Ok(self.position)
    }

    /// Current decoded-byte position.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Best-effort encoded (compressed-bit) offset of the block
    /// currently containing `tell()`. Bzip2/gzip bit-addressability
    /// doesn't survive decoding below block granularity, so this names
    /// the containing block's start, not an exact bit within it.
    pub fn tell_compressed(&self) -> u64 {
        self.block_map
            .find_data_offset(self.position)
            .map(|info| info.encoded_offset_bits)
            .unwrap_or(0)
    }

    /// Total decompressed size. Forces a full read to the end if the
    /// block map isn't finalized yet (spec.md §4.14).
    pub fn size(&mut self) -> Result<u64> {
        self.ensure_open()?;
        self.ensure_known_up_to(u64::MAX)?;
        Ok(self.known_decoded_end())
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// The full block-offset table, forcing a full read if not yet
    /// finalized — the pair to `set_block_offsets` for persisting an
    /// index (spec.md §6).
    pub fn block_offsets(&mut self) -> Result<Vec<BlockRecord>> {
        self.ensure_open()?;
        self.ensure_known_up_to(u64::MAX)?;
        Ok(self.block_map.block_offsets())
    }

    /// A snapshot of whatever's been discovered so far, without forcing
    /// more decoding — useful for a progress indicator.
    pub fn available_block_offsets(&self) -> Vec<BlockRecord> {
        self.block_map.block_offsets()
    }

    /// Installs a block-offset table built elsewhere (typically imported
    /// from a `GZIDX` file via `crate::index`), replacing whatever this
    /// reader has discovered on its own. Drops the old block finder and
    /// the fetcher's cache, since offsets only make sense relative to the
    /// finder that produced them.
    pub fn set_block_offsets(&mut self, entries: Vec<BlockRecord>) -> Result<()> {
        self.ensure_open()?;
        if entries.is_empty() {
            return Err(CoreError::usage("cannot import an empty block-offset table"));
        }
        self.block_map.set_block_offsets(entries.clone())?;
        let non_eos: Vec<u64> = entries
            .iter()
            .filter(|b| !b.is_eos())
            .map(|b| b.encoded_offset_bits)
            .collect();
        let new_finder = Arc::new(BlockFinder::from_known_offsets(non_eos));
        self.fetcher.reset_for_new_block_finder(new_finder.clone());
        self.block_finder = new_finder;
        self.eof = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn compress_bzip2(data: &[u8]) -> Vec<u8> {
        let mut enc = BzEncoder::new(Vec::new(), Compression::best());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn compress_gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn bzip2_reader(compressed: Vec<u8>) -> ParallelReader {
        ParallelReader::open(Arc::new(compressed), Codec::Bzip2, 2, TrailingGarbagePolicy::Warn).unwrap()
    }

    #[test]
    fn empty_bzip2_stream_has_exactly_one_eos_entry() {
        let compressed = compress_bzip2(b"");
        let mut r = bzip2_reader(compressed);
        assert_eq!(r.size().unwrap(), 0);
        let offsets = r.block_offsets().unwrap();
        assert_eq!(offsets.iter().filter(|b| b.is_eos()).count(), 1);
        assert_eq!(offsets.iter().filter(|b| !b.is_eos()).count(), 0);
    }

    #[test]
    fn reads_small_bzip2_stream_fully() {
        let compressed = compress_bzip2(b"AB");
        let mut r = bzip2_reader(compressed);
        let mut buf = [0u8; 4];
        let n = r.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"AB");
        let n2 = r.read(&mut buf).unwrap();
        assert_eq!(n2, 0);
        assert!(r.eof());
    }

    #[test]
    fn reads_across_two_concatenated_bzip2_streams() {
        let mut combined = compress_bzip2(b"first stream contents");
        combined.extend(compress_bzip2(b"second stream contents"));
        let mut r = bzip2_reader(combined);
        let mut out = Vec::new();
        let mut buf = [0u8; 8];
        loop {
            let n = r.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"first stream contentssecond stream contents");
    }

    #[test]
    fn random_seek_after_full_sequential_read() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let compressed = compress_bzip2(&payload);
        let mut r = bzip2_reader(compressed);

        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = r.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, payload);

        r.seek(SeekFrom::Start(100)).unwrap();
        let mut tail = vec![0u8; 20];
        let n = r.read(&mut tail).unwrap();
        assert_eq!(&tail[..n], &payload[100..100 + n]);
    }

    #[test]
    fn parallel_equivalence_across_parallelism_levels() {
        let payload = b"abcdefghij".repeat(2000);
        let compressed = compress_bzip2(&payload);

        for parallelism in [1usize, 2, 8] {
            let mut r = ParallelReader::open(
                Arc::new(compressed.clone()),
                Codec::Bzip2,
                parallelism,
                TrailingGarbagePolicy::Warn,
            )
            .unwrap();
            let mut out = Vec::new();
            let mut buf = [0u8; 512];
            loop {
                let n = r.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            assert_eq!(out, payload, "mismatch at parallelism={parallelism}");
        }
    }

    #[test]
    fn corrupted_stream_crc_is_rejected_before_eof() {
        use crate::bit_string_finder::BitStringFinder;
        use crate::byte_source::SliceSource;
        use crate::format::BZIP2_EOS_MAGIC;

        let mut compressed = compress_bzip2(b"payload whose whole-stream crc we will corrupt");
        let eos_bit_offset = {
            let data: Arc<[u8]> = Arc::from(&compressed[..]);
            let mut finder = BitStringFinder::new(Box::new(SliceSource::new(data)), BZIP2_EOS_MAGIC, 48).unwrap();
            finder.find().unwrap()
        };
        // Flip one bit inside the EOS block's declared (whole-stream)
        // CRC, which immediately follows its 48-bit magic.
        let corrupt_bit = eos_bit_offset + 48 + 5;
        let byte_idx = (corrupt_bit / 8) as usize;
        let bit_in_byte = 7 - (corrupt_bit % 8);
        compressed[byte_idx] ^= 1 << bit_in_byte;

        let mut r = bzip2_reader(compressed);
        let mut buf = [0u8; 4096];
        let err = loop {
            match r.read(&mut buf) {
                Ok(0) => panic!("expected a stream CRC mismatch before EOF"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(err.to_string().contains("CRC"), "unexpected error: {err}");
    }

    #[test]
    fn reads_gzip_stream() {
        let compressed = compress_gzip(b"gzip facade round trip");
        let mut r = ParallelReader::open(Arc::new(compressed), Codec::Gzip, 2, TrailingGarbagePolicy::Warn).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 8];
        loop {
            let n = r.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"gzip facade round trip");
    }

    #[test]
    fn reads_two_concatenated_gzip_members() {
        let mut combined = compress_gzip(b"member one");
        combined.extend(compress_gzip(b"member two"));
        let mut r = ParallelReader::open(Arc::new(combined), Codec::Gzip, 2, TrailingGarbagePolicy::Warn).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 6];
        loop {
            let n = r.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"member onemember two");
    }

    #[test]
    fn import_and_use_a_block_offset_table() {
        let compressed = compress_bzip2(b"hello import world");
        let mut r = bzip2_reader(compressed.clone());
        let offsets = r.block_offsets().unwrap();

        // Open a second reader over the same bytes and overwrite its
        // self-discovered map with the one just exported, proving
        // `set_block_offsets` takes effect rather than the reader having
        // simply discovered the same blocks on its own.
        let mut imported = bzip2_reader(compressed);
        imported.set_block_offsets(offsets).unwrap();

        let mut out = vec![0u8; 64];
        let n = imported.read(&mut out).unwrap();
        assert_eq!(&out[..n], b"hello import world");
    }

    #[test]
    fn trailing_garbage_errors_under_error_policy() {
        let mut combined = compress_bzip2(b"valid stream");
        combined.extend_from_slice(b"\x00\x00\x00not a stream");
        let mut r = ParallelReader::open(
            Arc::new(combined),
            Codec::Bzip2,
            1,
            TrailingGarbagePolicy::Error,
        )
        .unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 8];
        let result = loop {
            match r.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) => break Err(e),
            }
        };
        assert!(result.is_err());
    }
}
