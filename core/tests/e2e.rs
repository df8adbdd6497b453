//! End-to-end scenarios from spec.md §8 that exercise the public facade
//! (`ParallelReader`) rather than any single component in isolation —
//! the integration-test counterpart to each module's own `#[cfg(test)]`
//! unit tests, in the style of `parallel_bzip2/tests/regression.rs`.

use std::io::Write;
use std::sync::Arc;

use bzcat_core::index::Index;
use bzcat_core::{Codec, ParallelReader, SeekFrom, TrailingGarbagePolicy};

fn compress_bzip2(data: &[u8]) -> Vec<u8> {
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    let mut enc = BzEncoder::new(Vec::new(), Compression::best());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn compress_gzip(data: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Deterministic pseudo-random bytes (xorshift64*), so a test run is
/// reproducible without pulling in a `rand` dependency nothing else in
/// this workspace needs.
fn pseudo_random(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

fn reader_over(compressed: Vec<u8>, codec: Codec, parallelism: usize) -> ParallelReader {
    ParallelReader::open(Arc::new(compressed), codec, parallelism, TrailingGarbagePolicy::Warn).unwrap()
}

fn read_all(r: &mut ParallelReader) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = r.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[test]
fn scenario_1_empty_bzip2() {
    let compressed = compress_bzip2(b"");
    let mut r = reader_over(compressed, Codec::Bzip2, 2);
    assert_eq!(r.size().unwrap(), 0);
    assert!(r.eof() || r.read(&mut [0u8; 1]).unwrap() == 0);
    let offsets = r.block_offsets().unwrap();
    assert_eq!(offsets.iter().filter(|b| b.is_eos()).count(), 1);
}

#[test]
fn scenario_2_two_byte_bzip2() {
    let compressed = compress_bzip2(b"AB");
    let mut r = reader_over(compressed, Codec::Bzip2, 2);
    let mut buf = [0u8; 4];
    let n = r.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"AB");
    let offsets = r.block_offsets().unwrap();
    assert_eq!(offsets.iter().filter(|b| !b.is_eos()).count(), 1);
    assert_eq!(offsets.iter().filter(|b| b.is_eos()).count(), 1);
}

#[test]
fn scenario_3_concatenated_bzip2_streams() {
    let a = pseudo_random(1000, 1);
    let b = pseudo_random(1000, 2);
    let mut combined = compress_bzip2(&a);
    combined.extend(compress_bzip2(&b));
    let mut r = reader_over(combined, Codec::Bzip2, 4);
    let out = read_all(&mut r);
    let mut expected = a.clone();
    expected.extend(b.clone());
    assert_eq!(out, expected);

    // Reading straight across the 1000-byte stream boundary in one call
    // returns the correct bytes from both streams.
    let compressed = {
        let mut c = compress_bzip2(&a);
        c.extend(compress_bzip2(&b));
        c
    };
    let mut r2 = reader_over(compressed, Codec::Bzip2, 4);
    r2.seek(SeekFrom::Start(990)).unwrap();
    let mut buf = [0u8; 20];
    let n = r2.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], &expected[990..990 + n]);
}

#[test]
fn scenario_4_random_seek_over_1mib() {
    let payload = pseudo_random(1024 * 1024, 42);
    let compressed = compress_bzip2(&payload);
    let mut r = reader_over(compressed, Codec::Bzip2, 4);

    // Finalize the map with a full sequential read first.
    let out = read_all(&mut r);
    assert_eq!(out, payload);

    for s in [0usize, 1, 32_768, 524_287, 999_999] {
        r.seek(SeekFrom::Start(s as u64)).unwrap();
        let mut one = [0u8; 1];
        r.read(&mut one).unwrap();
        assert_eq!(one[0], payload[s], "mismatch at offset {s}");
    }
}

#[test]
fn scenario_5_parallel_equivalence() {
    let payload = pseudo_random(1024 * 1024, 7);
    let compressed = compress_bzip2(&payload);

    let mut reference_offsets = None;
    for parallelism in [1usize, 2, 8] {
        let mut r = reader_over(compressed.clone(), Codec::Bzip2, parallelism);
        let out = read_all(&mut r);
        assert_eq!(out, payload, "byte mismatch at parallelism={parallelism}");

        let offsets = r.block_offsets().unwrap();
        match &reference_offsets {
            None => reference_offsets = Some(offsets),
            Some(reference) => assert_eq!(&offsets, reference, "block map mismatch at parallelism={parallelism}"),
        }
    }
}

#[test]
fn scenario_6_gzip_index_import_round_trip() {
    let payload = pseudo_random(3 * 1024 * 1024, 99);
    let compressed = compress_gzip(&payload);

    let mut original = reader_over(compressed.clone(), Codec::Gzip, 4);
    let out = read_all(&mut original);
    assert_eq!(out, payload);
    let entries = original.block_offsets().unwrap();

    let mut buf = Vec::new();
    Index::from_block_offsets(&entries, 4 * 1024 * 1024, compressed.len() as u64)
        .write(&mut buf)
        .unwrap();

    let imported_index = Index::read(&mut std::io::Cursor::new(buf)).unwrap();
    let imported_entries = imported_index.to_block_offsets().unwrap();

    let mut reopened = reader_over(compressed, Codec::Gzip, 4);
    reopened.set_block_offsets(imported_entries).unwrap();

    for s in [0usize, 1, 100_000, payload.len() - 1] {
        reopened.seek(SeekFrom::Start(s as u64)).unwrap();
        let mut one = [0u8; 1];
        reopened.read(&mut one).unwrap();
        assert_eq!(one[0], payload[s], "mismatch at offset {s}");
    }
}

#[test]
fn bitreader_seek_round_trip_matches_raw_bit_counting() {
    use bzcat_core::bit_order::Msb;
    use bzcat_core::bit_reader::{BitReader, SeekFrom as BitSeekFrom};
    use bzcat_core::byte_source::SliceSource;

    let data: Arc<[u8]> = Arc::from(pseudo_random(256, 5));
    let mut seeking: BitReader<Msb> = BitReader::new(Box::new(SliceSource::new(data.clone())), 64);

    for target_bit in [0u64, 1, 7, 8, 9, 500, 1000, 2000] {
        let mut advancing: BitReader<Msb> = BitReader::new(Box::new(SliceSource::new(data.clone())), 64);
        for _ in 0..target_bit {
            advancing.read(1).unwrap();
        }
        seeking.seek(BitSeekFrom::Start(target_bit)).unwrap();
        assert_eq!(advancing.read(5).unwrap(), seeking.read(5).unwrap(), "mismatch at bit {target_bit}");
    }
}

/// `SharedFileReader` (C2) over a real on-disk file rather than an
/// in-memory slice — the case `ParallelReader::open`'s generic `T:
/// AsRef<[u8]>` bound never exercises, since a plain, non-`mmap`ed file
/// handle has no such view.
#[test]
fn shared_file_reader_clones_serve_independent_positions_over_a_real_file() {
    use bzcat_core::byte_source::{ByteSource, SharedFileReader};
    use std::fs::File;
    use std::io::Read as _;

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"the quick brown fox jumps over the lazy dog").unwrap();
    tmp.flush().unwrap();

    let file = File::open(tmp.path()).unwrap();
    let mut a = SharedFileReader::new(file, true).unwrap();
    let mut b = a.try_clone().unwrap();

    let mut buf_a = [0u8; 9];
    a.read(&mut buf_a).unwrap();
    assert_eq!(&buf_a, b"the quick");

    b.seek(16).unwrap();
    let mut buf_b = [0u8; 5];
    b.read(&mut buf_b).unwrap();
    assert_eq!(&buf_b, b"jumps");

    // `a`'s own position resumes right after what it already read,
    // undisturbed by `b`'s seek over the shared file handle.
    let mut buf_a2 = [0u8; 1];
    a.read(&mut buf_a2).unwrap();
    assert_eq!(&buf_a2, b" ");
}
