#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use bzcat_core::bit_order::Msb;
use bzcat_core::bit_reader::{BitReader, SeekFrom};
use bzcat_core::byte_source::SliceSource;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum FuzzSeek {
    Start(u64),
    Current(i64),
    End(i64),
    Read(u8),
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    data: Vec<u8>,
    ops: Vec<FuzzSeek>,
}

/// Drives an arbitrary sequence of seeks and small reads over
/// `BitReader` — the operations are expected to return `Ok`/`Err`
/// cleanly (an out-of-range seek is a usage error, not a panic) and
/// never violate `tell() <= size()`.
fuzz_target!(|input: FuzzInput| {
    if input.data.is_empty() || input.data.len() > 1_000_000 || input.ops.len() > 2_000 {
        return;
    }

    let data: Arc<[u8]> = Arc::from(input.data.as_slice());
    let mut reader: BitReader<Msb> = BitReader::new(Box::new(SliceSource::new(data)), 64);

    for op in input.ops {
        match op {
            FuzzSeek::Start(bits) => {
                let _ = reader.seek(SeekFrom::Start(bits));
            }
            FuzzSeek::Current(delta) => {
                let _ = reader.seek(SeekFrom::Current(delta));
            }
            FuzzSeek::End(delta) => {
                let _ = reader.seek(SeekFrom::End(delta));
            }
            FuzzSeek::Read(n) => {
                let n = (n % 64).max(1) as u32;
                let _ = reader.read(n);
            }
        }
        assert!(reader.tell() <= reader.size(), "cursor ran past the stream's own size");
    }
});
