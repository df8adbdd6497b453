#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use bzcat_core::bit_order::Msb;
use bzcat_core::bit_reader::BitReader;
use bzcat_core::byte_source::SliceSource;
use bzcat_core::decoder::decode_block;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    data: Vec<u8>,
    start_bit: u64,
    end_bit: u64,
}

fuzz_target!(|input: FuzzInput| {
    if input.data.is_empty() || input.data.len() > 1_000_000 {
        return;
    }
    let max_bits = input.data.len() as u64 * 8;

    let start_bit = input.start_bit % (max_bits + 1);
    let end_bit = input.end_bit % (max_bits + 1);
    let (start_bit, end_bit) = if start_bit <= end_bit {
        (start_bit, end_bit)
    } else {
        (end_bit, start_bit)
    };

    let data: Arc<[u8]> = Arc::from(input.data.as_slice());
    let mut reader: BitReader<Msb> = BitReader::new(Box::new(SliceSource::new(data)), 64);
    // Should either decode, or surface a Format/Boundary/Usage error —
    // never panic regardless of how garbled the block span is.
    let _ = decode_block(&mut reader, start_bit, end_bit);
});
