#![no_main]

use std::sync::Arc;

use bzcat_core::format::BZIP2_BLOCK_MAGIC;
use bzcat_core::parallel_bit_string_finder::ParallelBitStringFinder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || data.len() > 4_000_000 {
        return;
    }

    let Ok(mut finder) = ParallelBitStringFinder::new(Arc::new(data.to_vec()), BZIP2_BLOCK_MAGIC, 48, 4, 65_536)
    else {
        return;
    };

    let max_bit = data.len() as u64 * 8;
    let mut previous = None;
    let mut count = 0;
    while let Some(offset) = finder.find() {
        assert!(offset < max_bit, "offset {offset} past end of {max_bit}-bit input");
        if let Some(prev) = previous {
            assert!(offset > prev, "offsets must be strictly increasing: {prev} then {offset}");
        }
        previous = Some(offset);

        count += 1;
        if count > 100_000 {
            break;
        }
    }
});
