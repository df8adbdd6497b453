#![no_main]

use std::sync::Arc;

use bzcat_core::{Codec, ParallelReader, TrailingGarbagePolicy};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || data.len() > 2_000_000 {
        return;
    }

    let Ok(mut reader) = ParallelReader::open(Arc::new(data.to_vec()), Codec::Bzip2, 2, TrailingGarbagePolicy::Warn)
    else {
        return;
    };

    let mut buf = [0u8; 8192];
    let mut produced = 0usize;
    const MAX_OUTPUT: usize = 50_000_000;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                produced += n;
                if produced > MAX_OUTPUT {
                    break;
                }
            }
            Err(_) => break, // expected for malformed input
        }
    }
});
