#![no_main]

use bzcat_core::index::Index;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1_000_000 {
        return;
    }
    // A malformed GZIDX file must be rejected with a `CoreError`, never
    // panic or read past what `data` actually contains.
    let _ = Index::read(&mut std::io::Cursor::new(data));
});
