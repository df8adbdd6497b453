//! `bzcat_core` — random-access, parallel decompression of bzip2 and
//! (member-granularity) gzip streams.
//!
//! The public surface a caller actually drives is [`reader::ParallelReader`]
//! (C14); everything else is an internal component it composes, kept
//! `pub` at the crate root so the CLI, benches, and fuzz targets can each
//! exercise the layer they care about directly (e.g. the fuzz targets
//! hammer [`parallel_bit_string_finder`] and [`decoder`] in isolation,
//! without going through the whole facade).

pub mod bit_order;
pub mod bit_reader;
pub mod bit_string_finder;
pub mod block_fetcher;
pub mod block_finder;
pub mod block_map;
pub mod byte_source;
pub mod cache;
pub mod crc;
pub mod decoder;
pub mod error;
pub mod fetching_strategy;
pub mod format;
pub mod gzip;
pub mod index;
pub mod parallel_bit_string_finder;
pub mod reader;
pub mod streamed_results;
pub mod thread_pool;
pub mod window_map;

pub use block_fetcher::Codec;
pub use error::{CoreError, Result};
pub use format::Format;
pub use reader::{ParallelReader, SeekFrom, TrailingGarbagePolicy};
