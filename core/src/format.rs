//! Compressed-stream format detection (spec.md §6): bzip2's `BZh[1-9]`
//! magic vs. gzip's `\x1f\x8b`. Plain deflate/zlib are not auto-detected
//! (there is no magic to probe for); callers select them explicitly.

use crate::byte_source::ByteSource;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Bzip2,
    Gzip,
}

/// Block-start magic for bzip2 (pi in hex), MSB-first, 48 bits.
pub const BZIP2_BLOCK_MAGIC: u64 = 0x314159265359;
/// End-of-stream magic for bzip2 (sqrt(pi) in hex), MSB-first, 48 bits.
pub const BZIP2_EOS_MAGIC: u64 = 0x177245385090;

/// gzip member header magic (RFC 1952 §2.3.1): ID1=0x1f, ID2=0x8b.
pub const GZIP_MAGIC: u16 = 0x1f8b;
/// The only compression method RFC 1952 defines.
pub const GZIP_CM_DEFLATE: u8 = 8;

/// Probes the first bytes of `source` (without disturbing its position
/// beyond what it reads) to decide which format it holds.
pub fn detect(source: &mut dyn ByteSource) -> Result<Format> {
    let mut header = [0u8; 4];
    let n = source.read(&mut header).map_err(CoreError::Io)?;
    // Reset so the caller's own reader starts from byte 0 regardless of
    // what detection consumed.
    source.seek(0).map_err(CoreError::Io)?;
    if n >= 2 && header[0] == 0x1f && header[1] == 0x8b {
        return Ok(Format::Gzip);
    }
    if n >= 4 && &header[0..3] == b"BZh" && (b'1'..=b'9').contains(&header[3]) {
        return Ok(Format::Bzip2);
    }
    Err(CoreError::format("unrecognized compressed stream header"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::SliceSource;
    use std::sync::Arc;

    #[test]
    fn detects_bzip2_header() {
        let data: Arc<[u8]> = Arc::from(&b"BZh9rest-of-stream"[..]);
        let mut s = SliceSource::new(data);
        assert_eq!(detect(&mut s).unwrap(), Format::Bzip2);
    }

    #[test]
    fn detects_gzip_header() {
        let data: Arc<[u8]> = Arc::from(&[0x1f, 0x8b, 0x08, 0x00][..]);
        let mut s = SliceSource::new(data);
        assert_eq!(detect(&mut s).unwrap(), Format::Gzip);
    }

    #[test]
    fn rejects_garbage() {
        let data: Arc<[u8]> = Arc::from(&b"not a compressed stream"[..]);
        let mut s = SliceSource::new(data);
        assert!(detect(&mut s).is_err());
    }
}
