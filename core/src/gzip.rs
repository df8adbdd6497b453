//! C13 (gzip variant) — per-member gzip decoder (external collaborator
//! per spec.md §4.13, §6).
//!
//! SPEC_FULL.md §2 records the granularity decision: this crate locates
//! gzip *member* boundaries (each one a complete, independently
//! decodable `{header, deflate stream, CRC32, ISIZE}` unit, exactly as
//! multi-member output from `pigz`/`bgzip` already is) rather than
//! arbitrary mid-deflate-block boundaries. That means a member is always
//! decoded with its own fresh 32 KiB window — `WindowMap` entries at
//! this granularity are always empty — but the type stays in the public
//! surface so a future move to sub-member splitting is additive.
//!
//! No teacher equivalent (`kassoulet-bz2zstd` only ever handles bzip2);
//! grounded on RFC 1952 directly and on this crate's own
//! `crate::decoder` for the "bound the scratch buffer to the known
//! block span, decode into it, verify CRC" shape.

use std::io::Read;

use flate2::read::DeflateDecoder;

use crate::byte_source::ByteSource;
use crate::crc::gzip_crc32;
use crate::error::{CoreError, Result};
use crate::format::GZIP_MAGIC;

const FTEXT: u8 = 1 << 0;
const FHCRC: u8 = 1 << 1;
const FEXTRA: u8 = 1 << 2;
const FNAME: u8 = 1 << 3;
const FCOMMENT: u8 = 1 << 4;

/// What a peek at a member boundary reveals before the deflate body is
/// decoded: how long the header is, so the caller knows where the
/// deflate stream starts.
#[derive(Debug, Clone, Copy)]
pub struct GzipMemberHeader {
    pub encoded_offset_bytes: u64,
    pub header_size_bytes: u64,
}

fn read_exact_from(source: &mut dyn ByteSource, n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        let read = source.read(&mut buf[filled..]).map_err(CoreError::Io)?;
        if read == 0 {
            return Err(CoreError::boundary("eof while reading gzip member"));
        }
        filled += read;
    }
    Ok(buf)
}

/// Parses the fixed and optional header fields starting at
/// `offset_bytes`, returning the header's length. Used by
/// `BlockFetcher::read_block_header` (C12) the same way
/// `crate::decoder::read_block_header` is for bzip2.
pub fn read_member_header(
    source: &mut dyn ByteSource,
    offset_bytes: u64,
) -> Result<GzipMemberHeader> {
    source.seek(offset_bytes).map_err(CoreError::Io)?;
    let fixed = read_exact_from(source, 10)?;
    let magic = u16::from_be_bytes([fixed[0], fixed[1]]);
    if magic != GZIP_MAGIC {
        return Err(CoreError::format(format!(
            "bad gzip magic {magic:#06x} at byte offset {offset_bytes}"
        )));
    }
    if fixed[2] != crate::format::GZIP_CM_DEFLATE {
        return Err(CoreError::format(format!(
            "unsupported gzip compression method {}",
            fixed[2]
        )));
    }
    let flg = fixed[3];
    let mut len: u64 = 10;

    if flg & FEXTRA != 0 {
        let xlen_bytes = read_exact_from(source, 2)?;
        let xlen = u16::from_le_bytes([xlen_bytes[0], xlen_bytes[1]]) as u64;
        let _ = read_exact_from(source, xlen as usize)?;
        len += 2 + xlen;
    }
    if flg & FNAME != 0 {
        len += skip_cstring(source)?;
    }
    if flg & FCOMMENT != 0 {
        len += skip_cstring(source)?;
    }
    if flg & FHCRC != 0 {
        let _ = read_exact_from(source, 2)?;
        len += 2;
    }

    Ok(GzipMemberHeader {
        encoded_offset_bytes: offset_bytes,
        header_size_bytes: len,
    })
}

fn skip_cstring(source: &mut dyn ByteSource) -> Result<u64> {
    let mut n = 0u64;
    let mut byte = [0u8; 1];
    loop {
        let read = source.read(&mut byte).map_err(CoreError::Io)?;
        if read == 0 {
            return Err(CoreError::boundary("eof while skipping gzip string field"));
        }
        n += 1;
        if byte[0] == 0 {
            break;
        }
    }
    Ok(n)
}

/// A decoded gzip member (spec.md §3's "decoded chunk", gzip variant).
/// `markers` is always empty at this crate's member-level granularity
/// (see module docs); it stays in the struct so `WindowMap` integration
/// and a future mid-member splitter are additive rather than a rewrite.
pub struct DecodedMember {
    pub data: Vec<u8>,
    pub calculated_crc: u32,
    pub expected_crc: u32,
    pub expected_isize: u32,
}

/// Decodes the gzip member spanning `[start_byte, end_byte)` (`end_byte`
/// is either the next member's header offset, as located by the block
/// finder, or the file's end for the last member).
pub fn decode_member(
    source: &mut dyn ByteSource,
    start_byte: u64,
    end_byte: u64,
) -> Result<DecodedMember> {
    if end_byte < start_byte {
        return Err(CoreError::usage("member end offset precedes its start"));
    }
    let header = read_member_header(source, start_byte)?;
    source
        .seek(start_byte + header.header_size_bytes)
        .map_err(CoreError::Io)?;

    if end_byte - start_byte < header.header_size_bytes + 8 {
        return Err(CoreError::boundary("gzip member shorter than its framing"));
    }
    let body_len = (end_byte - start_byte - header.header_size_bytes - 8) as usize;
    let compressed = read_exact_from(source, body_len)?;
    let footer = read_exact_from(source, 8)?;
    let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let expected_isize = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);

    let mut decoder = DeflateDecoder::new(&compressed[..]);
    let mut data = Vec::with_capacity(compressed.len() * 3);
    decoder
        .read_to_end(&mut data)
        .map_err(|e| CoreError::format(format!("deflate decode failed: {e}")))?;

    let calculated_crc = gzip_crc32(&data);
    Ok(DecodedMember {
        data,
        calculated_crc,
        expected_crc,
        expected_isize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::SliceSource;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::sync::Arc;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn decodes_single_member_and_matches_crc() {
        let compressed = compress(b"the quick brown fox jumps over the lazy dog");
        let len = compressed.len() as u64;
        let data: Arc<[u8]> = Arc::from(&compressed[..]);
        let mut s = SliceSource::new(data);

        let header = read_member_header(&mut s, 0).unwrap();
        assert_eq!(header.header_size_bytes, 10);

        let member = decode_member(&mut s, 0, len).unwrap();
        assert_eq!(member.data, b"the quick brown fox jumps over the lazy dog");
        assert_eq!(member.calculated_crc, member.expected_crc);
        assert_eq!(member.expected_isize, member.data.len() as u32);
    }

    #[test]
    fn rejects_non_gzip_header() {
        let data: Arc<[u8]> = Arc::from(&b"not gzip"[..]);
        let mut s = SliceSource::new(data);
        assert!(read_member_header(&mut s, 0).is_err());
    }

    #[test]
    fn corrupted_member_crc_footer_fails_crc_check() {
        let mut compressed = compress(b"the quick brown fox jumps over the lazy dog");
        // Flip a bit in the trailing CRC32 field (the first 4 of the
        // footer's 8 bytes) — the compressed body decodes to the correct
        // bytes, but the declared CRC no longer matches them.
        let crc_byte = compressed.len() - 8;
        compressed[crc_byte] ^= 0x01;
        let len = compressed.len() as u64;
        let data: Arc<[u8]> = Arc::from(&compressed[..]);
        let mut s = SliceSource::new(data);

        let member = decode_member(&mut s, 0, len).unwrap();
        assert_ne!(member.calculated_crc, member.expected_crc);
    }

    #[test]
    fn two_concatenated_members_decode_independently() {
        let mut combined = compress(b"first member");
        let first_len = combined.len() as u64;
        combined.extend(compress(b"second member"));
        let total_len = combined.len() as u64;
        let data: Arc<[u8]> = Arc::from(&combined[..]);
        let mut s = SliceSource::new(data);

        let first = decode_member(&mut s, 0, first_len).unwrap();
        assert_eq!(first.data, b"first member");

        let second = decode_member(&mut s, first_len, total_len).unwrap();
        assert_eq!(second.data, b"second member");
    }
}
