//! Persisted block-offset index (spec.md §6, SPEC_FULL.md §2): the
//! `GZIDX` binary format, read and written with `byteorder` the way
//! `Devolutions-IronRDP`'s `ironrdp-graphics` crate frames its own wire
//! primitives field-by-field rather than deriving a `serde` codec for a
//! handful of fixed-width integers.
//!
//! A `GZIDX` file holds one [`IndexCheckpoint`] per known block boundary
//! (the last one implicitly the stream's EOS block, per spec.md §4.7's
//! `setBlockOffsets`) plus, for any checkpoint close enough to need one,
//! its 32 KiB gzip window. At this crate's member-level gzip granularity
//! (SPEC_FULL.md §2) no checkpoint ever carries a window — every member
//! starts its own fresh deflate dictionary — but the field round-trips
//! correctly regardless, so a finer-grained splitter could start using it
//! without a format change.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::block_map::BlockRecord;
use crate::error::{CoreError, Result};

pub const MAGIC: &[u8; 5] = b"GZIDX";
pub const CURRENT_VERSION: u8 = 1;
pub const WINDOW_SIZE: u32 = 32 * 1024;

/// One entry of the persisted index: the compressed/uncompressed
/// position of a known block boundary, plus the sub-byte bit offset
/// `compressed_offset_bytes` rounds away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCheckpoint {
    /// `ceil(encoded_bit_offset / 8)`, per spec.md §6.
    pub compressed_offset_bytes: u64,
    pub uncompressed_offset: u64,
    /// How many bits `compressed_offset_bytes * 8` overshoots the real
    /// bit offset by; always in `0..=7`.
    pub sub_bit_count: u8,
    /// The 32 KiB LZ77 window needed to resume decoding from here, if
    /// one was captured.
    pub window: Option<Vec<u8>>,
}

impl IndexCheckpoint {
    pub fn encoded_offset_bits(&self) -> u64 {
        self.compressed_offset_bytes * 8 - self.sub_bit_count as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Recorded in the header verbatim and round-tripped on read, but not
    /// consulted by `from_block_offsets` to decide which offsets become
    /// checkpoints — every block this crate discovers is written as one
    /// regardless of this value. A real spacing control would need a
    /// splitter that can skip blocks between checkpoints without losing
    /// the ability to resume decoding from the skipped ones, which this
    /// crate's member/block-granularity discovery doesn't do.
    pub checkpoint_spacing: u32,
    pub checkpoints: Vec<IndexCheckpoint>,
}

impl Index {
    /// Builds an index from a finalized `BlockMap`'s full offset table
    /// (spec.md §6's export path). Every discovered block becomes a
    /// checkpoint; `checkpoint_spacing` is stored as header metadata only
    /// and doesn't thin the table (see its own doc comment). Every entry
    /// round-trips exactly through `to_block_offsets`; this crate's reader
    /// never populates `WindowMap` at member/block granularity, so every
    /// checkpoint's `window` is `None`.
    pub fn from_block_offsets(entries: &[BlockRecord], checkpoint_spacing: u32, compressed_size: u64) -> Self {
        let uncompressed_size = entries.last().map(|b| b.decoded_end_bytes()).unwrap_or(0);
        let checkpoints = entries
            .iter()
            .map(|b| {
                let bits = b.encoded_offset_bits;
                IndexCheckpoint {
                    compressed_offset_bytes: bits.div_ceil(8),
                    uncompressed_offset: b.decoded_offset_bytes,
                    sub_bit_count: (bits.div_ceil(8) * 8 - bits) as u8,
                    window: None,
                }
            })
            .collect();
        Self {
            compressed_size,
            uncompressed_size,
            checkpoint_spacing,
            checkpoints,
        }
    }

    /// Reconstructs a full `BlockMap`-compatible offset table: each
    /// checkpoint's size is the gap to the next one, and the final
    /// checkpoint is the stream's implicit EOS record (zero decoded
    /// size), matching spec.md §4.7's `setBlockOffsets` contract.
    pub fn to_block_offsets(&self) -> Result<Vec<BlockRecord>> {
        if self.checkpoints.is_empty() {
            return Err(CoreError::usage("index has no checkpoints to import"));
        }
        let mut out = Vec::with_capacity(self.checkpoints.len());
        for (i, cp) in self.checkpoints.iter().enumerate() {
            let encoded_offset_bits = cp.encoded_offset_bits();
            let (encoded_size_bits, decoded_size_bytes) = match self.checkpoints.get(i + 1) {
                Some(next) => (
                    next.encoded_offset_bits() - encoded_offset_bits,
                    next.uncompressed_offset - cp.uncompressed_offset,
                ),
                None => (0, 0), // the last checkpoint is the implicit EOS record
            };
            out.push(BlockRecord {
                encoded_offset_bits,
                encoded_size_bits,
                decoded_offset_bytes: cp.uncompressed_offset,
                decoded_size_bytes,
            });
        }
        Ok(out)
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(MAGIC).map_err(CoreError::Io)?;
        w.write_u8(CURRENT_VERSION).map_err(CoreError::Io)?;
        w.write_u64::<LittleEndian>(self.compressed_size).map_err(CoreError::Io)?;
        w.write_u64::<LittleEndian>(self.uncompressed_size).map_err(CoreError::Io)?;
        w.write_u32::<LittleEndian>(self.checkpoint_spacing).map_err(CoreError::Io)?;
        w.write_u32::<LittleEndian>(WINDOW_SIZE).map_err(CoreError::Io)?;
        w.write_u32::<LittleEndian>(self.checkpoints.len() as u32).map_err(CoreError::Io)?;

        for cp in &self.checkpoints {
            w.write_u64::<LittleEndian>(cp.compressed_offset_bytes).map_err(CoreError::Io)?;
            w.write_u64::<LittleEndian>(cp.uncompressed_offset).map_err(CoreError::Io)?;
            w.write_u8(cp.sub_bit_count).map_err(CoreError::Io)?;
            w.write_u8(cp.window.is_some() as u8).map_err(CoreError::Io)?;
        }
        for cp in &self.checkpoints {
            if let Some(window) = &cp.window {
                if window.len() != WINDOW_SIZE as usize {
                    return Err(CoreError::usage(format!(
                        "window must be exactly {WINDOW_SIZE} bytes, got {}",
                        window.len()
                    )));
                }
                w.write_all(window).map_err(CoreError::Io)?;
            }
        }
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 5];
        r.read_exact(&mut magic).map_err(CoreError::Io)?;
        if &magic != MAGIC {
            return Err(CoreError::format("not a GZIDX index file"));
        }
        let version = r.read_u8().map_err(CoreError::Io)?;
        if version > CURRENT_VERSION {
            return Err(CoreError::usage(format!(
                "unsupported GZIDX version {version}"
            )));
        }
        let compressed_size = r.read_u64::<LittleEndian>().map_err(CoreError::Io)?;
        let uncompressed_size = r.read_u64::<LittleEndian>().map_err(CoreError::Io)?;
        let checkpoint_spacing = r.read_u32::<LittleEndian>().map_err(CoreError::Io)?;
        let window_size = r.read_u32::<LittleEndian>().map_err(CoreError::Io)?;
        if window_size != WINDOW_SIZE {
            return Err(CoreError::usage(format!(
                "GZIDX window size must be {WINDOW_SIZE}, got {window_size}"
            )));
        }
        let count = r.read_u32::<LittleEndian>().map_err(CoreError::Io)? as usize;

        let mut raw = Vec::with_capacity(count);
        for _ in 0..count {
            let compressed_offset_bytes = r.read_u64::<LittleEndian>().map_err(CoreError::Io)?;
            let uncompressed_offset = r.read_u64::<LittleEndian>().map_err(CoreError::Io)?;
            let sub_bit_count = r.read_u8().map_err(CoreError::Io)?;
            let has_window = r.read_u8().map_err(CoreError::Io)?;
            if sub_bit_count >= 8 {
                return Err(CoreError::usage(format!(
                    "sub_bit_count must be in 0..=7, got {sub_bit_count}"
                )));
            }
            if compressed_offset_bytes * 8 < sub_bit_count as u64 {
                return Err(CoreError::usage(
                    "checkpoint's sub_bit_count implies a negative bit offset",
                ));
            }
            if compressed_offset_bytes > compressed_size || uncompressed_offset > uncompressed_size {
                return Err(CoreError::usage(
                    "checkpoint offset lies past the index's declared stream size",
                ));
            }
            raw.push((compressed_offset_bytes, uncompressed_offset, sub_bit_count, has_window));
        }

        let mut checkpoints = Vec::with_capacity(count);
        for (compressed_offset_bytes, uncompressed_offset, sub_bit_count, has_window) in raw {
            let window = if has_window != 0 {
                let mut buf = vec![0u8; WINDOW_SIZE as usize];
                r.read_exact(&mut buf).map_err(CoreError::Io)?;
                Some(buf)
            } else {
                None
            };
            checkpoints.push(IndexCheckpoint {
                compressed_offset_bytes,
                uncompressed_offset,
                sub_bit_count,
                window,
            });
        }

        Ok(Self {
            compressed_size,
            uncompressed_size,
            checkpoint_spacing,
            checkpoints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// The final (EOS) record's `encoded_size_bits` is not recoverable
    /// from the index — there's no following checkpoint to diff against
    /// — so it's always reconstructed as `0`; this fixture sets it to `0`
    /// up front so the round-trip assertion below is exact rather than
    /// lossy in a way that would mask a real bug.
    fn sample_entries() -> Vec<BlockRecord> {
        vec![
            BlockRecord {
                encoded_offset_bits: 32,
                encoded_size_bits: 900_000,
                decoded_offset_bytes: 0,
                decoded_size_bytes: 800_000,
            },
            BlockRecord {
                encoded_offset_bits: 900_032,
                encoded_size_bits: 0,
                decoded_offset_bytes: 800_000,
                decoded_size_bytes: 0,
            },
        ]
    }

    #[test]
    fn round_trips_through_bytes() {
        let index = Index::from_block_offsets(&sample_entries(), 4 * 1024 * 1024, 150_000);
        let mut buf = Vec::new();
        index.write(&mut buf).unwrap();

        let parsed = Index::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn block_offsets_round_trip_through_index() {
        let entries = sample_entries();
        let index = Index::from_block_offsets(&entries, 4 * 1024 * 1024, 150_000);
        let reconstructed = index.to_block_offsets().unwrap();
        assert_eq!(reconstructed, entries);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"NOPE!");
        assert!(Index::read(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn rejects_future_version() {
        let index = Index::from_block_offsets(&sample_entries(), 1024, 150_000);
        let mut buf = Vec::new();
        index.write(&mut buf).unwrap();
        buf[5] = CURRENT_VERSION + 1;
        assert!(Index::read(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn rejects_wrong_window_size() {
        let index = Index::from_block_offsets(&sample_entries(), 1024, 150_000);
        let mut buf = Vec::new();
        index.write(&mut buf).unwrap();
        // window_size field sits right after magic(5) + version(1) +
        // compressed_size(8) + uncompressed_size(8) + spacing(4).
        let offset = 5 + 1 + 8 + 8 + 4;
        buf[offset..offset + 4].copy_from_slice(&1234u32.to_le_bytes());
        assert!(Index::read(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn rejects_sub_bit_count_out_of_range() {
        let mut cp = IndexCheckpoint {
            compressed_offset_bytes: 10,
            uncompressed_offset: 0,
            sub_bit_count: 8,
            window: None,
        };
        let index = Index {
            compressed_size: 1000,
            uncompressed_size: 1000,
            checkpoint_spacing: 1024,
            checkpoints: vec![cp.clone()],
        };
        let mut buf = Vec::new();
        index.write(&mut buf).unwrap();
        assert!(Index::read(&mut Cursor::new(buf)).is_err());

        cp.sub_bit_count = 3;
        let valid = Index {
            checkpoints: vec![cp],
            ..index
        };
        let mut buf2 = Vec::new();
        valid.write(&mut buf2).unwrap();
        assert!(Index::read(&mut Cursor::new(buf2)).is_ok());
    }
}
