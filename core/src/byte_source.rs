//! The capability set behind `BitReader`'s byte source (spec.md §9:
//! "replace an inherited virtual file-reader interface with deep
//! hierarchies with a single capability set behind an interface
//! abstraction").
//!
//! Two concrete implementations are provided: [`SliceSource`] for
//! in-memory buffers (`Vec<u8>`, a `memmap2::Mmap`, anything behind
//! `AsRef<[u8]>`) and [`SharedFileReader`] (C2) for an arbitrary
//! `Read + Seek` handle shared between clones that each keep an
//! independent logical position.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

/// Capability set a `BitReader` needs from its backing store: `read`,
/// `seek`, `tell`, `size`, `eof`, `seekable`, `clone`.
pub trait ByteSource: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Absolute byte seek.
    fn seek(&mut self, pos: u64) -> io::Result<()>;
    fn position(&self) -> u64;
    fn size(&self) -> u64;
    fn seekable(&self) -> bool;
    fn try_clone(&self) -> io::Result<Box<dyn ByteSource>>;
}

/// A byte source over anything that derefs to `[u8]` — owned `Vec<u8>`,
/// an `Arc<[u8]>`, a `memmap2::Mmap`. Cloning is just bumping a
/// refcount and copying a cursor; no locking is needed since the
/// underlying bytes never change.
pub struct SliceSource {
    data: Arc<dyn AsRef<[u8]> + Send + Sync>,
    pos: u64,
}

impl SliceSource {
    pub fn new<T>(data: Arc<T>) -> Self
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        let data: Arc<dyn AsRef<[u8]> + Send + Sync> = data;
        Self { data, pos: 0 }
    }

    #[inline]
    fn bytes(&self) -> &[u8] {
        (*self.data).as_ref()
    }
}

impl ByteSource for SliceSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes = self.bytes();
        let start = self.pos.min(bytes.len() as u64) as usize;
        let available = &bytes[start..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = pos;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> u64 {
        self.bytes().len() as u64
    }

    fn seekable(&self) -> bool {
        true
    }

    fn try_clone(&self) -> io::Result<Box<dyn ByteSource>> {
        Ok(Box::new(SliceSource {
            data: self.data.clone(),
            pos: self.pos,
        }))
    }
}

/// C2 — SharedFileReader.
///
/// Wraps one underlying `Read + Seek` handle so that `try_clone` yields
/// a reader with an independent logical position over the *same*
/// bytes. Every read acquires the source's lock, seeks it to this
/// clone's position, reads, updates the clone's position, and releases
/// the lock. The wrapped handle is dropped when the last clone is
/// dropped. No assumption is made about the source's own thread-safety
/// beyond what this wrapper provides — unlike relying on OS duplicate-fd
/// semantics (spec.md §9), every access is fully serialized here.
pub struct SharedFileReader<R> {
    inner: Arc<Mutex<R>>,
    pos: u64,
    size: u64,
    seekable: bool,
}

impl<R> SharedFileReader<R>
where
    R: Read + Seek + Send + 'static,
{
    pub fn new(mut inner: R, seekable: bool) -> io::Result<Self> {
        let size = if seekable {
            let end = inner.seek(SeekFrom::End(0))?;
            inner.seek(SeekFrom::Start(0))?;
            end
        } else {
            0
        };
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            pos: 0,
            size,
            seekable,
        })
    }
}

impl<R> ByteSource for SharedFileReader<R>
where
    R: Read + Seek + Send + 'static,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        guard.seek(SeekFrom::Start(self.pos))?;
        let n = guard.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = pos;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn seekable(&self) -> bool {
        self.seekable
    }

    fn try_clone(&self) -> io::Result<Box<dyn ByteSource>> {
        Ok(Box::new(SharedFileReader {
            inner: self.inner.clone(),
            pos: self.pos,
            size: self.size,
            seekable: self.seekable,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn slice_source_clone_has_independent_position() {
        let data: Arc<[u8]> = Arc::from(&b"0123456789"[..]);
        let mut a = SliceSource::new(data);
        let mut buf = [0u8; 4];
        a.read(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");

        let mut b = a.try_clone().unwrap();
        b.seek(0).unwrap();
        let mut buf2 = [0u8; 4];
        b.read(&mut buf2).unwrap();
        assert_eq!(&buf2, b"0123");

        // `a`'s position is untouched by seeking the clone.
        let mut buf3 = [0u8; 4];
        a.read(&mut buf3).unwrap();
        assert_eq!(&buf3, b"4567");
    }

    #[test]
    fn shared_file_reader_clones_share_bytes_not_position() {
        let cursor = Cursor::new(b"hello world".to_vec());
        let mut a = SharedFileReader::new(cursor, true).unwrap();
        let mut b = a.try_clone().unwrap();

        let mut buf = [0u8; 5];
        a.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        b.seek(6).unwrap();
        let mut buf2 = [0u8; 5];
        b.read(&mut buf2).unwrap();
        assert_eq!(&buf2, b"world");

        // `a` still resumes from byte 5.
        let mut buf3 = [0u8; 1];
        a.read(&mut buf3).unwrap();
        assert_eq!(&buf3, b" ");
    }
}
