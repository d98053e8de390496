//! Positioned reads against a shared, read-only byte source.


use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use crate::address::FileRange;


/// A byte source that can be read at arbitrary offsets without moving a shared cursor.
pub trait ReadAt {
    /// Fills `buf` with the bytes starting at `offset`, failing if fewer bytes are available.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), io::Error>;
}

impl ReadAt for [u8] {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), io::Error> {
        let bytes = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(buf.len())?))
            .and_then(|range| self.get(range))
            .ok_or(io::ErrorKind::UnexpectedEof)?;
        buf.copy_from_slice(bytes);
        Ok(())
    }
}
impl ReadAt for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), io::Error> {
        self.as_slice().read_exact_at(buf, offset)
    }
}
impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), io::Error> {
        (**self).read_exact_at(buf, offset)
    }
}
impl<T: ReadAt + ?Sized> ReadAt for Box<T> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), io::Error> {
        (**self).read_exact_at(buf, offset)
    }
}
impl<T: ReadAt + ?Sized> ReadAt for Arc<T> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), io::Error> {
        (**self).read_exact_at(buf, offset)
    }
}

#[cfg(unix)]
impl ReadAt for File {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), io::Error> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }
}

#[cfg(windows)]
impl ReadAt for File {
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> Result<(), io::Error> {
        while !buf.is_empty() {
            match std::os::windows::fs::FileExt::seek_read(self, buf, offset) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(bytes_read) => {
                    buf = &mut std::mem::take(&mut buf)[bytes_read..];
                    offset += bytes_read as u64;
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Adapts a cursor-based reader; the lock keeps each seek paired with its read.
impl<R: Read + Seek> ReadAt for Mutex<R> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), io::Error> {
        let mut reader = self.lock()
            .map_err(|_| io::Error::other("byte source lock poisoned"))?;
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(buf)
    }
}


/// A window onto part of a byte source.
///
/// Offsets passed to [`ReadAt::read_exact_at`] are relative to the start of the window, and reads
/// that would leave the window fail with [`io::ErrorKind::UnexpectedEof`].
pub struct RangeView<'a, S: ?Sized> {
    source: &'a S,
    range: FileRange,
}
impl<'a, S: ReadAt + ?Sized> RangeView<'a, S> {
    pub fn new(source: &'a S, range: FileRange) -> Self {
        Self { source, range }
    }

    pub fn range(&self) -> FileRange { self.range }
}
impl<'a, S: ReadAt + ?Sized> ReadAt for RangeView<'a, S> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), io::Error> {
        let end = offset.checked_add(buf.len() as u64);
        if !matches!(end, Some(end) if end <= self.range.length) {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        self.source.read_exact_at(buf, self.range.start.0 + offset)
    }
}
