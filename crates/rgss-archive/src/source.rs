//! Shared archive byte source.
//!
//! Every reader of an archive goes through one [`ByteSource`]. Its cursor is
//! the single piece of mutable state they share: a reader pulls the cursor,
//! reads, and pushes the advanced cursor back, all while holding the lock of
//! the enclosing [`SharedSource`].

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::{Error, Result};

/// A seekable reader with an explicit cursor.
#[derive(Debug)]
pub struct ByteSource<R> {
    reader: R,
    cursor: u64,
    len: u64,
}

impl<R: Read + Seek> ByteSource<R> {
    /// Wrap a reader. The length is taken from the end of the stream.
    pub fn new(mut reader: R) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self {
            reader,
            cursor: 0,
            len,
        })
    }

    /// Total length of the source in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the source holds no bytes at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current cursor position.
    #[inline]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Move the cursor. Positions past the end are allowed; reads there fail.
    #[inline]
    pub fn set_cursor(&mut self, position: u64) {
        self.cursor = position;
    }

    /// Bytes between the cursor and the end of the source.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.cursor)
    }

    /// Fill `buf` from the cursor and advance past it.
    ///
    /// Either the whole buffer is read or the cursor stays where it was.
    pub fn read_exact_at_cursor(&mut self, buf: &mut [u8]) -> Result<()> {
        let needed = buf.len() as u64;
        if needed > self.remaining() {
            return Err(Error::Truncated {
                offset: self.cursor,
                needed,
                available: self.remaining(),
            });
        }
        self.reader.seek(SeekFrom::Start(self.cursor))?;
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::Truncated {
                offset: self.cursor,
                needed,
                available: self.remaining(),
            },
            _ => Error::Io(e),
        })?;
        self.cursor += needed;
        Ok(())
    }
}

/// A [`ByteSource`] shared by every stream of one archive.
///
/// Cloning is cheap; all clones lock the same source.
#[derive(Debug)]
pub struct SharedSource<R> {
    inner: Arc<Mutex<ByteSource<R>>>,
    len: u64,
}

impl<R> Clone for SharedSource<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            len: self.len,
        }
    }
}

impl<R: Read + Seek> SharedSource<R> {
    pub fn new(source: ByteSource<R>) -> Self {
        let len = source.len();
        Self {
            inner: Arc::new(Mutex::new(source)),
            len,
        }
    }

    /// Length of the underlying source, readable without locking.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lock the source for one pull-read-push cycle.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, ByteSource<R>> {
        self.inner.lock()
    }
}
