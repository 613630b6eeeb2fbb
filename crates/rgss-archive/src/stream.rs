//! Random-access decryption of a single entry.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::debug;

use crate::crypto::{AffineKeyStream, KeyStream};
use crate::entry::EntryRecord;
use crate::keying::KeyingStrategy;
use crate::reader::DecryptingReader;
use crate::source::SharedSource;
use crate::{Error, Result};

/// A readable, seekable view of one entry's plaintext.
///
/// Byte `o` of the entry is covered by key word `(phase + o) / 4`, counted from
/// the entry's first key. The stream keeps its generator on the word of the
/// next byte it expects to serve and moves it only when a read starts
/// somewhere else.
#[derive(Debug)]
pub struct ContentStream<R> {
    source: SharedSource<R>,
    entry: EntryRecord,
    reader: DecryptingReader<AffineKeyStream>,
    phase: usize,
    word: u64,
    pos: u64,
}

impl<R: Read + Seek> ContentStream<R> {
    /// Open a stream at the start of `entry`.
    pub fn open(
        source: SharedSource<R>,
        entry: EntryRecord,
        keying: &dyn KeyingStrategy,
    ) -> Result<Self> {
        let content = keying.content_keys(&entry)?;
        Ok(Self {
            source,
            entry,
            reader: DecryptingReader::new(content.keys),
            phase: content.phase,
            word: 0,
            pos: 0,
        })
    }

    /// The entry this stream reads.
    #[inline]
    pub fn entry(&self) -> &EntryRecord {
        &self.entry
    }

    /// Entry length in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.entry.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entry.size() == 0
    }

    /// Offset the next sequential read starts at.
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read up to `len` bytes starting at `offset` within the entry.
    ///
    /// The range is clipped to the entry, so reads running past the end are
    /// short and reads at or past the end are empty.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let size = self.entry.size();
        if offset >= size || len == 0 {
            return Ok(Vec::new());
        }
        let count = (size - offset).min(len as u64) as usize;

        let target = self.word_of(offset);
        self.reposition(target)?;
        self.pos = offset;

        let pad = ((self.phase as u64 + offset) % 4) as usize;
        let data = {
            let mut source = self.source.lock();
            source.set_cursor(self.entry.offset() + offset);
            self.reader.read_unaligned(&mut source, count, pad)?
        };

        self.pos = offset + count as u64;
        self.word = self.word_of(self.pos);
        Ok(data)
    }

    #[inline]
    fn word_of(&self, offset: u64) -> u64 {
        (self.phase as u64 + offset) / 4
    }

    /// Move the generator onto key word `target`.
    fn reposition(&mut self, target: u64) -> Result<()> {
        let current = self.word;
        if target == current {
            return Ok(());
        }

        let keys = self.reader.keys_mut();
        if target > current {
            keys.skip(target - current)?;
        } else if keys.can_rewind() && target >= current / 2 {
            keys.rewind(current - target)?;
        } else {
            keys.reset();
            keys.skip(target)?;
        }

        debug!(
            path = self.entry.path(),
            from = current,
            to = target,
            "repositioned content keys"
        );
        self.word = target;
        Ok(())
    }
}

impl<R: Read + Seek> Read for ContentStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.read_at(self.pos, buf.len())?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl<R: Read + Seek> Seek for ContentStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::End(d) => i128::from(self.entry.size()) + i128::from(d),
            SeekFrom::Current(d) => i128::from(self.pos) + i128::from(d),
        };
        let target = u64::try_from(target).map_err(|_| Error::InvalidSeek(target))?;
        self.pos = target;
        Ok(target)
    }
}
