//! Content key derivation.
//!
//! The two archive families key their content differently. RGSSAD/RGSS2A run
//! one key stream from the end of the header to the end of the file, so the
//! key for an entry depends only on its absolute offset. RGSS3A starts a fresh
//! stream at every entry from the entry's own key.

use std::fmt;

use crate::crypto::{AffineKeyStream, KeyStream};
use crate::entry::EntryRecord;
use crate::{Error, Result};

/// Key stream positioned on the first content byte of an entry.
#[derive(Debug, Clone)]
pub struct ContentKeys {
    /// Stream whose next key covers the first content byte; `reset` returns here.
    pub keys: AffineKeyStream,
    /// Byte position of the first content byte inside that key word.
    pub phase: usize,
}

/// Chooses the content key stream for an entry.
pub trait KeyingStrategy: fmt::Debug + Send + Sync {
    fn content_keys(&self, entry: &EntryRecord) -> Result<ContentKeys>;
}

/// One stream across the whole file (RGSSAD, RGSS2A).
#[derive(Debug, Clone)]
pub struct SharedStreamKeying {
    origin: AffineKeyStream,
    data_start: u64,
}

impl SharedStreamKeying {
    /// `origin` is the stream state at `data_start`, the first byte after the header.
    pub fn new(origin: AffineKeyStream, data_start: u64) -> Self {
        Self { origin, data_start }
    }
}

impl KeyingStrategy for SharedStreamKeying {
    fn content_keys(&self, entry: &EntryRecord) -> Result<ContentKeys> {
        let relative = entry
            .offset()
            .checked_sub(self.data_start)
            .ok_or_else(|| Error::EntryBeforeData {
                path: entry.path().to_string(),
                offset: entry.offset(),
                start: self.data_start,
            })?;

        let mut keys = self.origin.clone();
        keys.reset();
        keys.skip(relative / 4)?;
        keys.rebase();

        Ok(ContentKeys {
            keys,
            phase: (relative % 4) as usize,
        })
    }
}

/// A fresh stream per entry, seeded with the entry key (RGSS3A).
#[derive(Debug, Clone, Copy, Default)]
pub struct PerEntryKeying;

impl KeyingStrategy for PerEntryKeying {
    fn content_keys(&self, entry: &EntryRecord) -> Result<ContentKeys> {
        Ok(ContentKeys {
            keys: AffineKeyStream::new(entry.key()),
            phase: 0,
        })
    }
}
