//! Entry table parsing.
//!
//! The entry table is encrypted as one stream, so it is walked strictly in
//! physical order: the key for record `k` depends on how much of records
//! `0..k` was consumed, not on where record `k` sits in the file.

use std::io::{Read, Seek};
use std::sync::Arc;

use rgss_common::{path, BinaryReader};
use tracing::{debug, warn};

use crate::crypto::{AffineKeyStream, ConstantKeyStream};
use crate::entry::EntryRecord;
use crate::format::{self, RawHeader, Rgss3Extension, Version, LEGACY_SEED, MAGIC};
use crate::keying::{KeyingStrategy, PerEntryKeying, SharedStreamKeying};
use crate::reader::DecryptingReader;
use crate::source::ByteSource;
use crate::{Error, Result};

/// An entry that was skipped while indexing.
#[derive(Debug)]
pub struct RejectedEntry {
    /// Position in the entry table.
    pub index: usize,
    /// Name as stored, lossily decoded.
    pub name: String,
    /// Why the entry was skipped.
    pub error: Error,
}

/// Parsed header and entry table of an archive.
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    version: Version,
    entries: Vec<EntryRecord>,
    rejected: Arc<Vec<RejectedEntry>>,
    keying: Arc<dyn KeyingStrategy>,
}

/// A record as decrypted from the table, before validation.
struct RawRecord {
    index: usize,
    name_offset: u64,
    name: Vec<u8>,
    size: u32,
    offset: u32,
    key: u32,
}

impl ArchiveIndex {
    /// Parse the header and entry table.
    ///
    /// Only the header is read until the signature and version check out.
    pub fn parse<R: Read + Seek>(source: &mut ByteSource<R>) -> Result<Self> {
        let version = read_header(source)?;

        let (records, keying) = if version.is_legacy() {
            let origin = AffineKeyStream::new(LEGACY_SEED);
            let records = parse_legacy_table(source, origin.clone())?;
            let keying: Arc<dyn KeyingStrategy> =
                Arc::new(SharedStreamKeying::new(origin, version.header_size()));
            (records, keying)
        } else {
            let keying: Arc<dyn KeyingStrategy> = Arc::new(PerEntryKeying);
            (parse_rgss3_table(source)?, keying)
        };

        let mut entries = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();
        for record in records {
            let index = record.index;
            let name = String::from_utf8_lossy(&record.name).into_owned();
            match validate(record, version.header_size(), source.len()) {
                Ok(entry) => {
                    debug!(
                        index,
                        path = entry.path(),
                        size = entry.size(),
                        offset = entry.offset(),
                        key = entry.key(),
                        "indexed entry"
                    );
                    entries.push(entry);
                }
                Err(error) => {
                    warn!(index, name = %name, %error, "skipping entry");
                    rejected.push(RejectedEntry { index, name, error });
                }
            }
        }

        Ok(Self {
            version,
            entries,
            rejected: Arc::new(rejected),
            keying,
        })
    }

    /// Get the format version.
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the size of the plain header.
    #[inline]
    pub fn header_size(&self) -> u64 {
        self.version.header_size()
    }

    /// Get the accepted entries in table order.
    #[inline]
    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    /// Get the entries skipped while indexing.
    #[inline]
    pub fn rejected(&self) -> &[RejectedEntry] {
        &self.rejected
    }

    /// Get the content keying strategy of this archive.
    #[inline]
    pub fn keying(&self) -> &Arc<dyn KeyingStrategy> {
        &self.keying
    }
}

fn read_header<R: Read + Seek>(source: &mut ByteSource<R>) -> Result<Version> {
    let mut buf = [0u8; RawHeader::SIZE as usize];
    let available = source.len().min(RawHeader::SIZE) as usize;
    source.set_cursor(0);
    source.read_exact_at_cursor(&mut buf[..available])?;

    let mut reader = BinaryReader::new(&buf[..available]);
    if let Err(err) = reader.expect_magic(&MAGIC) {
        // a short file that still matches the signature so far is truncated
        return Err(match err {
            rgss_common::Error::InvalidMagic { actual, .. } if !MAGIC.starts_with(&actual) => {
                Error::InvalidMagic {
                    expected: MAGIC.to_vec(),
                    actual,
                }
            }
            _ => Error::Truncated {
                offset: available as u64,
                needed: RawHeader::SIZE - available as u64,
                available: 0,
            },
        });
    }

    let version_byte = reader.read_u8().map_err(|_| Error::Truncated {
        offset: available as u64,
        needed: 1,
        available: 0,
    })?;
    let version = Version::try_from(version_byte).map_err(|version| {
        Error::UnsupportedVersion {
            version,
            offset: RawHeader::SIZE - 1,
        }
    })?;
    debug!(?version, "archive header");
    Ok(version)
}

fn check_name_length<R: Read + Seek>(source: &ByteSource<R>, name_len: u32) -> Result<()> {
    if u64::from(name_len) > source.remaining() {
        return Err(Error::Truncated {
            offset: source.cursor(),
            needed: u64::from(name_len),
            available: source.remaining(),
        });
    }
    Ok(())
}

/// Walk an RGSSAD/RGSS2A table with the shared stream.
///
/// Record: name length, name (byte keys), size, stored key, offset.
fn parse_legacy_table<R: Read + Seek>(
    source: &mut ByteSource<R>,
    keys: AffineKeyStream,
) -> Result<Vec<RawRecord>> {
    let mut reader = DecryptingReader::new(keys);
    let mut records = Vec::new();
    source.set_cursor(RawHeader::SIZE);

    while source.remaining() > 0 {
        let name_len = reader.read_word(source)?;
        if name_len == 0 {
            break;
        }
        check_name_length(source, name_len)?;

        let name_offset = source.cursor();
        let name = reader.read_bytes(source, name_len as usize)?;
        let size = reader.read_word(source)?;
        let key = reader.read_word(source)?;
        let offset = reader.read_word(source)?;

        records.push(RawRecord {
            index: records.len(),
            name_offset,
            name,
            size,
            offset,
            key,
        });
    }

    Ok(records)
}

/// Walk an RGSS3A table with the constant table key.
///
/// Record: name length, name (word keys), size, offset, entry key.
fn parse_rgss3_table<R: Read + Seek>(source: &mut ByteSource<R>) -> Result<Vec<RawRecord>> {
    let mut ext = [0u8; Rgss3Extension::SIZE as usize];
    source.read_exact_at_cursor(&mut ext)?;
    let ext: Rgss3Extension = BinaryReader::new(&ext).read_struct()?;
    let table_key = format::table_key(ext.seed());
    debug!(seed = ext.seed(), table_key, "rgss3a table key");

    let mut reader = DecryptingReader::new(ConstantKeyStream::new(table_key));
    let mut records = Vec::new();

    while source.remaining() > 0 {
        let name_len = reader.read_word(source)?;
        if name_len == 0 {
            break;
        }
        check_name_length(source, name_len)?;

        let name_offset = source.cursor();
        let name = reader.read_unaligned(source, name_len as usize, 0)?;
        let size = reader.read_word(source)?;
        let offset = reader.read_word(source)?;
        let key = reader.read_word(source)?;

        records.push(RawRecord {
            index: records.len(),
            name_offset,
            name,
            size,
            offset,
            key,
        });
    }

    Ok(records)
}

fn validate(record: RawRecord, data_start: u64, len: u64) -> Result<EntryRecord> {
    let invalid_name = || Error::InvalidEntryName {
        offset: record.name_offset,
    };
    let name = std::str::from_utf8(&record.name).map_err(|_| invalid_name())?;
    let path = path::normalize(name).map_err(|_| invalid_name())?;

    let offset = u64::from(record.offset);
    let end = offset + u64::from(record.size);
    if offset < data_start {
        return Err(Error::EntryBeforeData {
            path,
            offset,
            start: data_start,
        });
    }
    if end > len {
        return Err(Error::EntryOutOfBounds {
            path,
            offset,
            end,
            len,
        });
    }

    Ok(EntryRecord::new(
        path,
        u64::from(record.size),
        offset,
        record.key,
        record.index,
    ))
}
