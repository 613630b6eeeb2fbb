//! Archive entry records.

use std::path::{Path, PathBuf};

/// A file stored in an RGSS archive.
///
/// This contains metadata about the file, not the file data itself.
/// Use [`Archive::open_entry`](crate::Archive::open_entry) to stream the contents.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntryRecord {
    /// Normalized `/`-separated path.
    path: String,
    /// Content length in bytes.
    size: u64,
    /// Absolute offset of the content in the archive.
    offset: u64,
    /// Stored key field.
    key: u32,
    /// Position in the entry table.
    index: usize,
}

impl EntryRecord {
    pub(crate) fn new(path: String, size: u64, offset: u64, key: u32, index: usize) -> Self {
        Self {
            path,
            size,
            offset,
            key,
            index,
        }
    }

    /// Get the normalized path.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the content length in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the absolute content offset.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the offset one past the last content byte.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Get the stored key.
    ///
    /// For RGSS3A this seeds the content key stream. RGSSAD and RGSS2A store
    /// a key here too, but content keys derive from the file position instead.
    #[inline]
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Get the position of the record in the entry table.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Iterate over the path components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.path.split('/')
    }

    /// Get the file name (last path component).
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Get the relative output path for extraction.
    pub fn output_path(&self) -> PathBuf {
        self.components().collect()
    }

    /// Get the file extension, if any.
    pub fn extension(&self) -> Option<&str> {
        Path::new(self.file_name())
            .extension()
            .and_then(|ext| ext.to_str())
    }
}
