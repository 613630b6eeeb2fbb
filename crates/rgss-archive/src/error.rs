//! Error types for the archive crate.

use std::io;

use thiserror::Error;

/// Errors that can occur when working with RGSS archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] rgss_common::Error),

    /// Header does not start with the archive signature.
    #[error("invalid archive signature at offset 0: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: Vec<u8>, actual: Vec<u8> },

    /// Unsupported format version byte.
    #[error("unsupported archive version {version} at offset {offset}")]
    UnsupportedVersion { version: u8, offset: u64 },

    /// A read ran past the end of the source.
    #[error("truncated archive at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// Backward movement requested from a generator that cannot rewind.
    #[error("key stream cannot be rewound")]
    RewindUnsupported,

    /// Jump count outside `[0, 2^31)`.
    #[error("key stream jump of {count} steps is out of range")]
    JumpOutOfRange { count: u64 },

    /// Unaligned read with a left padding outside `[0, 3]`.
    #[error("invalid left padding {0}, expected 0..=3")]
    InvalidPadding(usize),

    /// Negative or overflowing seek on a content stream.
    #[error("invalid seek to {0}")]
    InvalidSeek(i128),

    /// Buffer allocation failed.
    #[error("cannot allocate {0} bytes")]
    Allocation(usize),

    /// Entry name is not valid UTF-8 or normalizes to nothing.
    #[error("invalid entry name at offset {offset}")]
    InvalidEntryName { offset: u64 },

    /// Entry content runs past the end of the archive.
    #[error("entry {path} spans {offset}..{end}, past the archive end at {len}")]
    EntryOutOfBounds {
        path: String,
        offset: u64,
        end: u64,
        len: u64,
    },

    /// Entry content starts before the encrypted data.
    #[error("entry {path} starts at {offset}, before the archive data at {start}")]
    EntryBeforeData {
        path: String,
        offset: u64,
        start: u64,
    },

    /// Two entries share a path, or a file and a directory collide.
    #[error("duplicate path in archive: {0}")]
    DuplicatePath(String),

    /// Path does not exist in the archive.
    #[error("path not found: {0}")]
    NotFound(String),

    /// Path names a directory where a file was expected.
    #[error("is a directory: {0}")]
    IsADirectory(String),
}

/// Error categories reported to archive consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad magic, version or entry metadata.
    Format,
    /// Entry table or content runs past the source end.
    Truncation,
    /// Rewind requested on a non-rewindable generator.
    Capability,
    /// Skip or rewind count out of range.
    Range,
    /// Malformed call parameters.
    InvalidArgument,
    /// Allocation or handle exhaustion.
    Resource,
    /// Duplicate path while indexing.
    Conflict,
    /// Lookup miss.
    NotFound,
    /// Underlying I/O failure.
    Io,
}

impl Error {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => ErrorKind::Truncation,
            Self::Io(e) if e.kind() == io::ErrorKind::OutOfMemory => ErrorKind::Resource,
            Self::Io(_) => ErrorKind::Io,
            Self::Common(rgss_common::Error::UnexpectedEof { .. }) => ErrorKind::Truncation,
            Self::Common(rgss_common::Error::Io(_)) => ErrorKind::Io,
            Self::Common(_) => ErrorKind::Format,
            Self::InvalidMagic { .. }
            | Self::UnsupportedVersion { .. }
            | Self::InvalidEntryName { .. }
            | Self::EntryOutOfBounds { .. }
            | Self::EntryBeforeData { .. } => ErrorKind::Format,
            Self::Truncated { .. } => ErrorKind::Truncation,
            Self::RewindUnsupported => ErrorKind::Capability,
            Self::JumpOutOfRange { .. } => ErrorKind::Range,
            Self::InvalidPadding(_) | Self::InvalidSeek(_) | Self::IsADirectory(_) => {
                ErrorKind::InvalidArgument
            }
            Self::Allocation(_) => ErrorKind::Resource,
            Self::DuplicatePath(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Archive offset the error was detected at, when known.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::InvalidMagic { .. } => Some(0),
            Self::UnsupportedVersion { offset, .. }
            | Self::Truncated { offset, .. }
            | Self::InvalidEntryName { offset }
            | Self::EntryOutOfBounds { offset, .. }
            | Self::EntryBeforeData { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            Error::InvalidSeek(_) | Error::InvalidPadding(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            Error::Truncated { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
