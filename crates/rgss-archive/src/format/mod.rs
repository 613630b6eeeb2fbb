//! On-disk structures of RGSS archives.
//!
//! All variants start with the same 8-byte [`RawHeader`]. Everything after it
//! is encrypted:
//!
//! - RGSSAD / RGSS2A (versions 1 and 2): one key stream seeded with
//!   [`LEGACY_SEED`] covers the entry table and all content.
//! - RGSS3A (version 3): a plain [`Rgss3Extension`] seed follows the header,
//!   the entry table is XORed with a constant key derived from it, and every
//!   entry carries its own content key.

mod header;

pub use header::{RawHeader, Rgss3Extension};

/// Signature at the start of every archive.
pub const MAGIC: [u8; 7] = *b"RGSSAD\0";

/// Initialization value of the RGSSAD/RGSS2A key stream.
pub const LEGACY_SEED: u32 = 0xDEAD_CAFE;

/// Archive format version, stored in the last header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum Version {
    /// RPG Maker XP (`.rgssad`).
    Rgssad = 1,
    /// RPG Maker VX (`.rgss2a`).
    Rgss2a = 2,
    /// RPG Maker VX Ace (`.rgss3a`).
    Rgss3a = 3,
}

impl Version {
    /// Size of the plain header preceding the encrypted data.
    pub const fn header_size(self) -> u64 {
        match self {
            Self::Rgssad | Self::Rgss2a => RawHeader::SIZE,
            Self::Rgss3a => RawHeader::SIZE + Rgss3Extension::SIZE,
        }
    }

    /// Whether a single key stream runs across the whole file.
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::Rgssad | Self::Rgss2a)
    }

    /// Conventional file extension for this version.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Rgssad => "rgssad",
            Self::Rgss2a => "rgss2a",
            Self::Rgss3a => "rgss3a",
        }
    }
}

impl TryFrom<u8> for Version {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Rgssad),
            2 => Ok(Self::Rgss2a),
            3 => Ok(Self::Rgss3a),
            other => Err(other),
        }
    }
}

/// Key XORed over the RGSS3A entry table.
#[inline]
pub const fn table_key(seed: u32) -> u32 {
    seed.wrapping_mul(9).wrapping_add(3)
}
