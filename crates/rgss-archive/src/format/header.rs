//! Archive header structures.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{Version, MAGIC};

/// The fixed 8-byte header shared by all versions.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct RawHeader {
    /// `"RGSSAD\0"`
    pub magic: [u8; 7],
    /// Format version
    pub version: u8,
}

impl RawHeader {
    /// Size in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(version: Version) -> Self {
        Self {
            magic: MAGIC,
            version: version as u8,
        }
    }

    /// Whether the signature matches.
    pub fn has_magic(&self) -> bool {
        self.magic == MAGIC
    }
}

/// Plain seed following the RGSS3A header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct Rgss3Extension {
    /// Little-endian seed of the entry table key
    pub seed: [u8; 4],
}

impl Rgss3Extension {
    /// Size in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    #[inline]
    pub fn seed(&self) -> u32 {
        u32::from_le_bytes(self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = RawHeader::new(Version::Rgss2a);
        assert_eq!(header.as_bytes(), b"RGSSAD\0\x02");
        assert_eq!(RawHeader::SIZE, 8);

        let parsed = RawHeader::read_from_bytes(b"RGSSAD\0\x03").unwrap();
        assert!(parsed.has_magic());
        assert_eq!({ parsed.version }, 3);
    }

    #[test]
    fn test_extension_seed() {
        let ext = Rgss3Extension::read_from_bytes(&0x1122_3344u32.to_le_bytes()).unwrap();
        assert_eq!(ext.seed(), 0x1122_3344);
    }
}
