//! Synthetic archives for tests.

use crate::crypto::{AffineKeyStream, KeyStream};
use crate::format::{self, RawHeader, Version, LEGACY_SEED};
use zerocopy::IntoBytes;

/// Value the builder writes into the unused RGSSAD/RGSS2A key field.
pub const LEGACY_STORED_KEY: u32 = 0x0BAD_5EED;

/// One entry to write.
#[derive(Debug, Clone)]
pub struct TestEntry {
    name: Vec<u8>,
    data: Vec<u8>,
    key: Option<u32>,
    size: Option<u32>,
    offset: Option<u32>,
}

impl TestEntry {
    pub fn new(name: &str, data: &[u8]) -> Self {
        Self::raw_name(name.as_bytes().to_vec(), data)
    }

    pub fn raw_name(name: Vec<u8>, data: &[u8]) -> Self {
        Self {
            name,
            data: data.to_vec(),
            key: None,
            size: None,
            offset: None,
        }
    }

    /// Content key stored in the record.
    pub fn key(mut self, key: u32) -> Self {
        self.key = Some(key);
        self
    }

    /// Size field to write instead of the data length.
    pub fn size_override(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Offset field to write instead of the real content position.
    pub fn offset_override(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Builds encrypted archives byte for byte.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    version: Version,
    seed: u32,
    entries: Vec<TestEntry>,
    sentinel: bool,
    content: bool,
}

impl ArchiveBuilder {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            seed: 0x1234_5678,
            entries: Vec::new(),
            sentinel: true,
            content: true,
        }
    }

    /// Header seed of an RGSS3A archive.
    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.entry(TestEntry::new(name, data))
    }

    pub fn entry(mut self, entry: TestEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// End the table at end of file instead of a zero-length record.
    pub fn without_sentinel(mut self) -> Self {
        self.sentinel = false;
        self
    }

    /// Stop after the entry table.
    pub fn without_content(mut self) -> Self {
        self.content = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = RawHeader::new(self.version).as_bytes().to_vec();
        if !self.version.is_legacy() {
            out.extend_from_slice(&self.seed.to_le_bytes());
        }

        let table_len: usize = self
            .entries
            .iter()
            .map(|e| 16 + e.name.len())
            .sum::<usize>()
            + if self.sentinel { 4 } else { 0 };

        let mut offset = out.len() + table_len;
        let mut placed = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            let key = entry
                .key
                .unwrap_or_else(|| 0x5EED_0000 ^ (index as u32).wrapping_mul(0x9E37_79B9));
            placed.push((entry, offset as u32, key));
            offset += entry.data.len();
        }

        if self.version.is_legacy() {
            self.write_legacy_table(&mut out, &placed);
        } else {
            self.write_rgss3_table(&mut out, &placed);
        }

        if self.content {
            for (entry, offset, key) in &placed {
                assert_eq!(out.len(), *offset as usize);
                let cipher = if self.version.is_legacy() {
                    encrypt_at(&entry.data, *offset as u64 - RawHeader::SIZE)
                } else {
                    encrypt_with(AffineKeyStream::new(*key), 0, &entry.data)
                };
                out.extend_from_slice(&cipher);
            }
        }

        out
    }

    fn write_legacy_table(&self, out: &mut Vec<u8>, placed: &[(&TestEntry, u32, u32)]) {
        let mut keys = AffineKeyStream::new(LEGACY_SEED);
        for (entry, offset, _) in placed {
            push_word(out, entry.name.len() as u32, &mut keys);
            for b in &entry.name {
                out.push(b ^ keys.next_key() as u8);
            }
            push_word(out, size_field(entry), &mut keys);
            push_word(out, LEGACY_STORED_KEY, &mut keys);
            push_word(out, offset_field(entry, *offset), &mut keys);
        }
        if self.sentinel {
            push_word(out, 0, &mut keys);
        }
    }

    fn write_rgss3_table(&self, out: &mut Vec<u8>, placed: &[(&TestEntry, u32, u32)]) {
        let key = format::table_key(self.seed);
        let lanes = key.to_le_bytes();

        for (entry, offset, entry_key) in placed {
            out.extend_from_slice(&(entry.name.len() as u32 ^ key).to_le_bytes());
            out.extend(entry.name.iter().enumerate().map(|(i, b)| b ^ lanes[i % 4]));
            out.extend_from_slice(&(size_field(entry) ^ key).to_le_bytes());
            out.extend_from_slice(&(offset_field(entry, *offset) ^ key).to_le_bytes());
            out.extend_from_slice(&(*entry_key ^ key).to_le_bytes());
        }
        if self.sentinel {
            out.extend_from_slice(&key.to_le_bytes());
        }
    }
}

fn push_word(out: &mut Vec<u8>, value: u32, keys: &mut AffineKeyStream) {
    out.extend_from_slice(&(value ^ keys.next_key()).to_le_bytes());
}

fn offset_field(entry: &TestEntry, placed: u32) -> u32 {
    entry.offset.unwrap_or(placed)
}

fn size_field(entry: &TestEntry) -> u32 {
    entry.size.unwrap_or(entry.data.len() as u32)
}

/// Encrypt bytes that sit `relative` bytes after the start of the shared stream.
fn encrypt_at(data: &[u8], relative: u64) -> Vec<u8> {
    let mut keys = AffineKeyStream::new(LEGACY_SEED);
    for _ in 0..relative / 4 {
        keys.next_key();
    }
    encrypt_with(keys, (relative % 4) as usize, data)
}

/// XOR `data` against `keys`, the first byte in lane `phase` of the first key.
fn encrypt_with(mut keys: AffineKeyStream, phase: usize, data: &[u8]) -> Vec<u8> {
    let mut lanes = keys.next_key().to_le_bytes();
    let mut lane = phase;
    data.iter()
        .map(|b| {
            if lane == 4 {
                lanes = keys.next_key().to_le_bytes();
                lane = 0;
            }
            let c = b ^ lanes[lane];
            lane += 1;
            c
        })
        .collect()
}

/// Deterministic filler content.
pub fn pattern(len: usize, salt: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(salt) ^ (i >> 8) as u8)
        .collect()
}
