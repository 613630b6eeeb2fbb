//! XOR decryption of archive bytes against a key stream.

use std::io::{Read, Seek};

use byteorder::{ByteOrder, LittleEndian};

use crate::crypto::KeyStream;
use crate::source::ByteSource;
use crate::{Error, Result};

/// Decrypts bytes read from a [`ByteSource`] with one key stream.
///
/// The reader keeps its own access point but never trusts it across calls:
/// every physical read pulls the source cursor first and pushes the advanced
/// position back afterwards. Callers hold the source lock for the cycle.
#[derive(Debug, Clone)]
pub struct DecryptingReader<K> {
    keys: K,
    access: u64,
}

impl<K: KeyStream> DecryptingReader<K> {
    pub fn new(keys: K) -> Self {
        Self { keys, access: 0 }
    }

    /// The key stream.
    #[inline]
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// The key stream, for repositioning.
    #[inline]
    pub fn keys_mut(&mut self) -> &mut K {
        &mut self.keys
    }

    /// Source position right after the last physical read.
    #[inline]
    pub fn access_point(&self) -> u64 {
        self.access
    }

    pub fn into_keys(self) -> K {
        self.keys
    }

    fn physical_read<R: Read + Seek>(
        &mut self,
        source: &mut ByteSource<R>,
        buf: &mut [u8],
    ) -> Result<()> {
        self.access = source.cursor();
        source.read_exact_at_cursor(buf)?;
        self.access += buf.len() as u64;
        source.set_cursor(self.access);
        Ok(())
    }

    /// Read `count` bytes, each XORed with the low byte of its own key.
    pub fn read_bytes<R: Read + Seek>(
        &mut self,
        source: &mut ByteSource<R>,
        count: usize,
    ) -> Result<Vec<u8>> {
        let mut buf = alloc(count)?;
        self.physical_read(source, &mut buf)?;
        for b in buf.iter_mut() {
            *b ^= self.keys.next_key() as u8;
        }
        Ok(buf)
    }

    /// Read `count` little-endian words, each XORed with a full key.
    pub fn read_words<R: Read + Seek>(
        &mut self,
        source: &mut ByteSource<R>,
        count: usize,
    ) -> Result<Vec<u8>> {
        let len = count.checked_mul(4).ok_or(Error::Allocation(usize::MAX))?;
        let mut buf = alloc(len)?;
        self.physical_read(source, &mut buf)?;
        self.xor_words(&mut buf);
        Ok(buf)
    }

    /// Read a single decrypted word.
    pub fn read_word<R: Read + Seek>(&mut self, source: &mut ByteSource<R>) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.physical_read(source, &mut buf)?;
        Ok(LittleEndian::read_u32(&buf) ^ self.keys.next_key())
    }

    /// Read `count` bytes that need not start or end on a key boundary.
    ///
    /// `left_pad` is the byte position of the first requested byte inside its
    /// key word. Every touched word consumes a full key; when the range ends
    /// inside a word the last key is rolled back, so the stream sits on the key
    /// of the word the next byte belongs to.
    pub fn read_unaligned<R: Read + Seek>(
        &mut self,
        source: &mut ByteSource<R>,
        count: usize,
        left_pad: usize,
    ) -> Result<Vec<u8>> {
        if left_pad > 3 {
            return Err(Error::InvalidPadding(left_pad));
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let span = count
            .checked_add(left_pad)
            .ok_or(Error::Allocation(usize::MAX))?;
        let words = span.div_ceil(4);
        let mut buf = alloc(words * 4)?;

        self.physical_read(source, &mut buf[left_pad..span])?;
        self.xor_words(&mut buf);

        if span % 4 != 0 {
            self.keys.rollback()?;
        }

        buf.truncate(span);
        buf.drain(..left_pad);
        Ok(buf)
    }

    fn xor_words(&mut self, buf: &mut [u8]) {
        for word in buf.chunks_exact_mut(4) {
            let plain = LittleEndian::read_u32(word) ^ self.keys.next_key();
            LittleEndian::write_u32(word, plain);
        }
    }
}

fn alloc(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::Allocation(len))?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;
    use crate::crypto::{AffineKeyStream, ConstantKeyStream};

    const SEED: u32 = 0xDEAD_CAFE;

    fn source(data: Vec<u8>) -> ByteSource<Cursor<Vec<u8>>> {
        ByteSource::new(Cursor::new(data)).unwrap()
    }

    /// Encrypt `plain` word-granular starting at key word 0.
    fn encrypt_words(seed: u32, plain: &[u8]) -> Vec<u8> {
        let mut keys = AffineKeyStream::new(seed);
        let mut key = [0u8; 4];
        plain
            .iter()
            .enumerate()
            .map(|(i, b)| {
                if i % 4 == 0 {
                    key = keys.next_key().to_le_bytes();
                }
                b ^ key[i % 4]
            })
            .collect()
    }

    #[test]
    fn test_read_bytes() {
        let mut keys = AffineKeyStream::new(SEED);
        let cipher: Vec<u8> = b"Scripts"
            .iter()
            .map(|b| b ^ keys.next_key() as u8)
            .collect();

        let mut src = source(cipher);
        let mut reader = DecryptingReader::new(AffineKeyStream::new(SEED));
        assert_eq!(reader.read_bytes(&mut src, 7).unwrap(), b"Scripts");
        assert_eq!(reader.keys().peek(), keys.peek());
        assert_eq!(src.cursor(), 7);
        assert_eq!(reader.access_point(), 7);
    }

    #[test]
    fn test_read_words() {
        let plain: Vec<u8> = (0u8..12).collect();
        let mut src = source(encrypt_words(SEED, &plain));
        let mut reader = DecryptingReader::new(AffineKeyStream::new(SEED));

        assert_eq!(reader.read_words(&mut src, 3).unwrap(), plain);

        let mut expected = AffineKeyStream::new(SEED);
        expected.skip(3).unwrap();
        assert_eq!(reader.keys().peek(), expected.peek());
    }

    #[test]
    fn test_read_word() {
        let mut src = source((0x1234_5678u32 ^ SEED).to_le_bytes().to_vec());
        let mut reader = DecryptingReader::new(AffineKeyStream::new(SEED));
        assert_eq!(reader.read_word(&mut src).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_reader_follows_source_cursor() {
        let plain: Vec<u8> = (0u8..16).collect();
        let mut src = source(encrypt_words(SEED, &plain));
        let mut reader = DecryptingReader::new(AffineKeyStream::new(SEED));
        reader.keys_mut().skip(2).unwrap();

        // another consumer moved the cursor in between
        src.set_cursor(8);
        assert_eq!(reader.read_words(&mut src, 1).unwrap(), [8, 9, 10, 11]);
        assert_eq!(src.cursor(), 12);
    }

    #[test]
    fn test_read_unaligned_middle_of_word() {
        let plain: Vec<u8> = (100u8..120).collect();
        let mut src = source(encrypt_words(SEED, &plain));
        let mut reader = DecryptingReader::new(AffineKeyStream::new(SEED));
        reader.keys_mut().skip(1).unwrap();
        src.set_cursor(5);

        // bytes 5..11 live in words 1 and 2
        let out = reader.read_unaligned(&mut src, 6, 1).unwrap();
        assert_eq!(out, &plain[5..11]);

        // ends inside word 2, so the stream is back on word 2's key
        let mut expected = AffineKeyStream::new(SEED);
        expected.skip(2).unwrap();
        assert_eq!(reader.keys().peek(), expected.peek());
        assert_eq!(src.cursor(), 11);
    }

    #[test]
    fn test_read_unaligned_exact_words() {
        let plain: Vec<u8> = (0u8..8).collect();
        let mut src = source(encrypt_words(SEED, &plain));
        let mut reader = DecryptingReader::new(AffineKeyStream::new(SEED));

        assert_eq!(reader.read_unaligned(&mut src, 8, 0).unwrap(), plain);
        let mut expected = AffineKeyStream::new(SEED);
        expected.skip(2).unwrap();
        assert_eq!(reader.keys().peek(), expected.peek());
    }

    #[test]
    fn test_read_unaligned_constant_key() {
        let key = 0x0102_0304u32;
        let cipher: Vec<u8> = b"Data\\Map001.rvdata2"
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key.to_le_bytes()[i % 4])
            .collect();
        let mut src = source(cipher);
        let mut reader = DecryptingReader::new(ConstantKeyStream::new(key));

        let out = reader.read_unaligned(&mut src, 19, 0).unwrap();
        assert_eq!(out, b"Data\\Map001.rvdata2");
    }

    #[test]
    fn test_read_unaligned_rejects_padding() {
        let mut src = source(vec![0u8; 8]);
        let mut reader = DecryptingReader::new(AffineKeyStream::new(SEED));
        assert!(matches!(
            reader.read_unaligned(&mut src, 1, 4),
            Err(Error::InvalidPadding(4))
        ));
        assert_eq!(reader.keys().peek(), SEED);
    }

    #[test]
    fn test_read_unaligned_empty() {
        let mut src = source(vec![0u8; 8]);
        let mut reader = DecryptingReader::new(AffineKeyStream::new(SEED));
        assert!(reader.read_unaligned(&mut src, 0, 3).unwrap().is_empty());
        assert_eq!(reader.keys().peek(), SEED);
        assert_eq!(src.cursor(), 0);
    }

    #[test]
    fn test_truncated_read_leaves_state() {
        let mut src = source(vec![0u8; 6]);
        let mut reader = DecryptingReader::new(AffineKeyStream::new(SEED));
        let err = reader.read_words(&mut src, 2).unwrap_err();
        assert!(matches!(err, Error::Truncated { offset: 0, .. }));
        assert_eq!(reader.keys().peek(), SEED);
        assert_eq!(src.cursor(), 0);
    }

    proptest! {
        #[test]
        fn prop_unaligned_then_words_keeps_key_position(
            pad in 0usize..4,
            count in 1usize..64,
            follow in 0usize..4,
        ) {
            let total = pad + count + follow * 4 + 4;
            let plain: Vec<u8> = (0..total).map(|i| i as u8).collect();
            let mut src = source(encrypt_words(SEED, &plain));
            let mut reader = DecryptingReader::new(AffineKeyStream::new(SEED));

            src.set_cursor(pad as u64);
            let out = reader.read_unaligned(&mut src, count, pad).unwrap();
            prop_assert_eq!(&out[..], &plain[pad..pad + count]);

            // stepping word by word over the same span ends on the word of
            // the next unread byte
            let mut stepped = AffineKeyStream::new(SEED);
            for _ in 0..(pad + count) / 4 {
                stepped.next_key();
            }
            prop_assert_eq!(reader.keys().peek(), stepped.peek());

            reader.read_words(&mut src, follow).unwrap();
            for _ in 0..follow {
                stepped.next_key();
            }
            prop_assert_eq!(reader.keys().peek(), stepped.peek());
        }
    }
}
