//! RGSS key streams.
//!
//! Archive data is XORed against the output of the affine recurrence
//! `key' = key * 7 + 3 (mod 2^32)`. Advancing the recurrence is a ring
//! operation, so `n` steps collapse into a single affine transform. A table of
//! the transforms for `2^i` steps lets [`AffineKeyStream`] jump anywhere inside
//! a file in `O(log n)` instead of replaying from the start.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::trace;

use crate::{Error, Result};

/// Base step multiplier.
pub const MULTIPLIER: u32 = 7;

/// Base step addend.
pub const INCREMENT: u32 = 3;

/// Number of precomputed doubling levels.
///
/// Archive offsets are 32-bit and every key covers 4 bytes, so 2^30 steps
/// already span a whole archive.
pub const DOUBLING_LEVELS: usize = 30;

/// Exclusive upper bound for [`KeyStream::skip`] and [`KeyStream::rewind`] counts.
pub const MAX_JUMP: u64 = 1 << 31;

/// An affine map `key -> key * mul + add (mod 2^32)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Affine {
    pub mul: u32,
    pub add: u32,
}

impl Affine {
    /// The map that leaves every key unchanged.
    pub const IDENTITY: Self = Self::new(1, 0);

    /// The RGSS base step.
    pub const RGSS: Self = Self::new(MULTIPLIER, INCREMENT);

    #[inline]
    pub const fn new(mul: u32, add: u32) -> Self {
        Self { mul, add }
    }

    /// Apply the map to a key.
    #[inline]
    pub const fn apply(self, key: u32) -> u32 {
        key.wrapping_mul(self.mul).wrapping_add(self.add)
    }

    /// The map that applies `self` first and `next` second.
    ///
    /// `(m1, a1)` then `(m2, a2)` is `(m1 * m2, a1 * m2 + a2)`.
    #[inline]
    pub const fn then(self, next: Self) -> Self {
        Self {
            mul: self.mul.wrapping_mul(next.mul),
            add: self.add.wrapping_mul(next.mul).wrapping_add(next.add),
        }
    }

    /// The map applied twice.
    #[inline]
    pub const fn squared(self) -> Self {
        self.then(self)
    }

    /// The inverse map, if `mul` is invertible modulo 2^32.
    pub fn inverse(self) -> Option<Self> {
        let inv = mod_inverse(self.mul)?;
        Some(Self {
            mul: inv,
            add: self.add.wrapping_neg().wrapping_mul(inv),
        })
    }
}

/// Multiplicative inverse of `multiplier` modulo 2^32.
///
/// Extended Euclidean algorithm. Only odd multipliers have an inverse.
///
/// ```
/// use rgss_archive::crypto::mod_inverse;
///
/// assert_eq!(mod_inverse(7), Some(0xB6DB_6DB7));
/// assert_eq!(mod_inverse(6), None);
/// ```
pub fn mod_inverse(multiplier: u32) -> Option<u32> {
    const MODULUS: i64 = 1 << 32;

    let (mut old_r, mut r) = (i64::from(multiplier), MODULUS);
    let (mut old_s, mut s) = (1i64, 0i64);
    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }

    (old_r == 1).then(|| old_s.rem_euclid(MODULUS) as u32)
}

/// One row of a [`DoublingTable`]: the transform for `2^level` base steps and
/// the inverse of its multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoublingStep {
    pub forward: Affine,
    pub inverse_mul: Option<u32>,
}

impl DoublingStep {
    fn squared(self) -> Self {
        Self {
            forward: self.forward.squared(),
            inverse_mul: self.inverse_mul.map(|inv| inv.wrapping_mul(inv)),
        }
    }

    fn inverse(self) -> Option<Affine> {
        self.inverse_mul.map(|inv| Affine {
            mul: inv,
            add: self.forward.add.wrapping_neg().wrapping_mul(inv),
        })
    }
}

/// Transforms for `2^i` applications of a base step, `i < DOUBLING_LEVELS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoublingTable {
    steps: [DoublingStep; DOUBLING_LEVELS],
}

impl DoublingTable {
    /// Build the table by repeatedly squaring `base`.
    pub fn new(base: Affine) -> Self {
        let mut step = DoublingStep {
            forward: base,
            inverse_mul: mod_inverse(base.mul),
        };
        let mut steps = [step; DOUBLING_LEVELS];
        for slot in steps.iter_mut().skip(1) {
            step = step.squared();
            *slot = step;
        }
        Self { steps }
    }

    /// The shared table for the RGSS base step.
    pub fn standard() -> Arc<Self> {
        static TABLE: OnceLock<Arc<DoublingTable>> = OnceLock::new();
        TABLE
            .get_or_init(|| Arc::new(Self::new(Affine::RGSS)))
            .clone()
    }

    /// All precomputed rows, lowest level first.
    #[inline]
    pub fn steps(&self) -> &[DoublingStep] {
        &self.steps
    }

    /// The single-step row.
    #[inline]
    pub fn base(&self) -> DoublingStep {
        self.steps[0]
    }

    /// Whether backward jumps are possible.
    #[inline]
    pub fn is_rewindable(&self) -> bool {
        self.steps[0].inverse_mul.is_some()
    }

    /// Row for `2^level` steps; levels past the table square the top row.
    fn level(&self, level: usize) -> DoublingStep {
        let top = DOUBLING_LEVELS - 1;
        let mut step = self.steps[level.min(top)];
        for _ in top..level {
            step = step.squared();
        }
        step
    }

    /// The transform equivalent to `count` base steps.
    pub fn forward(&self, count: u64) -> Result<Affine> {
        check_jump(count)?;
        let mut acc = Affine::IDENTITY;
        for level in set_bits(count) {
            acc = acc.then(self.level(level).forward);
        }
        Ok(acc)
    }

    /// The transform undoing `count` base steps.
    pub fn backward(&self, count: u64) -> Result<Affine> {
        if !self.is_rewindable() {
            return Err(Error::RewindUnsupported);
        }
        check_jump(count)?;
        let mut acc = Affine::IDENTITY;
        for level in set_bits(count) {
            let inverse = self.level(level).inverse().ok_or(Error::RewindUnsupported)?;
            acc = acc.then(inverse);
        }
        Ok(acc)
    }
}

fn check_jump(count: u64) -> Result<()> {
    if count >= MAX_JUMP {
        return Err(Error::JumpOutOfRange { count });
    }
    Ok(())
}

/// Positions of the set bits of `n`, low to high.
fn set_bits(mut n: u64) -> impl Iterator<Item = usize> {
    let mut level = 0;
    std::iter::from_fn(move || {
        while n != 0 {
            let bit = n & 1 == 1;
            n >>= 1;
            level += 1;
            if bit {
                return Some(level - 1);
            }
        }
        None
    })
}

/// A source of 32-bit XOR keys.
pub trait KeyStream {
    /// Return the current key and advance by one step.
    fn next_key(&mut self) -> u32;

    /// Return the current key without advancing.
    fn peek(&self) -> u32;

    /// Advance as if [`next_key`](Self::next_key) ran `count` times.
    fn skip(&mut self, count: u64) -> Result<()>;

    /// Undo `count` steps.
    fn rewind(&mut self, count: u64) -> Result<()>;

    /// Undo the most recent [`next_key`](Self::next_key).
    fn rollback(&mut self) -> Result<()>;

    /// Return to the initialization value.
    fn reset(&mut self);

    /// Whether [`rewind`](Self::rewind) is available.
    fn can_rewind(&self) -> bool;
}

/// How a generator undoes a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rollback {
    /// Multiply by the inverse of the base step.
    Inverse,
    /// Restore the key cached by the last `next_key`.
    Cached(Option<u32>),
}

/// Generator for the affine recurrence with logarithmic jumps.
#[derive(Clone)]
pub struct AffineKeyStream {
    key: u32,
    seed: u32,
    table: Arc<DoublingTable>,
    rollback: Rollback,
}

impl AffineKeyStream {
    /// Create a generator over the RGSS base step.
    pub fn new(seed: u32) -> Self {
        Self::with_table(seed, DoublingTable::standard())
    }

    /// Create a generator over an arbitrary doubling table.
    pub fn with_table(seed: u32, table: Arc<DoublingTable>) -> Self {
        let rollback = if table.is_rewindable() {
            Rollback::Inverse
        } else {
            Rollback::Cached(None)
        };
        Self {
            key: seed,
            seed,
            table,
            rollback,
        }
    }

    /// The key [`reset`](KeyStream::reset) returns to.
    #[inline]
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Make the current key the new reset point.
    pub fn rebase(&mut self) {
        self.seed = self.key;
        self.forget();
    }

    fn forget(&mut self) {
        if let Rollback::Cached(slot) = &mut self.rollback {
            *slot = None;
        }
    }
}

impl KeyStream for AffineKeyStream {
    #[inline]
    fn next_key(&mut self) -> u32 {
        let key = self.key;
        self.key = self.table.base().forward.apply(key);
        if let Rollback::Cached(slot) = &mut self.rollback {
            *slot = Some(key);
        }
        key
    }

    #[inline]
    fn peek(&self) -> u32 {
        self.key
    }

    fn skip(&mut self, count: u64) -> Result<()> {
        check_jump(count)?;
        if count == 0 {
            return Ok(());
        }
        trace!(count, "skip key stream");
        match self.rollback {
            Rollback::Inverse => {
                self.key = self.table.forward(count)?.apply(self.key);
            }
            Rollback::Cached(_) => {
                // land one short and take the last step through the cache
                self.key = self.table.forward(count - 1)?.apply(self.key);
                self.next_key();
            }
        }
        Ok(())
    }

    fn rewind(&mut self, count: u64) -> Result<()> {
        let transform = self.table.backward(count)?;
        if count == 0 {
            return Ok(());
        }
        trace!(count, "rewind key stream");
        self.key = transform.apply(self.key);
        self.forget();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        match &mut self.rollback {
            Rollback::Inverse => {
                let step = self.table.base().inverse().ok_or(Error::RewindUnsupported)?;
                self.key = step.apply(self.key);
            }
            Rollback::Cached(slot) => {
                self.key = slot.take().ok_or(Error::RewindUnsupported)?;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.key = self.seed;
        self.forget();
    }

    #[inline]
    fn can_rewind(&self) -> bool {
        self.rollback == Rollback::Inverse
    }
}

impl fmt::Debug for AffineKeyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffineKeyStream")
            .field("key", &format_args!("{:#010x}", self.key))
            .field("seed", &format_args!("{:#010x}", self.seed))
            .field("base", &self.table.base().forward)
            .field("rewindable", &self.can_rewind())
            .finish()
    }
}

/// A key stream that never advances.
///
/// Used where every position is XORed with the same key, e.g. the RGSS3A
/// entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantKeyStream {
    key: u32,
}

impl ConstantKeyStream {
    #[inline]
    pub const fn new(key: u32) -> Self {
        Self { key }
    }
}

impl KeyStream for ConstantKeyStream {
    #[inline]
    fn next_key(&mut self) -> u32 {
        self.key
    }

    #[inline]
    fn peek(&self) -> u32 {
        self.key
    }

    fn skip(&mut self, _count: u64) -> Result<()> {
        Ok(())
    }

    fn rewind(&mut self, _count: u64) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {}

    #[inline]
    fn can_rewind(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const SEED: u32 = 0xDEAD_CAFE;

    fn stepped(seed: u32, count: u64) -> u32 {
        let mut keys = AffineKeyStream::new(seed);
        for _ in 0..count {
            keys.next_key();
        }
        keys.peek()
    }

    #[test]
    fn test_next_key_sequence() {
        let mut keys = AffineKeyStream::new(SEED);
        assert_eq!(keys.next_key(), SEED);
        assert_eq!(keys.next_key(), SEED.wrapping_mul(7).wrapping_add(3));
        assert_eq!(keys.peek(), keys.peek());
    }

    #[test]
    fn test_mod_inverse_of_seven() {
        let inv = mod_inverse(7).unwrap();
        assert_eq!(inv, 0xB6DB_6DB7);
        assert_eq!(inv.wrapping_mul(7), 1);
    }

    #[test]
    fn test_mod_inverse_of_even_is_none() {
        assert_eq!(mod_inverse(0), None);
        assert_eq!(mod_inverse(2), None);
        assert_eq!(mod_inverse(0x8000_0000), None);
    }

    #[test]
    fn test_mod_inverse_extremes() {
        assert_eq!(mod_inverse(1), Some(1));
        assert_eq!(mod_inverse(u32::MAX), Some(u32::MAX));
    }

    #[test]
    fn test_composition_order() {
        let first = Affine::new(5, 11);
        let second = Affine::new(9, 4);
        let key = 0x1234_5678;
        assert_eq!(first.then(second).apply(key), second.apply(first.apply(key)));
        assert_eq!(Affine::IDENTITY.then(first), first);
        assert_eq!(first.then(Affine::IDENTITY), first);
    }

    #[test]
    fn test_doubling_table_consistency() {
        let table = DoublingTable::standard();
        let steps = table.steps();
        assert_eq!(steps.len(), DOUBLING_LEVELS);
        assert_eq!(steps[0].forward, Affine::RGSS);
        for i in 0..=28 {
            assert_eq!(steps[i + 1].forward, steps[i].forward.then(steps[i].forward));
            let inv = steps[i + 1].inverse_mul.unwrap();
            assert_eq!(inv.wrapping_mul(steps[i + 1].forward.mul), 1);
        }
    }

    #[test]
    fn test_skip_matches_stepping() {
        for count in [0u64, 1, 2, 3, 4, 7, 8, 255, 256, 1000, 4097] {
            let mut keys = AffineKeyStream::new(SEED);
            keys.skip(count).unwrap();
            assert_eq!(keys.peek(), stepped(SEED, count), "count {count}");
        }
    }

    #[test]
    fn test_skip_composes_across_top_level() {
        // bit 30 lies above the precomputed table
        let big = (1u64 << 30) + 12_345;
        let mut whole = AffineKeyStream::new(SEED);
        whole.skip(big).unwrap();

        let mut split = AffineKeyStream::new(SEED);
        split.skip(1 << 29).unwrap();
        split.skip(1 << 29).unwrap();
        split.skip(12_345).unwrap();

        assert_eq!(whole.peek(), split.peek());
    }

    #[test]
    fn test_jump_bounds() {
        let mut keys = AffineKeyStream::new(SEED);
        keys.skip(MAX_JUMP - 1).unwrap();
        keys.rewind(MAX_JUMP - 1).unwrap();
        assert_eq!(keys.peek(), SEED);

        assert!(matches!(
            keys.skip(MAX_JUMP),
            Err(Error::JumpOutOfRange { count }) if count == MAX_JUMP
        ));
        assert!(matches!(
            keys.rewind(u64::MAX),
            Err(Error::JumpOutOfRange { .. })
        ));
        assert_eq!(keys.peek(), SEED);
    }

    #[test]
    fn test_rollback_after_next() {
        let mut keys = AffineKeyStream::new(SEED);
        keys.skip(10).unwrap();
        let before = keys.peek();
        keys.next_key();
        keys.rollback().unwrap();
        assert_eq!(keys.peek(), before);
    }

    #[test]
    fn test_reset_and_rebase() {
        let mut keys = AffineKeyStream::new(SEED);
        keys.skip(40).unwrap();
        let at_forty = keys.peek();
        keys.rebase();
        keys.skip(3).unwrap();
        keys.reset();
        assert_eq!(keys.peek(), at_forty);
        assert_eq!(keys.seed(), at_forty);
    }

    #[test]
    fn test_non_rewindable_generator() {
        let table = Arc::new(DoublingTable::new(Affine::new(6, 3)));
        assert!(!table.is_rewindable());

        let mut keys = AffineKeyStream::with_table(SEED, table);
        assert!(!keys.can_rewind());
        assert!(matches!(keys.rewind(1), Err(Error::RewindUnsupported)));

        let before = keys.peek();
        keys.next_key();
        keys.rollback().unwrap();
        assert_eq!(keys.peek(), before);

        // the single slot is spent
        assert!(matches!(keys.rollback(), Err(Error::RewindUnsupported)));

        keys.next_key();
        keys.skip(5).unwrap();
        let after_skip = keys.peek();
        keys.rollback().unwrap();
        keys.next_key();
        assert_eq!(keys.peek(), after_skip);

        keys.reset();
        assert!(matches!(keys.rollback(), Err(Error::RewindUnsupported)));
    }

    #[test]
    fn test_rollback_after_skip_without_inverse() {
        let table = Arc::new(DoublingTable::new(Affine::new(6, 3)));
        let mut skipped = AffineKeyStream::with_table(SEED, Arc::clone(&table));
        let mut stepped = AffineKeyStream::with_table(SEED, table);

        skipped.skip(9).unwrap();
        for _ in 0..8 {
            stepped.next_key();
        }
        skipped.rollback().unwrap();
        assert_eq!(skipped.peek(), stepped.peek());

        // a zero skip leaves the cached step alone
        let table = Arc::new(DoublingTable::new(Affine::new(6, 3)));
        let mut keys = AffineKeyStream::with_table(SEED, table);
        keys.next_key();
        keys.skip(0).unwrap();
        keys.rollback().unwrap();
        assert_eq!(keys.peek(), SEED);
    }

    #[test]
    fn test_constant_key_stream() {
        let mut keys = ConstantKeyStream::new(0x0BAD_F00D);
        assert_eq!(keys.next_key(), 0x0BAD_F00D);
        keys.skip(1_000).unwrap();
        keys.rewind(MAX_JUMP * 2).unwrap();
        keys.rollback().unwrap();
        keys.reset();
        assert_eq!(keys.next_key(), 0x0BAD_F00D);
        assert_eq!(keys.peek(), 0x0BAD_F00D);
    }

    proptest! {
        #[test]
        fn prop_skip_equals_stepping(seed in any::<u32>(), count in 0u64..3_000) {
            let mut keys = AffineKeyStream::new(seed);
            keys.skip(count).unwrap();
            prop_assert_eq!(keys.peek(), stepped(seed, count));
        }

        #[test]
        fn prop_skip_is_additive(seed in any::<u32>(), a in 0u64..(1 << 30), b in 0u64..(1 << 30)) {
            let mut split = AffineKeyStream::new(seed);
            split.skip(a).unwrap();
            split.skip(b).unwrap();

            let mut whole = AffineKeyStream::new(seed);
            whole.skip(a + b).unwrap();

            prop_assert_eq!(split.peek(), whole.peek());
        }

        #[test]
        fn prop_rewind_undoes_skip(seed in any::<u32>(), count in 0u64..MAX_JUMP) {
            let mut keys = AffineKeyStream::new(seed);
            keys.skip(count).unwrap();
            keys.rewind(count).unwrap();
            prop_assert_eq!(keys.peek(), seed);
        }

        #[test]
        fn prop_odd_multipliers_invert(half in any::<u32>()) {
            let odd = half | 1;
            let inv = mod_inverse(odd).unwrap();
            prop_assert_eq!(odd.wrapping_mul(inv), 1);
        }

        #[test]
        fn prop_affine_inverse(mul in any::<u32>(), add in any::<u32>(), key in any::<u32>()) {
            let map = Affine::new(mul | 1, add);
            let inverse = map.inverse().unwrap();
            prop_assert_eq!(inverse.apply(map.apply(key)), key);
        }
    }
}
