// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// A fixed width bit vector covering the lines of a request.
///
/// Bits are indexed by position within the request's offsets, not by
/// line offset.
///
/// Used both to select lines (a mask) and to carry their values (bits).
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Bitmask(u64);

impl Bitmask {
    /// The number of bits available.
    pub const WIDTH: usize = 64;

    /// Create a mask from its raw representation.
    #[inline]
    pub const fn new(bits: u64) -> Bitmask {
        Bitmask(bits)
    }

    /// Create a mask with the bits at the given indices set.
    ///
    /// Indices beyond the width are ignored.
    pub fn from_indices<I: IntoIterator<Item = usize>>(idxs: I) -> Bitmask {
        let mut m = Bitmask::default();
        for idx in idxs.into_iter().filter(|i| *i < Self::WIDTH) {
            m.set(idx, true);
        }
        m
    }

    /// A mask with the lowest `n` bits set.
    #[inline]
    pub fn lower(n: usize) -> Bitmask {
        if n >= Self::WIDTH {
            Bitmask(u64::MAX)
        } else {
            Bitmask((1u64 << n) - 1)
        }
    }

    /// The raw representation.
    #[inline]
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// The state of the bit at `idx`.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        (self.0 >> idx) & 1 != 0
    }

    /// Set the bit at `idx` to `value`.
    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        self.0 = (self.0 & !(1 << idx)) | ((value as u64) << idx);
    }

    /// Clear the bit at `idx`.
    #[inline]
    pub fn clear(&mut self, idx: usize) {
        self.0 &= !(1 << idx);
    }

    /// The number of bits set.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// True if no bits are set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate over the indices of the set bits, in ascending order.
    pub fn iter(&self) -> Iter {
        Iter(self.0)
    }
}

impl From<u64> for Bitmask {
    fn from(bits: u64) -> Self {
        Bitmask(bits)
    }
}

impl From<Bitmask> for u64 {
    fn from(m: Bitmask) -> Self {
        m.0
    }
}

impl std::ops::BitAnd for Bitmask {
    type Output = Bitmask;

    fn bitand(self, rhs: Bitmask) -> Bitmask {
        Bitmask(self.0 & rhs.0)
    }
}

impl std::ops::BitOr for Bitmask {
    type Output = Bitmask;

    fn bitor(self, rhs: Bitmask) -> Bitmask {
        Bitmask(self.0 | rhs.0)
    }
}

impl std::ops::Not for Bitmask {
    type Output = Bitmask;

    fn not(self) -> Bitmask {
        Bitmask(!self.0)
    }
}

impl IntoIterator for Bitmask {
    type Item = usize;
    type IntoIter = Iter;

    fn into_iter(self) -> Iter {
        Iter(self.0)
    }
}

/// An iterator over the set bits of a [`Bitmask`].
#[derive(Clone, Debug)]
pub struct Iter(u64);

impl Iterator for Iter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let idx = self.0.trailing_zeros() as usize;
        // clear the lowest set bit
        self.0 &= self.0 - 1;
        Some(idx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Iter {}
