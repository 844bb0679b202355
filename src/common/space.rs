//! Identifier space: hashing names and keys onto the ring, and the ring
//! arithmetic both protocols route with.

use std::cmp::Ordering;

use sha1_smol::Sha1;

use crate::common::{Id, ID_BITS};
use crate::{Error, Result};

/// Bits per digit in the prefix protocol (base 16).
pub const DIGIT_BITS: u32 = 4;
/// Number of distinct digit values.
pub const DIGIT_BASE: usize = 1 << DIGIT_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// An identifier space of `2^bits` points arranged on a ring.
///
/// Ids handed out by a space only ever have their `bits` least significant
/// bits set, and all arithmetic wraps modulo `2^bits`.
pub struct IdSpace {
    bits: u32,
}

impl IdSpace {
    /// Create a space of `bits` bits. Fails if `bits` is zero or exceeds [ID_BITS].
    pub fn new(bits: u32) -> Result<Self> {
        if bits == 0 || bits > ID_BITS {
            return Err(Error::InvalidConfig("id_bits must be within 1..=160"));
        }

        Ok(IdSpace { bits })
    }

    /// Full 160 bit space, the width of a SHA-1 digest.
    pub fn full() -> Self {
        IdSpace { bits: ID_BITS }
    }

    // === Getters ===

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of base 16 digits an Id of this space has.
    pub fn digits(&self) -> usize {
        (self.bits / DIGIT_BITS) as usize
    }

    // === Hashing ===

    /// One-way hash of arbitrary bytes into this space.
    pub fn hash(&self, data: &[u8]) -> Id {
        let digest = Sha1::from(data).digest().bytes();

        Id(digest).masked(self.bits)
    }

    /// Identifier of a record key.
    pub fn key_id(&self, key: &str) -> Id {
        self.hash(key.as_bytes())
    }

    /// Identifier of a node from its name.
    pub fn node_id(&self, name: &str) -> Id {
        self.hash(name.as_bytes())
    }

    // === Ring arithmetic ===

    /// `id + 2^bit mod 2^bits`, the start of finger `bit`.
    pub fn offset(&self, id: &Id, bit: u32) -> Id {
        id.wrapping_add(&Id::pow2(bit)).masked(self.bits)
    }

    /// `id - 2^bit mod 2^bits`
    pub fn offset_back(&self, id: &Id, bit: u32) -> Id {
        id.wrapping_sub(&Id::pow2(bit)).masked(self.bits)
    }

    /// Clockwise distance walking from `from` to `to`.
    pub fn clockwise(&self, from: &Id, to: &Id) -> Id {
        to.wrapping_sub(from).masked(self.bits)
    }

    /// Shortest distance between two points in either direction.
    pub fn ring_distance(&self, a: &Id, b: &Id) -> Id {
        self.clockwise(a, b).min(self.clockwise(b, a))
    }

    /// `x` in the open interval `(from, to)` walking clockwise.
    ///
    /// When `from == to` the interval is the whole ring except `from`.
    pub fn in_open(&self, x: &Id, from: &Id, to: &Id) -> bool {
        let offset = self.clockwise(from, x);
        let span = self.clockwise(from, to);

        if span == Id::ZERO {
            return offset != Id::ZERO;
        }

        offset != Id::ZERO && offset < span
    }

    /// `x` in `(from, to]` walking clockwise.
    ///
    /// When `from == to` the interval is the whole ring.
    pub fn in_half_open(&self, x: &Id, from: &Id, to: &Id) -> bool {
        let span = self.clockwise(from, to);

        if span == Id::ZERO {
            return true;
        }

        let offset = self.clockwise(from, x);

        offset != Id::ZERO && offset <= span
    }

    /// `x` in `[from, to)` walking clockwise. Empty when `from == to`.
    pub fn in_closed_open(&self, x: &Id, from: &Id, to: &Id) -> bool {
        self.clockwise(from, x) < self.clockwise(from, to)
    }

    /// Orders `a` and `b` by numeric closeness to `target`, ties going to
    /// the smaller Id.
    pub fn cmp_closeness(&self, target: &Id, a: &Id, b: &Id) -> Ordering {
        self.ring_distance(a, target)
            .cmp(&self.ring_distance(b, target))
            .then_with(|| a.cmp(b))
    }

    // === Digits ===

    /// The `index`-th base 16 digit, most significant first.
    pub fn digit(&self, id: &Id, index: usize) -> u8 {
        debug_assert!(index < self.digits());

        let offset = ID_BITS - self.bits + DIGIT_BITS * index as u32;
        id.nibble_at(offset)
    }

    /// Number of leading digits `a` and `b` have in common.
    pub fn shared_prefix_len(&self, a: &Id, b: &Id) -> usize {
        (0..self.digits())
            .take_while(|&i| self.digit(a, i) == self.digit(b, i))
            .count()
    }
}

impl Default for IdSpace {
    fn default() -> Self {
        Self::full()
    }
}
