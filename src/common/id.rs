//! Node Id or a lookup target
use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use crate::{Error, Result};

/// The size of node IDs in bytes.
pub const ID_SIZE: usize = 20;
/// The size of node IDs in bits.
pub const ID_BITS: u32 = ID_SIZE as u32 * 8;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
/// Node Id or a lookup target, a big-endian 160 bit unsigned integer.
///
/// The derived ordering is the numeric ordering, which is also the
/// clockwise order on the ring starting from zero.
pub struct Id(pub(crate) [u8; ID_SIZE]);

impl Id {
    /// The zero Id.
    pub const ZERO: Id = Id([0; ID_SIZE]);

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp.copy_from_slice(bytes);

        Ok(Id(tmp))
    }

    /// Id with only the `bit`-th least significant bit set, i.e. `2^bit`.
    ///
    /// `bit` must be lower than [ID_BITS].
    pub fn pow2(bit: u32) -> Id {
        debug_assert!(bit < ID_BITS);

        let mut bytes = [0; ID_SIZE];
        let byte = ID_SIZE - 1 - (bit / 8) as usize;
        bytes[byte] = 1 << (bit % 8);

        Id(bytes)
    }

    /// Convenience for small values in tests and examples.
    pub fn from_u64(value: u64) -> Id {
        let mut bytes = [0; ID_SIZE];
        bytes[ID_SIZE - 8..].copy_from_slice(&value.to_be_bytes());

        Id(bytes)
    }

    /// `self + other mod 2^160`
    pub fn wrapping_add(&self, other: &Id) -> Id {
        let mut out = [0; ID_SIZE];
        let mut carry = 0u16;

        for i in (0..ID_SIZE).rev() {
            let sum = self.0[i] as u16 + other.0[i] as u16 + carry;
            out[i] = sum as u8;
            carry = sum >> 8;
        }

        Id(out)
    }

    /// `self - other mod 2^160`
    pub fn wrapping_sub(&self, other: &Id) -> Id {
        let mut out = [0; ID_SIZE];
        let mut borrow = 0i16;

        for i in (0..ID_SIZE).rev() {
            let mut diff = self.0[i] as i16 - other.0[i] as i16 - borrow;
            borrow = 0;
            if diff < 0 {
                diff += 256;
                borrow = 1;
            }
            out[i] = diff as u8;
        }

        Id(out)
    }

    /// Keep only the `bits` least significant bits.
    pub fn masked(&self, bits: u32) -> Id {
        if bits >= ID_BITS {
            return *self;
        }

        let mut out = self.0;
        let cleared_bits = (ID_BITS - bits) as usize;

        for byte in out.iter_mut().take(cleared_bits / 8) {
            *byte = 0;
        }
        if cleared_bits % 8 != 0 {
            out[cleared_bits / 8] &= 0xff >> (cleared_bits % 8);
        }

        Id(out)
    }

    /// The 4 bit group (hex digit) starting at bit `offset`, counting from
    /// the most significant bit. `offset` must be a multiple of 4.
    pub(crate) fn nibble_at(&self, offset: u32) -> u8 {
        let byte = self.0[(offset / 8) as usize];

        if offset % 8 == 0 {
            byte >> 4
        } else {
            byte & 0x0f
        }
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }

        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Id> {
        if s.len() != ID_SIZE * 2 || !s.is_ascii() {
            return Err(Error::InvalidIdEncoding(s.to_string()));
        }

        let mut bytes = [0; ID_SIZE];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::InvalidIdEncoding(s.to_string()))?;
        }

        Ok(Id(bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let id = Id::from_str("5a3ce9c14e7a08645677bbd1cfe7d8f956d53256").unwrap();

        assert_eq!(id.to_string(), "5a3ce9c14e7a08645677bbd1cfe7d8f956d53256");
        assert!(Id::from_str("5a3c").is_err());
        assert!(Id::from_str("zz3ce9c14e7a08645677bbd1cfe7d8f956d53256").is_err());
    }

    #[test]
    fn from_bytes_checks_length() {
        assert_eq!(Id::from_bytes([0u8; 19]), Err(Error::InvalidIdSize(19)));
        assert_eq!(Id::from_bytes([0u8; 20]).unwrap(), Id::ZERO);
    }

    #[test]
    fn add_and_sub_wrap() {
        let max = Id([0xff; ID_SIZE]);
        let one = Id::from_u64(1);

        assert_eq!(max.wrapping_add(&one), Id::ZERO);
        assert_eq!(Id::ZERO.wrapping_sub(&one), max);
        assert_eq!(
            Id::from_u64(300).wrapping_sub(&Id::from_u64(45)),
            Id::from_u64(255)
        );
        assert_eq!(
            Id::from_u64(255).wrapping_add(&Id::from_u64(1)),
            Id::from_u64(256)
        );
    }

    #[test]
    fn pow2() {
        assert_eq!(Id::pow2(0), Id::from_u64(1));
        assert_eq!(Id::pow2(9), Id::from_u64(512));
        assert_eq!(Id::pow2(159).0[0], 0x80);
    }

    #[test]
    fn masked() {
        let max = Id([0xff; ID_SIZE]);

        assert_eq!(max.masked(16), Id::from_u64(0xffff));
        assert_eq!(max.masked(12), Id::from_u64(0x0fff));
        assert_eq!(max.masked(160), max);
    }

    #[test]
    fn nibbles() {
        let id = Id::from_str("a1b2000000000000000000000000000000000000").unwrap();

        assert_eq!(id.nibble_at(0), 0xa);
        assert_eq!(id.nibble_at(4), 0x1);
        assert_eq!(id.nibble_at(8), 0xb);
        assert_eq!(id.nibble_at(12), 0x2);
    }
}
