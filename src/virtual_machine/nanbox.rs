//! NaN-boxed alternative word encoding.
//!
//! A boxed value is stored in the bit pattern of a quiet NaN: the exponent is
//! all ones, bits 48..=51 hold a 4-bit type tag and bits 0..=47 hold the
//! payload. Every tag has its top bit set, which is the quiet bit of the
//! mantissa, so a boxed value is always a NaN and never collides with a real
//! double. Ordinary doubles, infinities included, are stored unchanged.
//!
//! Integers and pointers are limited to 48 bits under this encoding.

use super::word::{Word, reinterpret};

const EXPONENT_MASK: u64 = 0x7FF << 52;
const TAG_SHIFT: u32 = 48;
const TAG_MASK: u64 = 0xF << TAG_SHIFT;
const PAYLOAD_MASK: u64 = (1 << TAG_SHIFT) - 1;
const PAYLOAD_BITS: u32 = 48;

const fn tag(n: u64) -> u64 {
    8 + n
}

const INTEGER_TAG: u64 = tag(1);
const POINTER_TAG: u64 = tag(2);

/// Positive infinity: all exponent bits set and an empty mantissa.
const INFINITY_BITS: u64 = EXPONENT_MASK;

/// A double, or a tagged 48-bit integer or pointer hidden inside a NaN.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NanBox(u64);

impl NanBox {
    pub const fn box_double(value: f64) -> Self {
        Self(reinterpret::f64_to_bits(value))
    }

    /// Boxes the low 48 bits of `value`.
    pub const fn box_integer(value: i64) -> Self {
        Self::boxed(INTEGER_TAG, reinterpret::i64_to_bits(value))
    }

    /// Boxes the low 48 bits of `handle`.
    pub const fn box_pointer(handle: u64) -> Self {
        Self::boxed(POINTER_TAG, handle)
    }

    const fn boxed(tag: u64, payload: u64) -> Self {
        let bits = INFINITY_BITS | (tag << TAG_SHIFT) | (payload & PAYLOAD_MASK);
        Self(bits)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u64 {
        self.0
    }

    const fn tag(self) -> u64 {
        (self.0 & TAG_MASK) >> TAG_SHIFT
    }

    const fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }

    /// True for every bit pattern that is not a NaN.
    pub const fn is_double(self) -> bool {
        !reinterpret::bits_to_f64(self.0).is_nan()
    }

    pub const fn is_integer(self) -> bool {
        !self.is_double() && self.tag() == INTEGER_TAG
    }

    pub const fn is_pointer(self) -> bool {
        !self.is_double() && self.tag() == POINTER_TAG
    }

    pub const fn as_double(self) -> f64 {
        reinterpret::bits_to_f64(self.0)
    }

    /// The 48-bit payload, sign-extended.
    pub const fn as_integer(self) -> i64 {
        let shift = 64 - PAYLOAD_BITS;
        reinterpret::bits_to_i64(self.payload() << shift) >> shift
    }

    /// The 48-bit payload, zero-extended.
    pub const fn as_pointer(self) -> u64 {
        self.payload()
    }
}

impl From<NanBox> for Word {
    fn from(value: NanBox) -> Self {
        Word::from_bits(value.to_bits())
    }
}

impl From<Word> for NanBox {
    fn from(value: Word) -> Self {
        NanBox::from_bits(value.as_u64())
    }
}
