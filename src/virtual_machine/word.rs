//! The machine's 8-byte value unit.
//!
//! A [`Word`] carries no type information: the opcode that consumes it decides
//! whether its bits are read as a signed integer, a double or a heap handle.
//! Feeding a float to an integer opcode is not an error, just garbage.

use std::fmt;

/// Bit-level conversions between the three word interpretations.
///
/// Every reinterpretation in the crate goes through here.
pub mod reinterpret {
    #[inline]
    pub const fn i64_to_bits(value: i64) -> u64 {
        u64::from_ne_bytes(value.to_ne_bytes())
    }

    #[inline]
    pub const fn bits_to_i64(bits: u64) -> i64 {
        i64::from_ne_bytes(bits.to_ne_bytes())
    }

    #[inline]
    pub const fn f64_to_bits(value: f64) -> u64 {
        value.to_bits()
    }

    #[inline]
    pub const fn bits_to_f64(bits: u64) -> f64 {
        f64::from_bits(bits)
    }
}

/// An untyped 64-bit value.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Word(u64);

impl Word {
    pub const ZERO: Word = Word(0);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn from_i64(value: i64) -> Self {
        Self(reinterpret::i64_to_bits(value))
    }

    pub const fn from_f64(value: f64) -> Self {
        Self(reinterpret::f64_to_bits(value))
    }

    /// Wraps an opaque heap handle.
    pub const fn from_ptr(handle: u64) -> Self {
        Self(handle)
    }

    /// `true` is 1 and `false` is 0, as produced by the comparison opcodes.
    pub const fn from_bool(value: bool) -> Self {
        Self(value as u64)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn as_i64(self) -> i64 {
        reinterpret::bits_to_i64(self.0)
    }

    pub const fn as_f64(self) -> f64 {
        reinterpret::bits_to_f64(self.0)
    }

    pub const fn as_ptr(self) -> u64 {
        self.0
    }

    /// Any non-zero bit pattern is truthy.
    pub const fn is_truthy(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({:#018x})", self.0)
    }
}

impl From<i64> for Word {
    fn from(value: i64) -> Self {
        Word::from_i64(value)
    }
}

impl From<f64> for Word {
    fn from(value: f64) -> Self {
        Word::from_f64(value)
    }
}
