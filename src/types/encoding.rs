//! Fixed-width little-endian codec for the bytecode format.
//!
//! Every encodable type has a constant [`Encode::WIDTH`], so a `.qce` file can
//! be split into records before any of them is decoded. Byte order does not
//! depend on the host.
//!
//! ```
//! use quark::types::encoding::{Decode, Encode};
//!
//! let bytes = 0x0102u64.to_bytes();
//! assert_eq!(bytes, [2, 1, 0, 0, 0, 0, 0, 0]);
//! assert_eq!(u64::from_bytes(&bytes), Ok(0x0102));
//! ```

use crate::virtual_machine::word::Word;
use thiserror::Error;

pub trait Encode {
    /// Number of bytes produced by [`encode_into`](Encode::encode_into).
    const WIDTH: usize;

    /// Appends exactly `WIDTH` bytes to `out`.
    fn encode_into(&self, out: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIDTH);
        self.encode_into(&mut out);
        out
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("input ended after {read} of {wanted} bytes")]
    Truncated { read: usize, wanted: usize },
    #[error("{0} bytes left over after decoding")]
    TrailingBytes(usize),
}

/// Cursor over a byte slice that hands out fixed-size chunks.
pub struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }

    /// Takes the next `N` bytes.
    pub fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        match self.bytes.split_first_chunk::<N>() {
            Some((chunk, rest)) => {
                self.bytes = rest;
                Ok(*chunk)
            }
            None => Err(DecodeError::Truncated {
                read: self.bytes.len(),
                wanted: N,
            }),
        }
    }
}

pub trait Decode: Sized {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decodes one value that must span all of `bytes`.
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);
        let value = Self::decode(&mut reader)?;
        match reader.remaining() {
            0 => Ok(value),
            left => Err(DecodeError::TrailingBytes(left)),
        }
    }
}

macro_rules! le_codec {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                fn encode_into(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }

            impl Decode for $t {
                fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
                    reader.take().map(<$t>::from_le_bytes)
                }
            }
        )*
    };
}

le_codec!(u8, u64, i64);

impl Encode for Word {
    const WIDTH: usize = u64::WIDTH;

    fn encode_into(&self, out: &mut Vec<u8>) {
        self.as_u64().encode_into(out);
    }
}

impl Decode for Word {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        u64::decode(reader).map(Word::from_bits)
    }
}
