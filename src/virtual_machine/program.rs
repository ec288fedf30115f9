//! Bytecode program representation and serialization.
//!
//! A serialized [`Program`] is a raw, headerless array of 9-byte records, one
//! per instruction in program order: the opcode tag followed by the operand
//! word in little-endian order. There is no magic number or version.

use crate::types::encoding::{Decode, DecodeError, Encode, Reader};
use crate::virtual_machine::config::DEFAULT_PROGRAM_CAPACITY;
use crate::virtual_machine::errors::{Exception, ProgramError};
use crate::virtual_machine::isa::Opcode;
use crate::virtual_machine::word::Word;
use std::fmt;
use std::fs;
use std::path::Path;

/// Size of one serialized instruction.
pub const RECORD_SIZE: usize = <Instruction as Encode>::WIDTH;

/// A single instruction: opcode tag plus one operand word.
///
/// The tag is kept undecoded so that bytecode with an unknown tag still loads;
/// it faults with [`Exception::InvalidInstruction`] only when executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    tag: u8,
    pub operand: Word,
}

impl Instruction {
    pub const fn new(opcode: Opcode, operand: Word) -> Self {
        Self {
            tag: opcode.tag(),
            operand,
        }
    }

    /// An instruction with a zero operand.
    pub const fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, Word::ZERO)
    }

    pub const fn from_raw(tag: u8, operand: Word) -> Self {
        Self { tag, operand }
    }

    pub const fn tag(&self) -> u8 {
        self.tag
    }

    /// Decodes the opcode tag.
    pub fn opcode(&self) -> Result<Opcode, Exception> {
        Opcode::try_from(self.tag)
    }
}

/// Assembly form of the instruction. Operands are shown as integers.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Ok(opcode) if opcode.arity() == 1 => {
                write!(f, "{} {}", opcode.mnemonic(), self.operand.as_i64())
            }
            Ok(opcode) => f.write_str(opcode.mnemonic()),
            Err(_) => write!(f, "<invalid {:#04x}>", self.tag),
        }
    }
}

impl Encode for Instruction {
    const WIDTH: usize = u8::WIDTH + Word::WIDTH;

    fn encode_into(&self, out: &mut Vec<u8>) {
        self.tag.encode_into(out);
        self.operand.encode_into(out);
    }
}

impl Decode for Instruction {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let tag = u8::decode(reader)?;
        let operand = Word::decode(reader)?;
        Ok(Self { tag, operand })
    }
}

/// An immutable, capacity-checked sequence of instructions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    /// Wraps `instructions`, rejecting more than `capacity` of them.
    pub fn new(instructions: Vec<Instruction>, capacity: usize) -> Result<Self, ProgramError> {
        if instructions.len() > capacity {
            return Err(ProgramError::TooLarge {
                count: instructions.len(),
                capacity,
            });
        }
        Ok(Self { instructions })
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, address: usize) -> Option<&Instruction> {
        self.instructions.get(address)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    /// Serializes the program to its raw record format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * RECORD_SIZE);
        for instruction in &self.instructions {
            instruction.encode_into(&mut out);
        }
        out
    }

    /// Deserializes a program, checking record alignment and `capacity`.
    pub fn from_bytes(bytes: &[u8], capacity: usize) -> Result<Self, ProgramError> {
        if !bytes.len().is_multiple_of(RECORD_SIZE) {
            return Err(ProgramError::Misaligned {
                len: bytes.len(),
                record_size: RECORD_SIZE,
            });
        }
        let count = bytes.len() / RECORD_SIZE;
        if count > capacity {
            return Err(ProgramError::TooLarge { count, capacity });
        }

        let instructions = bytes
            .chunks_exact(RECORD_SIZE)
            .map(Instruction::from_bytes)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ProgramError::Misaligned {
                len: bytes.len(),
                record_size: RECORD_SIZE,
            })?;
        Ok(Self { instructions })
    }

    /// Writes the program to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProgramError> {
        let path = path.as_ref();
        fs::write(path, self.to_bytes()).map_err(|source| ProgramError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads a program from `path`, rejecting more than `capacity` instructions.
    pub fn load(path: impl AsRef<Path>, capacity: usize) -> Result<Self, ProgramError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ProgramError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes, capacity)
    }
}

impl TryFrom<Vec<Instruction>> for Program {
    type Error = ProgramError;

    fn try_from(instructions: Vec<Instruction>) -> Result<Self, Self::Error> {
        Program::new(instructions, DEFAULT_PROGRAM_CAPACITY)
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}
