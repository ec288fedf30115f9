use std::path::PathBuf;
use thiserror::Error;

/// Runtime exceptions raised by the execution engine.
///
/// An exception ends the current run. The machine keeps it until it is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Exception {
    /// Push onto a full stack.
    #[error("stack overflow")]
    StackOverflow,
    /// Pop or peek with too few values, including `dup`/`swap` past the bottom.
    #[error("stack underflow")]
    StackUnderflow,
    /// Opcode tag outside the instruction set.
    #[error("invalid instruction")]
    InvalidInstruction,
    /// Instruction pointer outside the program.
    #[error("illegal instruction access")]
    IllegalInstructionAccess,
    /// Unknown native index, or a native rejected its arguments.
    #[error("illegal operation")]
    IllegalOperation,
    /// Integer division or modulo by zero.
    #[error("divide by zero")]
    DivideByZero,
}

/// An exception together with the address of the instruction that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{exception} at instruction {address}")]
pub struct Fault {
    pub exception: Exception,
    pub address: usize,
}

/// Fatal assembly error with its source position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}:{column}: {kind}")]
pub struct AsmError {
    /// 1-based source line.
    pub line: usize,
    /// 1-based column of the offending token.
    pub column: usize,
    pub kind: AsmErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmErrorKind {
    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),
    #[error("invalid numeric literal `{0}`")]
    InvalidLiteral(String),
    #[error("`{0}` expects an operand")]
    MissingOperand(&'static str),
    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),
    #[error("invalid label name `{0}`")]
    InvalidLabel(String),
    #[error("duplicate label `{0}`")]
    DuplicateLabel(String),
    #[error("undefined label `{0}`")]
    UndefinedLabel(String),
    #[error("program exceeds the capacity of {0} instructions")]
    ProgramTooLarge(usize),
}

/// Errors while loading or saving bytecode.
#[derive(Debug, Error)]
pub enum ProgramError {
    /// Byte length is not a whole number of instruction records.
    #[error("bytecode length {len} is not a multiple of the {record_size}-byte record size")]
    Misaligned { len: usize, record_size: usize },
    /// More instructions than the configured capacity.
    #[error("program has {count} instructions, capacity is {capacity}")]
    TooLarge { count: usize, capacity: usize },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Crate-level error for the file-oriented entry points and the CLI tools.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Asm(#[from] AsmError),
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
