//! Quark library.
//!
//! A small stack-based virtual machine: an instruction set, a two-pass
//! assembler, an interpreter and a raw bytecode format.

pub mod types;
pub mod utils;
pub mod virtual_machine;
