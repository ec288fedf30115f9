//! Stack-based bytecode virtual machine.
//!
//! Source text is assembled into a [`program::Program`], which a
//! [`vm::Machine`] executes against an operand stack. Host functionality is
//! reached only through natives registered in a [`native::NativeRegistry`].
//!
//! # Architecture
//!
//! - **Words**: untyped 64-bit values; each opcode picks the interpretation
//!   (integer, float or heap handle)
//! - **Stack**: bounded, shared by operands and return addresses
//! - **Instruction format**: fixed 9-byte records, opcode tag plus one operand word
//! - **Execution model**: single-step or run with an instruction budget
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, label resolution and diagnostics
//! - [`config`]: Capacity limits
//! - [`errors`]: Runtime exceptions, assembly and loading errors
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`nanbox`]: NaN-boxed alternative value encoding
//! - [`native`]: Native function registry and the standard natives
//! - [`program`]: Instructions, programs and the bytecode file format
//! - [`vm`]: Execution engine
//! - [`word`]: The 8-byte value unit and bit reinterpretation

pub mod assembler;
pub mod config;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod nanbox;
pub mod native;
pub mod program;
pub mod vm;
pub mod word;
