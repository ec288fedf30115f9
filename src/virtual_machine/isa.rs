//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction table and hands it to a callback macro for code
//! generation, so the opcode enum, mnemonic lookup and operand introspection
//! are all generated from one list.
//!
//! # Bytecode Format
//!
//! Every instruction is a fixed 9-byte record:
//! - Opcode tag: 1 byte
//! - Operand: 8-byte little-endian [`Word`](super::word::Word), zero for
//!   instructions without an operand
//!
//! # Stack effects
//!
//! Binary opcodes take `b` from the top of the stack and `a` from beneath it,
//! pop both and push `a op b`. Comparisons push 1 for true and 0 for false.

use crate::virtual_machine::errors::Exception;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Stack shaping
            // =========================
            /// kaput ; does nothing
            Kaput = 0, "kaput" => [],
            /// put value ; push an integer or float immediate
            Put = 1, "put" => [value: Imm],
            /// dup n ; push a copy of the value n below the top
            Dup = 2, "dup" => [depth: Int],
            /// swap n ; exchange the top with the value n below it
            Swap = 3, "swap" => [depth: Int],
            /// drop ; discard the top
            Drop = 4, "drop" => [],
            // =========================
            // Integer arithmetic
            // =========================
            /// iplus ; a + b
            IPlus = 5, "iplus" => [],
            /// iminus ; a - b
            IMinus = 6, "iminus" => [],
            /// imul ; a * b
            IMul = 7, "imul" => [],
            /// idiv ; a / b (trap on division by zero)
            IDiv = 8, "idiv" => [],
            /// imod ; a % b (trap on division by zero)
            IMod = 9, "imod" => [],
            // =========================
            // Float arithmetic
            // =========================
            /// fplus ; a + b
            FPlus = 10, "fplus" => [],
            /// fminus ; a - b
            FMinus = 11, "fminus" => [],
            /// fmul ; a * b
            FMul = 12, "fmul" => [],
            /// fdiv ; a / b (IEEE-754, no trap)
            FDiv = 13, "fdiv" => [],
            /// fmod ; a % b (truncated remainder, no trap)
            FMod = 14, "fmod" => [],
            // =========================
            // Control flow
            // =========================
            /// jmp addr ; ip = addr
            Jmp = 15, "jmp" => [target: Addr],
            /// jif addr ; pop c ; if c != 0 then ip = addr
            Jif = 16, "jif" => [target: Addr],
            /// invoke addr ; push ip + 1 ; ip = addr
            Invoke = 17, "invoke" => [target: Addr],
            /// return ; ip = pop
            Return = 18, "return" => [],
            // =========================
            // Integer comparison
            // =========================
            /// ieq ; a == b
            IEq = 19, "ieq" => [],
            /// igt ; a > b
            IGt = 20, "igt" => [],
            /// ilt ; a < b
            ILt = 21, "ilt" => [],
            /// ige ; a >= b
            IGe = 22, "ige" => [],
            /// ile ; a <= b
            ILe = 23, "ile" => [],
            // =========================
            // Float comparison
            // =========================
            /// feq ; a == b
            FEq = 24, "feq" => [],
            /// fgt ; a > b
            FGt = 25, "fgt" => [],
            /// flt ; a < b
            FLt = 26, "flt" => [],
            /// fge ; a >= b
            FGe = 27, "fge" => [],
            /// fle ; a <= b
            FLe = 28, "fle" => [],
            /// not ; top = (top == 0), in place
            Not = 29, "not" => [],
            // =========================
            // Host interface
            // =========================
            /// native n ; call the native registered at index n
            Native = 30, "native" => [index: Int],
            /// stop ; halt without advancing ip
            Stop = 31, "stop" => [],
        }
    };
}

/// Kind of immediate an operand-taking instruction accepts in assembly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Integer literal, falling back to a float literal.
    Imm,
    /// Integer literal only.
    Int,
    /// Integer address, or a label resolved after parsing.
    Addr,
}

macro_rules! define_instructions {
    (@operand) => { None };
    (@operand $kind:ident) => { Some(OperandKind::$kind) };
    (
        $( $(#[$doc:meta])* $name:ident = $opcode:literal, $mnemonic:literal => [ $( $field:ident : $kind:ident ),* $(,)? ] ),* $(,)?
    ) => {
        /// Decoded opcode of a VM instruction.
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $opcode, )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = Exception;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(Exception::InvalidInstruction),
                }
            }
        }

        impl Opcode {
            /// Every opcode, in tag order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Returns the assembly mnemonic.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the operand kind, or `None` for instructions without one.
            pub const fn operand(self) -> Option<OperandKind> {
                match self {
                    $( Opcode::$name => define_instructions!(@operand $( $kind )*), )*
                }
            }

            /// Looks up an opcode by its mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Opcode> {
                match name {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

/// First tag past the end of the instruction set. Tags at or above it are invalid.
pub const OPCODE_COUNT: u8 = Opcode::ALL.len() as u8;

impl Opcode {
    /// Number of operands the instruction takes: 0 or 1.
    pub const fn arity(self) -> usize {
        match self.operand() {
            Some(_) => 1,
            None => 0,
        }
    }

    pub const fn tag(self) -> u8 {
        self as u8
    }
}
