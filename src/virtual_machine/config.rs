//! Capacity ceilings for programs, the operand stack and the heap.

use crate::warn;
use std::str::FromStr;

/// Default maximum number of words on the operand stack.
pub const DEFAULT_STACK_CAPACITY: usize = 1_048_576;
/// Default maximum number of instructions in a program.
pub const DEFAULT_PROGRAM_CAPACITY: usize = 1024;
/// Default maximum number of live heap bytes.
pub const DEFAULT_HEAP_CAPACITY: usize = 1 << 26;
/// Instruction budget meaning "run until halt or fault".
pub const UNLIMITED: i64 = -1;

pub const STACK_CAPACITY_ENV: &str = "QUARK_STACK_CAPACITY";
pub const PROGRAM_CAPACITY_ENV: &str = "QUARK_PROGRAM_CAPACITY";
pub const HEAP_CAPACITY_ENV: &str = "QUARK_HEAP_CAPACITY";

/// Limits enforced by the assembler, the program loader and the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub stack_capacity: usize,
    pub program_capacity: usize,
    pub heap_capacity: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            program_capacity: DEFAULT_PROGRAM_CAPACITY,
            heap_capacity: DEFAULT_HEAP_CAPACITY,
        }
    }
}

impl Limits {
    pub fn with_stack_capacity(mut self, capacity: usize) -> Self {
        self.stack_capacity = capacity;
        self
    }

    pub fn with_program_capacity(mut self, capacity: usize) -> Self {
        self.program_capacity = capacity;
        self
    }

    pub fn with_heap_capacity(mut self, capacity: usize) -> Self {
        self.heap_capacity = capacity;
        self
    }

    /// Reads overrides from `QUARK_STACK_CAPACITY`, `QUARK_PROGRAM_CAPACITY`
    /// and `QUARK_HEAP_CAPACITY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            stack_capacity: parse_override(&lookup, STACK_CAPACITY_ENV)
                .unwrap_or(defaults.stack_capacity),
            program_capacity: parse_override(&lookup, PROGRAM_CAPACITY_ENV)
                .unwrap_or(defaults.program_capacity),
            heap_capacity: parse_override(&lookup, HEAP_CAPACITY_ENV)
                .unwrap_or(defaults.heap_capacity),
        }
    }
}

fn parse_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring {key}={raw}: not a valid number");
            None
        }
    }
}
