//! Execution engine.
//!
//! A [`Machine`] owns one program together with its operand stack, heap and
//! control state. Machines are independent values; any number can coexist.
//! Native functions are supplied per call through a [`NativeRegistry`] so one
//! registry can serve many machines.
//!
//! All integer arithmetic wraps. Float arithmetic follows IEEE-754, so float
//! division by zero yields an infinity or NaN instead of trapping.

pub mod budget;
pub mod heap;
pub mod stack;
#[cfg(test)]
mod tests;

use crate::debug;
use crate::virtual_machine::config::Limits;
use crate::virtual_machine::errors::{Exception, Fault};
use crate::virtual_machine::isa::Opcode;
use crate::virtual_machine::native::NativeRegistry;
use crate::virtual_machine::program::Program;
use crate::virtual_machine::word::Word;
use budget::Budget;
use heap::Heap;
use stack::Stack;
use std::io::{self, Write};

/// Observable state of a machine between steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
    Faulted(Exception),
}

/// How a successful [`Machine::run`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A `stop` instruction raised the halt flag.
    Halted,
    /// The instruction budget ran out first.
    LimitReached,
}

/// Where control goes after an instruction completes.
enum Flow {
    Next,
    Jump(usize),
    Halt,
}

pub struct Machine {
    program: Program,
    stack: Stack,
    heap: Heap,
    ip: usize,
    halted: bool,
    fault: Option<Exception>,
    steps: u64,
}

impl Machine {
    /// Creates a machine with the default limits.
    pub fn new(program: Program) -> Self {
        Self::with_limits(program, &Limits::default())
    }

    pub fn with_limits(program: Program, limits: &Limits) -> Self {
        Self {
            program,
            stack: Stack::new(limits.stack_capacity),
            heap: Heap::new(limits.heap_capacity),
            ip: 0,
            halted: false,
            fault: None,
            steps: 0,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Address of the next instruction to execute.
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Instructions completed since creation or the last reset.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn status(&self) -> Status {
        match (self.fault, self.halted) {
            (Some(exception), _) => Status::Faulted(exception),
            (None, true) => Status::Halted,
            (None, false) => Status::Running,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Restarts execution from address 0 with an empty stack and heap.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.heap.clear();
        self.ip = 0;
        self.halted = false;
        self.fault = None;
        self.steps = 0;
    }

    /// Executes exactly one instruction.
    ///
    /// A faulted machine stays faulted: later calls return the same exception
    /// without executing anything. Stepping a halted machine does nothing.
    pub fn step(&mut self, natives: &NativeRegistry) -> Result<(), Exception> {
        if let Some(exception) = self.fault {
            return Err(exception);
        }
        if self.halted {
            return Ok(());
        }
        match self.exec(natives) {
            Ok(flow) => {
                self.steps += 1;
                match flow {
                    Flow::Next => self.ip += 1,
                    Flow::Jump(target) => self.ip = target,
                    Flow::Halt => self.halted = true,
                }
                Ok(())
            }
            Err(exception) => {
                self.fault = Some(exception);
                Err(exception)
            }
        }
    }

    /// Runs until halt, fault, or `limit` instructions have executed.
    ///
    /// A `limit` of 0 executes nothing and a negative limit is unlimited.
    pub fn run(&mut self, natives: &NativeRegistry, limit: i64) -> Result<Outcome, Fault> {
        let mut budget = Budget::new(limit);
        while !self.halted {
            if !budget.consume() {
                debug!("instruction limit reached at {} after {} steps", self.ip, self.steps);
                return Ok(Outcome::LimitReached);
            }
            let address = self.ip;
            if let Err(exception) = self.step(natives) {
                debug!("{exception} at instruction {address}");
                return Err(Fault { exception, address });
            }
        }
        debug!("halted at instruction {} after {} steps", self.ip, self.steps);
        Ok(Outcome::Halted)
    }

    /// Writes every stack word, bottom first, under each interpretation.
    pub fn dump_stack<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.stack.is_empty() {
            return writeln!(out, "Stack: [empty]");
        }
        writeln!(out, "Stack:")?;
        for word in self.stack.as_slice() {
            writeln!(
                out,
                "  U64: {}, I64: {}, F64: {:.6}, PTR: {:#x}",
                word.as_u64(),
                word.as_i64(),
                word.as_f64(),
                word.as_ptr()
            )?;
        }
        Ok(())
    }

    fn exec(&mut self, natives: &NativeRegistry) -> Result<Flow, Exception> {
        let instruction = *self
            .program
            .get(self.ip)
            .ok_or(Exception::IllegalInstructionAccess)?;
        let operand = instruction.operand;

        match instruction.opcode()? {
            Opcode::Kaput => Ok(Flow::Next),
            Opcode::Put => self.op_put(operand),
            Opcode::Dup => self.op_dup(operand),
            Opcode::Swap => self.op_swap(operand),
            Opcode::Drop => self.op_drop(),
            Opcode::IPlus => self.int_arith(|a, b| Ok(a.wrapping_add(b))),
            Opcode::IMinus => self.int_arith(|a, b| Ok(a.wrapping_sub(b))),
            Opcode::IMul => self.int_arith(|a, b| Ok(a.wrapping_mul(b))),
            Opcode::IDiv => self.int_arith(|a, b| Ok(a.wrapping_div(nonzero(b)?))),
            Opcode::IMod => self.int_arith(|a, b| Ok(a.wrapping_rem(nonzero(b)?))),
            Opcode::FPlus => self.float_arith(|a, b| a + b),
            Opcode::FMinus => self.float_arith(|a, b| a - b),
            Opcode::FMul => self.float_arith(|a, b| a * b),
            Opcode::FDiv => self.float_arith(|a, b| a / b),
            Opcode::FMod => self.float_arith(|a, b| a % b),
            Opcode::Jmp => Ok(Flow::Jump(to_index(operand))),
            Opcode::Jif => self.op_jif(operand),
            Opcode::Invoke => self.op_invoke(operand),
            Opcode::Return => self.op_return(),
            Opcode::IEq => self.int_compare(|a, b| a == b),
            Opcode::IGt => self.int_compare(|a, b| a > b),
            Opcode::ILt => self.int_compare(|a, b| a < b),
            Opcode::IGe => self.int_compare(|a, b| a >= b),
            Opcode::ILe => self.int_compare(|a, b| a <= b),
            Opcode::FEq => self.float_compare(|a, b| a == b),
            Opcode::FGt => self.float_compare(|a, b| a > b),
            Opcode::FLt => self.float_compare(|a, b| a < b),
            Opcode::FGe => self.float_compare(|a, b| a >= b),
            Opcode::FLe => self.float_compare(|a, b| a <= b),
            Opcode::Not => self.op_not(),
            Opcode::Native => self.op_native(natives, operand),
            Opcode::Stop => Ok(Flow::Halt),
        }
    }

    fn op_put(&mut self, value: Word) -> Result<Flow, Exception> {
        self.stack.push(value)?;
        Ok(Flow::Next)
    }

    fn op_dup(&mut self, depth: Word) -> Result<Flow, Exception> {
        self.stack.dup(to_index(depth))?;
        Ok(Flow::Next)
    }

    fn op_swap(&mut self, depth: Word) -> Result<Flow, Exception> {
        self.stack.swap(to_index(depth))?;
        Ok(Flow::Next)
    }

    fn op_drop(&mut self) -> Result<Flow, Exception> {
        self.stack.pop()?;
        Ok(Flow::Next)
    }

    fn int_arith(
        &mut self,
        f: impl FnOnce(i64, i64) -> Result<i64, Exception>,
    ) -> Result<Flow, Exception> {
        self.stack
            .combine(|a, b| f(a.as_i64(), b.as_i64()).map(Word::from_i64))?;
        Ok(Flow::Next)
    }

    fn float_arith(&mut self, f: impl FnOnce(f64, f64) -> f64) -> Result<Flow, Exception> {
        self.stack
            .combine(|a, b| Ok(Word::from_f64(f(a.as_f64(), b.as_f64()))))?;
        Ok(Flow::Next)
    }

    fn int_compare(&mut self, f: impl FnOnce(i64, i64) -> bool) -> Result<Flow, Exception> {
        self.stack
            .combine(|a, b| Ok(Word::from_bool(f(a.as_i64(), b.as_i64()))))?;
        Ok(Flow::Next)
    }

    fn float_compare(&mut self, f: impl FnOnce(f64, f64) -> bool) -> Result<Flow, Exception> {
        self.stack
            .combine(|a, b| Ok(Word::from_bool(f(a.as_f64(), b.as_f64()))))?;
        Ok(Flow::Next)
    }

    fn op_jif(&mut self, target: Word) -> Result<Flow, Exception> {
        if self.stack.pop()?.is_truthy() {
            Ok(Flow::Jump(to_index(target)))
        } else {
            Ok(Flow::Next)
        }
    }

    fn op_invoke(&mut self, target: Word) -> Result<Flow, Exception> {
        self.stack.push(Word::from_bits(self.ip as u64 + 1))?;
        Ok(Flow::Jump(to_index(target)))
    }

    fn op_return(&mut self) -> Result<Flow, Exception> {
        let target = self.stack.pop()?;
        Ok(Flow::Jump(to_index(target)))
    }

    fn op_not(&mut self) -> Result<Flow, Exception> {
        let top = self.stack.top_mut()?;
        *top = Word::from_bool(top.as_i64() == 0);
        Ok(Flow::Next)
    }

    fn op_native(&mut self, natives: &NativeRegistry, index_word: Word) -> Result<Flow, Exception> {
        natives.call(to_index(index_word), self)?;
        Ok(Flow::Next)
    }
}

fn nonzero(divisor: i64) -> Result<i64, Exception> {
    if divisor == 0 {
        return Err(Exception::DivideByZero);
    }
    Ok(divisor)
}

/// Reads an address, depth or native index operand.
///
/// Values that do not fit saturate, so a negative depth underflows and a wild
/// jump target faults on the next fetch.
fn to_index(word: Word) -> usize {
    usize::try_from(word.as_u64()).unwrap_or(usize::MAX)
}
