//! Host functions callable from bytecode with `native N`.
//!
//! A [`NativeRegistry`] is an ordered, append-only list of callbacks. `N` is
//! the zero-based registration index. Callbacks get the whole machine and take
//! their arguments from the stack and push their results back onto it.
//!
//! [`NativeRegistry::standard`] registers, in order:
//!
//! | index | name        | stack effect                          |
//! |------:|-------------|---------------------------------------|
//! | 0     | `alloc`     | `size -- handle`                      |
//! | 1     | `free`      | `handle --`                           |
//! | 2     | `print_f64` | `x --`, prints with six decimals      |
//! | 3     | `print_i64` | `n --`                                |
//! | 4     | `print_ptr` | `handle --`, prints in hex            |
//!
//! `alloc` fails when the block exceeds [`MAX_BLOCK_SIZE`] or would push the
//! machine's live heap bytes past its heap capacity.

use crate::virtual_machine::errors::Exception;
use crate::virtual_machine::vm::Machine;
use crate::virtual_machine::word::Word;
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

/// Signature shared by every native function.
///
/// A callback that returns `Err` is responsible for leaving the stack as it
/// found it; the engine does not roll back changes made before the failure.
pub type NativeFn = dyn Fn(&mut Machine) -> Result<(), Exception>;

/// Console the printing natives write to.
pub type SharedOutput = Rc<RefCell<dyn Write>>;

pub const ALLOC: usize = 0;
pub const FREE: usize = 1;
pub const PRINT_F64: usize = 2;
pub const PRINT_I64: usize = 3;
pub const PRINT_PTR: usize = 4;

/// Largest block `alloc` will hand out.
pub const MAX_BLOCK_SIZE: usize = 1 << 24;

struct Native {
    name: String,
    function: Box<NativeFn>,
}

#[derive(Default)]
pub struct NativeRegistry {
    natives: Vec<Native>,
}

impl NativeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard natives, printing to stdout.
    pub fn standard() -> Self {
        Self::standard_with_output(Rc::new(RefCell::new(io::stdout())))
    }

    /// The standard natives, printing to `out`.
    pub fn standard_with_output(out: SharedOutput) -> Self {
        let mut registry = Self::new();
        registry.register("alloc", alloc);
        registry.register("free", free);
        registry.register(
            "print_f64",
            printer(out.clone(), |w| format!("{:.6}", w.as_f64())),
        );
        registry.register(
            "print_i64",
            printer(out.clone(), |w| w.as_i64().to_string()),
        );
        registry.register("print_ptr", printer(out, |w| format!("{:#x}", w.as_ptr())));
        registry
    }

    /// Appends `function` and returns its index.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> usize
    where
        F: Fn(&mut Machine) -> Result<(), Exception> + 'static,
    {
        self.natives.push(Native {
            name: name.into(),
            function: Box::new(function),
        });
        self.natives.len() - 1
    }

    pub fn len(&self) -> usize {
        self.natives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.natives.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.natives.get(index).map(|n| n.name.as_str())
    }

    /// Index of the first native registered under `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.natives.iter().position(|n| n.name == name)
    }

    /// Calls the native at `index` on `machine`.
    ///
    /// An index past the end of the registry is an `IllegalOperation`.
    pub fn call(&self, index: usize, machine: &mut Machine) -> Result<(), Exception> {
        let native = self.natives.get(index).ok_or(Exception::IllegalOperation)?;
        (native.function)(machine)
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.natives.iter().map(|n| &n.name))
            .finish()
    }
}

fn alloc(machine: &mut Machine) -> Result<(), Exception> {
    let size = machine.stack().peek(0)?.as_i64();
    let size = usize::try_from(size)
        .ok()
        .filter(|size| *size <= MAX_BLOCK_SIZE)
        .ok_or(Exception::IllegalOperation)?;
    let handle = machine.heap_mut().allocate(size)?;
    *machine.stack_mut().top_mut()? = Word::from_ptr(handle);
    Ok(())
}

fn free(machine: &mut Machine) -> Result<(), Exception> {
    let handle = machine.stack().peek(0)?.as_ptr();
    machine.heap_mut().free(handle)?;
    machine.stack_mut().pop()?;
    Ok(())
}

fn printer(
    out: SharedOutput,
    render: fn(Word) -> String,
) -> impl Fn(&mut Machine) -> Result<(), Exception> {
    move |machine: &mut Machine| {
        let word = machine.stack().peek(0)?;
        writeln!(out.borrow_mut(), "{}", render(word)).map_err(|_| Exception::IllegalOperation)?;
        machine.stack_mut().pop()?;
        Ok(())
    }
}
