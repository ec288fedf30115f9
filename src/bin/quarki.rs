//! Interpreter CLI.
//!
//! Loads a `.qce` bytecode file, runs it with the standard natives and prints
//! the final stack.
//!
//! # Examples
//! ```text
//! quarki countdown.qce
//! quarki countdown.qce --limit 1000 --trace
//! quarki countdown.qce --debug
//! ```
//!
//! In debug mode the next instruction is shown before every step and a line
//! is read from stdin: an empty line executes it, `.` prints the stack, `!`
//! leaves the debugger and stops the program and `?` lists the commands.

use clap::Parser;
use quark::utils::log;
use quark::virtual_machine::config::{Limits, UNLIMITED};
use quark::virtual_machine::errors::{Error, Fault};
use quark::virtual_machine::native::NativeRegistry;
use quark::virtual_machine::program::Program;
use quark::virtual_machine::vm::budget::Budget;
use quark::virtual_machine::vm::{Machine, Outcome};
use quark::{error, info, warn};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "quarki", version, about = "Run quark bytecode")]
struct Args {
    /// Bytecode file produced by quarkc
    input: PathBuf,

    /// Maximum number of instructions to execute (negative for no limit)
    #[arg(short, long, default_value_t = UNLIMITED, allow_hyphen_values = true)]
    limit: i64,

    /// Print every instruction before it executes
    #[arg(short, long)]
    trace: bool,

    /// Step through the program interactively
    #[arg(short, long)]
    debug: bool,

    /// Maximum operand stack depth in words
    #[arg(long)]
    stack_capacity: Option<usize>,

    /// Maximum number of live heap bytes
    #[arg(long)]
    heap_capacity: Option<usize>,

    /// Maximum number of instructions the program may contain
    #[arg(long)]
    program_capacity: Option<usize>,
}

const HELP: &str = "\
Available commands:
  ?        print this help message
  .        print the current stack
  !        exit the debugger
  <enter>  execute the next instruction";

/// How a traced or interactive session ended.
enum Ending {
    Finished(Outcome),
    Detached,
}

fn main() {
    log::init_from_env();
    let args = Args::parse();

    let mut limits = Limits::from_env();
    if let Some(capacity) = args.stack_capacity {
        limits = limits.with_stack_capacity(capacity);
    }
    if let Some(capacity) = args.heap_capacity {
        limits = limits.with_heap_capacity(capacity);
    }
    if let Some(capacity) = args.program_capacity {
        limits = limits.with_program_capacity(capacity);
    }

    let program = Program::load(&args.input, limits.program_capacity).unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1)
    });

    let natives = NativeRegistry::standard();
    let mut machine = Machine::with_limits(program, &limits);

    let result = if args.debug || args.trace {
        step_loop(&mut machine, &natives, args.limit, args.debug)
    } else {
        machine
            .run(&natives, args.limit)
            .map(Ending::Finished)
            .map_err(Error::from)
    };

    match result {
        Ok(Ending::Finished(Outcome::Halted)) => {
            info!(
                "Program halted at Op {} after {} steps",
                machine.ip(),
                machine.steps()
            );
            dump(&machine);
        }
        Ok(Ending::Finished(Outcome::LimitReached)) => {
            warn!(
                "Instruction limit reached at Op {} after {} steps",
                machine.ip(),
                machine.steps()
            );
            dump(&machine);
        }
        Ok(Ending::Detached) => {
            info!("Exiting debugger after {} steps", machine.steps());
        }
        Err(Error::Fault(Fault { exception, address })) => {
            error!("Error at Op {address}: {exception}");
            dump(&machine);
            process::exit(1);
        }
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}

fn dump(machine: &Machine) {
    if let Err(e) = machine.dump_stack(&mut io::stdout().lock()) {
        error!("could not print the stack: {e}");
    }
}

fn print_next(machine: &Machine) {
    let ip = machine.ip();
    match machine.program().get(ip) {
        Some(instruction) => println!("Op {ip}: {instruction}"),
        None => println!("Op {ip}: <out of range>"),
    }
}

/// Reads debugger commands until one asks to execute. Returns false when the
/// user leaves the debugger.
fn prompt(machine: &Machine, lines: &mut impl Iterator<Item = io::Result<String>>) -> Result<bool, Error> {
    loop {
        print!(">> ");
        io::stdout().flush().map_err(|source| Error::Io {
            path: "<stdout>".into(),
            source,
        })?;

        let Some(line) = lines.next() else {
            return Ok(false);
        };
        let line = line.map_err(|source| Error::Io {
            path: "<stdin>".into(),
            source,
        })?;

        match line.trim() {
            "" => return Ok(true),
            "." => dump(machine),
            "!" => return Ok(false),
            "?" => println!("{HELP}"),
            other => {
                error!("Unknown command '{other}'");
                info!("Type '?' for a list of commands");
            }
        }
    }
}

/// Executes one instruction at a time, printing each one first and, when
/// `interactive`, waiting for a debugger command.
fn step_loop(
    machine: &mut Machine,
    natives: &NativeRegistry,
    limit: i64,
    interactive: bool,
) -> Result<Ending, Error> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut budget = Budget::new(limit);

    if interactive {
        info!("Debugger started, type '?' for a list of commands");
    }

    while !machine.is_halted() {
        if !budget.consume() {
            return Ok(Ending::Finished(Outcome::LimitReached));
        }

        print_next(machine);
        if interactive && !prompt(machine, &mut lines)? {
            return Ok(Ending::Detached);
        }

        let address = machine.ip();
        machine
            .step(natives)
            .map_err(|exception| Fault { exception, address })?;
    }
    Ok(Ending::Finished(Outcome::Halted))
}
