//! Disassembler CLI.
//!
//! Prints one `Op N: mnemonic operand` line per instruction of a `.qce` file.
//! Records with an unknown tag are shown as `<invalid 0xNN>` rather than
//! rejected, so damaged files can still be inspected.

use clap::Parser;
use quark::error;
use quark::utils::log;
use quark::virtual_machine::config::Limits;
use quark::virtual_machine::program::Program;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "unquark", version, about = "Disassemble quark bytecode")]
struct Args {
    /// Bytecode file produced by quarkc
    input: PathBuf,

    /// Maximum number of instructions the program may contain
    #[arg(long)]
    program_capacity: Option<usize>,
}

fn main() {
    log::init_from_env();
    let args = Args::parse();

    let capacity = args
        .program_capacity
        .unwrap_or_else(|| Limits::from_env().program_capacity);

    let program = Program::load(&args.input, capacity).unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1)
    });

    for (address, instruction) in program.iter().enumerate() {
        println!("Op {address}: {instruction}");
    }
}
