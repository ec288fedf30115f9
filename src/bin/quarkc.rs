//! Assembler CLI.
//!
//! Compiles a `.qas` source file into a `.qce` bytecode file.
//!
//! # Examples
//! ```text
//! quarkc countdown.qas
//! quarkc countdown.qas -o build/countdown.qce --labels
//! ```

use clap::Parser;
use quark::utils::log;
use quark::virtual_machine::assembler::assemble_file;
use quark::virtual_machine::config::Limits;
use quark::virtual_machine::errors::Error;
use quark::{error, info};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "quarkc", version, about = "Assemble quark source into bytecode")]
struct Args {
    /// Assembly source file
    input: PathBuf,

    /// Output file (defaults to the input path with a `.qce` extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum number of instructions the program may contain
    #[arg(long)]
    program_capacity: Option<usize>,

    /// Print the label table after assembling
    #[arg(long)]
    labels: bool,
}

fn main() {
    log::init_from_env();
    let args = Args::parse();

    match compile(&args) {
        Ok(()) => {}
        // The diagnostic has already been rendered with its source line.
        Err(Error::Asm(_)) => process::exit(1),
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}

fn compile(args: &Args) -> Result<(), Error> {
    let mut limits = Limits::from_env();
    if let Some(capacity) = args.program_capacity {
        limits = limits.with_program_capacity(capacity);
    }

    let assembly = assemble_file(&args.input, &limits)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("qce"));
    assembly.program.save(&output)?;

    info!(
        "Compiled {} -> {} ({} instructions)",
        args.input.display(),
        output.display(),
        assembly.program.len()
    );

    if args.labels {
        for (name, address) in assembly.symbols.sorted() {
            println!("{address:>6}  {name}");
        }
    }
    Ok(())
}
