//! Two-pass assembler from `.qas` source to a [`Program`].
//!
//! The first pass parses every line, recording label addresses and leaving
//! label operands unresolved. The second pass patches those operands once all
//! labels are known, so labels may be used before they are declared. Any error
//! aborts assembly; no partial program is returned.
//!
//! # Syntax
//!
//! ```text
//! -- comment
//! label: mnemonic operand   -- trailing comment
//! ```
//!
//! - One instruction per line, optionally prefixed by `name:`
//! - A token starting with `--` comments out the rest of the line
//! - Mnemonics are lowercase (e.g. `put`, `iplus`, `jif`)
//! - Immediates are base-10 integers or floats (e.g. `42`, `-1`, `2.5`)
//! - Jump targets are addresses (first character a digit) or label names

use crate::debug;
use crate::virtual_machine::config::Limits;
use crate::virtual_machine::errors::{AsmError, AsmErrorKind, Error};
use crate::virtual_machine::isa::{Opcode, OperandKind};
use crate::virtual_machine::program::{Instruction, Program};
use crate::virtual_machine::word::Word;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_MARKER: &str = "--";
const LABEL_SUFFIX: char = ':';

/// Formats a compiler-style diagnostic for an assembly failure.
pub fn render_diagnostic(file: &str, source: &str, err: &AsmError) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {}", err.kind);
    let _ = writeln!(diag, " --> {file}:{}:{}", err.line, err.column);

    if let Some(raw_line) = source.lines().nth(err.line.saturating_sub(1)) {
        let underline = " ".repeat(err.column.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", err.line, raw_line);
        let _ = writeln!(diag, "  | {underline}^");
    }

    diag
}

/// Label names and the addresses they were declared at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolTable {
    labels: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` at `address`. Each name may be declared once.
    pub fn define(&mut self, name: &str, address: usize) -> Result<(), AsmErrorKind> {
        if self.labels.contains_key(name) {
            return Err(AsmErrorKind::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), address);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels sorted by address, then name.
    pub fn sorted(&self) -> Vec<(&str, usize)> {
        let mut labels: Vec<_> = self
            .labels
            .iter()
            .map(|(name, address)| (name.as_str(), *address))
            .collect();
        labels.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));
        labels
    }
}

/// Result of a successful assembly.
#[derive(Clone, Debug)]
pub struct Assembly {
    pub program: Program,
    pub symbols: SymbolTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column in the line.
    column: usize,
}

/// Splits one source line into whitespace-delimited tokens, stopping at a comment.
struct Lexer<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(line: &'a str) -> Self {
        Self { line, pos: 0 }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let rest = &self.line[self.pos..];
        let trimmed = rest.trim_start();
        let start = self.pos + (rest.len() - trimmed.len());

        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            self.pos = self.line.len();
            return None;
        }

        let len = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        self.pos = start + len;
        Some(Token {
            text: &trimmed[..len],
            column: self.line[..start].chars().count() + 1,
        })
    }
}

/// A label operand waiting for the resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DelayedOperand {
    address: usize,
    label: String,
    line: usize,
    column: usize,
}

/// Label operand found while parsing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LabelRef<'a> {
    name: &'a str,
    column: usize,
}

fn error_at(line: usize, token: Token<'_>, kind: AsmErrorKind) -> AsmError {
    AsmError {
        line,
        column: token.column,
        kind,
    }
}

fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX)
}

/// Returns the label declared by `token`, which ends with `:`.
fn label_name<'a>(line: usize, token: Token<'a>) -> Result<&'a str, AsmError> {
    let name = &token.text[..token.text.len() - LABEL_SUFFIX.len_utf8()];
    let starts_with_digit = name.starts_with(|c: char| c.is_ascii_digit());
    if name.is_empty() || starts_with_digit || name.contains(LABEL_SUFFIX) {
        return Err(error_at(
            line,
            token,
            AsmErrorKind::InvalidLabel(token.text.to_string()),
        ));
    }
    Ok(name)
}

/// Parses an `Imm` operand: an integer, or failing that a float.
fn parse_immediate(tok: &str) -> Option<Word> {
    if let Ok(value) = tok.parse::<i64>() {
        return Some(Word::from_i64(value));
    }
    tok.parse::<f64>().ok().map(Word::from_f64)
}

fn parse_integer(tok: &str) -> Option<Word> {
    tok.parse::<i64>().ok().map(Word::from_i64)
}

/// Parses the rest of a line after its mnemonic.
///
/// Emits the instruction plus the label its operand still refers to, if any.
fn parse_instruction<'a>(
    line: usize,
    mnemonic: Token<'a>,
    tokens: &mut Lexer<'a>,
) -> Result<(Instruction, Option<LabelRef<'a>>), AsmError> {
    let opcode = Opcode::from_mnemonic(mnemonic.text).ok_or_else(|| {
        error_at(
            line,
            mnemonic,
            AsmErrorKind::UnknownInstruction(mnemonic.text.to_string()),
        )
    })?;

    let mut delayed = None;
    let operand = match opcode.operand() {
        None => Word::ZERO,
        Some(kind) => {
            let token = tokens.next().ok_or_else(|| {
                error_at(line, mnemonic, AsmErrorKind::MissingOperand(opcode.mnemonic()))
            })?;
            let invalid = || {
                error_at(
                    line,
                    token,
                    AsmErrorKind::InvalidLiteral(token.text.to_string()),
                )
            };
            match kind {
                OperandKind::Imm => parse_immediate(token.text).ok_or_else(invalid)?,
                OperandKind::Int => parse_integer(token.text).ok_or_else(invalid)?,
                OperandKind::Addr if token.text.starts_with(|c: char| c.is_ascii_digit()) => {
                    parse_integer(token.text).ok_or_else(invalid)?
                }
                OperandKind::Addr => {
                    delayed = Some(LabelRef {
                        name: token.text,
                        column: token.column,
                    });
                    Word::ZERO
                }
            }
        }
    };

    if let Some(extra) = tokens.next() {
        return Err(error_at(
            line,
            extra,
            AsmErrorKind::UnexpectedToken(extra.text.to_string()),
        ));
    }

    Ok((Instruction::new(opcode, operand), delayed))
}

/// State of one assembly call.
struct Assembler {
    instructions: Vec<Instruction>,
    symbols: SymbolTable,
    delayed: Vec<DelayedOperand>,
    capacity: usize,
}

impl Assembler {
    fn new(capacity: usize) -> Self {
        Self {
            instructions: Vec::new(),
            symbols: SymbolTable::new(),
            delayed: Vec::new(),
            capacity,
        }
    }

    /// First pass over a single line.
    fn parse_line(&mut self, line: usize, text: &str) -> Result<(), AsmError> {
        let mut tokens = Lexer::new(text);
        let Some(mut first) = tokens.next() else {
            return Ok(());
        };

        if is_label_def(first.text) {
            let name = label_name(line, first)?;
            self.symbols
                .define(name, self.instructions.len())
                .map_err(|kind| error_at(line, first, kind))?;
            match tokens.next() {
                Some(next) => first = next,
                None => return Ok(()),
            }
        }

        if self.instructions.len() >= self.capacity {
            return Err(error_at(
                line,
                first,
                AsmErrorKind::ProgramTooLarge(self.capacity),
            ));
        }

        let (instruction, label) = parse_instruction(line, first, &mut tokens)?;
        if let Some(label) = label {
            self.delayed.push(DelayedOperand {
                address: self.instructions.len(),
                label: label.name.to_string(),
                line,
                column: label.column,
            });
        }
        self.instructions.push(instruction);
        Ok(())
    }

    /// Second pass: patches every label operand with its address.
    fn finish(mut self) -> Result<Assembly, AsmError> {
        for pending in &self.delayed {
            let address = self.symbols.resolve(&pending.label).ok_or_else(|| AsmError {
                line: pending.line,
                column: pending.column,
                kind: AsmErrorKind::UndefinedLabel(pending.label.clone()),
            })?;
            self.instructions[pending.address].operand = Word::from_bits(address as u64);
        }

        let count = self.instructions.len();
        let program = Program::new(self.instructions, self.capacity).map_err(|_| AsmError {
            line: 0,
            column: 0,
            kind: AsmErrorKind::ProgramTooLarge(self.capacity),
        })?;
        debug!(
            "assembled {count} instructions, {} labels, {} patched operands",
            self.symbols.len(),
            self.delayed.len()
        );
        Ok(Assembly {
            program,
            symbols: self.symbols,
        })
    }
}

/// Assembles `source` with the default program capacity.
pub fn assemble_source(source: &str) -> Result<Assembly, AsmError> {
    assemble_with_limits(source, &Limits::default())
}

/// Assembles `source`, rejecting programs longer than `limits.program_capacity`.
pub fn assemble_with_limits(source: &str, limits: &Limits) -> Result<Assembly, AsmError> {
    let mut assembler = Assembler::new(limits.program_capacity);
    for (index, line) in source.lines().enumerate() {
        assembler.parse_line(index + 1, line)?;
    }
    assembler.finish()
}

/// Assembles the file at `path`, printing a diagnostic to stderr on failure.
pub fn assemble_file(path: impl AsRef<Path>, limits: &Limits) -> Result<Assembly, Error> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    assemble_with_limits(&source, limits).map_err(|err| {
        eprint!(
            "{}",
            render_diagnostic(&path.display().to_string(), &source, &err)
        );
        Error::Asm(err)
    })
}
