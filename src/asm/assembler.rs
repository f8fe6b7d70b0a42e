//! Two-pass assembler.
//!
//! Syntax:
//! ```text
//! ; Comment
//! const LIMIT 0x10    ; 8-bit named constant
//! loop:               ; label (`.loop:` also accepted)
//!     MW A, LIMIT     ; register, register-or-immediate
//!     SW 0x20, A      ; address, register
//!     @loop           ; HL := address of `loop` (MWH + MWL)
//!     JMPZ HL
//! .org 0x40           ; pad with NOPs up to word 0x40
//!     HALT
//! ```
//!
//! Pass 1 walks the cleaned lines to size the program and collect labels
//! and constants. Pass 2 walks them again and resolves every line into
//! [`Instruction`]s, so forward references always resolve.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::asm::disasm;
use crate::asm::image::{self, ImageError};
use crate::asm::literal::{looks_numeric, parse_literal, LiteralError};
use crate::cpu::bus::ROM_SIZE;
use crate::cpu::decode::{encode, Instruction, Operand};
use crate::isa::{lookup, Register, Shape};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name reported for in-memory sources.
pub const SOURCE_NAME: &str = "<source>";

/// Assemble source text.
pub fn assemble(source: &str) -> Result<Program, AssemblerError> {
    assemble_named(SOURCE_NAME, source)
}

/// Assemble source text, reporting errors against `file`.
pub fn assemble_named(file: &str, source: &str) -> Result<Program, AssemblerError> {
    let mut asm = Assembler::new(file);
    asm.assemble(source)
}

/// Read and assemble a source file.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, AssemblerError> {
    let file = path.as_ref().display().to_string();
    let fail = |kind| AssemblerError {
        file: file.clone(),
        line: 0,
        kind,
    };

    let mut handle = std::fs::File::open(path.as_ref())
        .map_err(|e| fail(ErrorKind::FileOpen(e.to_string())))?;
    let mut source = String::new();
    handle
        .read_to_string(&mut source)
        .map_err(|e| fail(ErrorKind::FileRead(e.to_string())))?;

    assemble_named(&file, &source)
}

/// An assembled program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Source file name.
    pub file: String,
    pub instructions: Vec<Instruction>,
    pub labels: BTreeMap<String, u16>,
    pub constants: BTreeMap<String, u8>,
}

impl Program {
    /// Packed instruction words.
    pub fn words(&self) -> Vec<u16> {
        self.instructions.iter().map(encode).collect()
    }

    /// Length in words.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn label(&self, name: &str) -> Option<u16> {
        self.labels.get(name).copied()
    }

    /// Image words, padded with NOPs to `size_kib` KiB if a size is given.
    pub fn image(&self, size_kib: Option<u32>) -> Result<Vec<u16>, AssemblerError> {
        let words = self.words();
        let Some(size) = size_kib else {
            return Ok(words);
        };

        image::pad_to_kib(words, size).map_err(|err| {
            let kind = match err {
                ImageError::TooSmall { requested, program } => ErrorKind::ImageTooSmall {
                    required: requested,
                    actual: program,
                },
                ImageError::TooLarge { words, capacity } => {
                    ErrorKind::ProgramTooLarge { words, capacity }
                }
                other => ErrorKind::Directive(other.to_string()),
            };
            AssemblerError {
                file: self.file.clone(),
                line: 0,
                kind,
            }
        })
    }

    /// One mnemonic per line, no addresses or comments.
    pub fn listing(&self) -> String {
        disasm::listing(&self.instructions)
    }

    /// Label and constant tables.
    pub fn symbols(&self) -> SymbolTable {
        SymbolTable {
            labels: self.labels.clone(),
            constants: self.constants.clone(),
        }
    }
}

/// Symbols exported alongside an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    pub labels: BTreeMap<String, u16>,
    pub constants: BTreeMap<String, u8>,
}

/// A source line after comment stripping.
struct Line<'a> {
    number: usize,
    text: &'a str,
}

/// What a non-empty line declares.
enum Statement<'a> {
    Label(&'a str),
    Org(&'a str),
    Const { name: &'a str, value: &'a str },
    Jump(&'a str),
    Instruction(&'a str),
}

/// The assembler state.
struct Assembler<'f> {
    file: &'f str,
    /// Label -> word index.
    labels: BTreeMap<String, u16>,
    /// Constant -> value.
    constants: BTreeMap<String, u8>,
}

impl<'f> Assembler<'f> {
    fn new(file: &'f str) -> Self {
        Self {
            file,
            labels: BTreeMap::new(),
            constants: BTreeMap::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Program, AssemblerError> {
        let lines = clean_lines(source);

        // Pass 1: Collect symbols and size the program
        let words = self.collect_symbols(&lines)?;
        tracing::debug!(
            file = self.file,
            words,
            labels = self.labels.len(),
            constants = self.constants.len(),
            "pass 1 complete"
        );

        // Pass 2: Resolve and emit
        let instructions = self.resolve(&lines)?;
        debug_assert_eq!(instructions.len(), words);
        tracing::debug!(file = self.file, words = instructions.len(), "pass 2 complete");

        Ok(Program {
            file: self.file.to_string(),
            instructions,
            labels: std::mem::take(&mut self.labels),
            constants: std::mem::take(&mut self.constants),
        })
    }

    fn collect_symbols(&mut self, lines: &[Line<'_>]) -> Result<usize, AssemblerError> {
        let file = self.file;
        let mut pos = 0usize;

        for line in lines {
            let at = |kind| located(file, line.number, kind);
            match classify(line.text).map_err(at)? {
                Statement::Label(name) => {
                    if self.labels.contains_key(name) {
                        return Err(at(ErrorKind::DuplicateSymbol(name.to_string())));
                    }
                    self.labels.insert(name.to_string(), pos as u16);
                }

                Statement::Org(value) => {
                    let target = self.org_target(value).map_err(at)? as usize;
                    if target < pos {
                        return Err(at(org_backwards(target, pos)));
                    }
                    pos = target;
                }

                Statement::Const { name, value } => {
                    self.define_constant(name, value).map_err(at)?;
                }

                Statement::Jump(_) => pos += 2,

                Statement::Instruction(_) => pos += 1,
            }

            if pos > ROM_SIZE {
                return Err(at(ErrorKind::ProgramTooLarge {
                    words: pos,
                    capacity: ROM_SIZE,
                }));
            }
        }

        Ok(pos)
    }

    fn resolve(&self, lines: &[Line<'_>]) -> Result<Vec<Instruction>, AssemblerError> {
        let mut output = Vec::new();

        for line in lines {
            let at = |kind| located(self.file, line.number, kind);
            match classify(line.text).map_err(at)? {
                Statement::Label(_) | Statement::Const { .. } => {}

                Statement::Org(value) => {
                    let target = self.org_target(value).map_err(at)? as usize;
                    if target < output.len() {
                        return Err(at(org_backwards(target, output.len())));
                    }
                    output.resize(target, Instruction::Nop);
                }

                Statement::Jump(label) => {
                    let addr = self
                        .labels
                        .get(label)
                        .copied()
                        .ok_or_else(|| at(ErrorKind::UnknownLabel(label.to_string())))?;
                    let [msb, lsb] = addr.to_be_bytes();
                    output.push(Instruction::Mwh { imm: msb });
                    output.push(Instruction::Mwl { imm: lsb });
                }

                Statement::Instruction(text) => {
                    output.push(self.parse_instruction(text).map_err(at)?);
                }
            }
        }

        Ok(output)
    }

    fn define_constant(&mut self, name: &str, value: &str) -> Result<(), ErrorKind> {
        if !is_identifier(name) {
            return Err(ErrorKind::Directive(format!("invalid constant name `{}`", name)));
        }
        if Register::from_name(name).is_some() || lookup(name).is_some() {
            return Err(ErrorKind::Directive(format!(
                "constant `{}` shadows a register or instruction",
                name
            )));
        }
        if self.constants.contains_key(name) {
            return Err(ErrorKind::DuplicateSymbol(name.to_string()));
        }

        let value = match self.constants.get(value) {
            Some(&known) => known,
            None => self.literal(value)?,
        };
        self.constants.insert(name.to_string(), value);
        Ok(())
    }

    /// Resolve a `.org` argument: a constant or a 16-bit literal.
    fn org_target(&self, value: &str) -> Result<u16, ErrorKind> {
        if let Some(&known) = self.constants.get(value) {
            return Ok(known as u16);
        }
        if !looks_numeric(value) {
            return Err(ErrorKind::UnknownConstant(value.to_string()));
        }
        parse_literal(value).map_err(|reason| ErrorKind::NumericLiteral {
            literal: value.to_string(),
            reason,
        })
    }

    fn literal<T: TryFrom<u32>>(&self, text: &str) -> Result<T, ErrorKind> {
        parse_literal(text).map_err(|reason| ErrorKind::NumericLiteral {
            literal: text.to_string(),
            reason,
        })
    }

    fn parse_instruction(&self, text: &str) -> Result<Instruction, ErrorKind> {
        let (mnemonic, rest) = text
            .split_once(char::is_whitespace)
            .unwrap_or((text, ""));
        let (opcode, shape) = lookup(mnemonic)
            .ok_or_else(|| ErrorKind::UnknownInstruction(mnemonic.to_string()))?;

        let tokens = split_operands(rest.trim(), shape)?;
        if tokens.len() != shape.operand_count() {
            return Err(ErrorKind::OperandCount {
                mnemonic: opcode.mnemonic(),
                expected: shape.operand_count(),
                found: tokens.len(),
            });
        }
        if tokens.iter().any(|token| token.is_empty()) {
            return Err(ErrorKind::EmptyOperand(opcode.mnemonic()));
        }

        let mut operands = [None, None];
        for (index, token) in tokens.iter().enumerate() {
            operands[index] = Some(self.operand(token, register_slot(shape, index))?);
        }

        Instruction::from_parts(opcode, operands[0], operands[1]).map_err(|_| {
            ErrorKind::OperandKind {
                mnemonic: opcode.mnemonic(),
                expected: shape.describe(),
                found: tokens.join(", "),
            }
        })
    }

    /// Resolve one operand token.
    ///
    /// `register_only` picks the error for an unknown bare name: in a slot
    /// that must hold a register it is an unknown register, elsewhere an
    /// unknown constant.
    fn operand(&self, token: &str, register_only: bool) -> Result<Operand, ErrorKind> {
        if let Some(reg) = Register::from_name(token) {
            return Ok(Operand::Register(reg));
        }
        if let Some(&value) = self.constants.get(token) {
            return Ok(Operand::Immediate(value));
        }
        if looks_numeric(token) || token.starts_with(['-', '+']) {
            return self.literal(token).map(Operand::Immediate);
        }

        if register_only {
            Err(ErrorKind::UnknownRegister(token.to_string()))
        } else {
            Err(ErrorKind::UnknownConstant(token.to_string()))
        }
    }
}

/// Strip comments and blank lines, keeping 1-based line numbers.
fn clean_lines(source: &str) -> Vec<Line<'_>> {
    source
        .lines()
        .enumerate()
        .filter_map(|(index, raw)| {
            let code = match raw.find(';') {
                Some(idx) => &raw[..idx],
                None => raw,
            };
            let text = code.trim();
            (!text.is_empty()).then_some(Line {
                number: index + 1,
                text,
            })
        })
        .collect()
}

fn classify(text: &str) -> Result<Statement<'_>, ErrorKind> {
    if let Some(head) = text.strip_suffix(':') {
        let name = head.trim();
        let name = name.strip_prefix('.').unwrap_or(name);
        if !is_identifier(name) {
            return Err(ErrorKind::Directive(format!("invalid label `{}`", text)));
        }
        return Ok(Statement::Label(name));
    }

    if let Some(rest) = text.strip_prefix('@') {
        let name = rest.trim();
        if !is_identifier(name) {
            return Err(ErrorKind::Directive(format!("invalid jump target `{}`", text)));
        }
        return Ok(Statement::Jump(name));
    }

    let mut parts = text.split_whitespace();
    let keyword = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    if keyword.eq_ignore_ascii_case(".org") {
        return match args.as_slice() {
            [value] => Ok(Statement::Org(value)),
            _ => Err(ErrorKind::Directive(".org takes one address".to_string())),
        };
    }

    if keyword.eq_ignore_ascii_case("const") {
        return match args.as_slice() {
            [name, value] => Ok(Statement::Const { name, value }),
            _ => Err(ErrorKind::Directive("const takes a name and a value".to_string())),
        };
    }

    if keyword.starts_with('.') {
        return Err(ErrorKind::Directive(format!("unknown directive `{}`", keyword)));
    }

    Ok(Statement::Instruction(text))
}

/// Split the operand field on its comma. Empty operands are kept so the
/// caller can count them.
fn split_operands(field: &str, shape: Shape) -> Result<Vec<&str>, ErrorKind> {
    if field.is_empty() {
        return Ok(Vec::new());
    }

    if !field.contains(',') {
        let tokens: Vec<&str> = field.split_whitespace().collect();
        if tokens.len() == 2 && shape.operand_count() == 2 {
            return Err(ErrorKind::ExpectedComma);
        }
        return Ok(tokens);
    }

    let parts: Vec<&str> = field.split(',').map(str::trim).collect();
    if parts.iter().any(|part| part.contains(char::is_whitespace)) {
        return Err(ErrorKind::ExpectedComma);
    }
    Ok(parts)
}

/// Whether operand `index` of `shape` must be a register.
fn register_slot(shape: Shape, index: usize) -> bool {
    match shape {
        Shape::RegisterOnly => true,
        Shape::RegFirstRegOrImm => index == 0,
        Shape::ImmOrRegRegSecond => index == 1,
        Shape::NoParams | Shape::ImmediateOnly | Shape::RegisterOrImmediate => false,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn located(file: &str, line: usize, kind: ErrorKind) -> AssemblerError {
    AssemblerError {
        file: file.to_string(),
        line,
        kind,
    }
}

fn org_backwards(target: usize, pos: usize) -> ErrorKind {
    ErrorKind::Directive(format!(
        ".org {:#06x} is behind the current position {:#06x}",
        target, pos
    ))
}

/// An assembly failure, located in its source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerError {
    pub file: String,
    /// 1-based source line; 0 for errors about the file as a whole.
    pub line: usize,
    pub kind: ErrorKind,
}

impl fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}: {}", self.file, self.kind)
        } else {
            write!(f, "{}:{}: {}", self.file, self.line, self.kind)
        }
    }
}

impl std::error::Error for AssemblerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("failed to open: {0}")]
    FileOpen(String),

    #[error("failed to read: {0}")]
    FileRead(String),

    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),

    #[error("{mnemonic} takes {expected} operand(s), found {found}")]
    OperandCount {
        mnemonic: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{mnemonic} takes {expected}, found `{found}`")]
    OperandKind {
        mnemonic: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("expected `,` between operands")]
    ExpectedComma,

    #[error("{0} has an empty operand")]
    EmptyOperand(&'static str),

    #[error("unknown register `{0}`")]
    UnknownRegister(String),

    #[error("unknown label `{0}`")]
    UnknownLabel(String),

    #[error("unknown constant `{0}`")]
    UnknownConstant(String),

    #[error("bad numeric literal `{literal}`: {reason}")]
    NumericLiteral {
        literal: String,
        #[source]
        reason: LiteralError,
    },

    #[error("{0}")]
    Directive(String),

    #[error("image of {required} words is too small for the {actual}-word program")]
    ImageTooSmall { required: usize, actual: usize },

    #[error("`{0}` is already defined")]
    DuplicateSymbol(String),

    #[error("program needs {words} words but ROM holds {capacity}")]
    ProgramTooLarge { words: usize, capacity: usize },
}
