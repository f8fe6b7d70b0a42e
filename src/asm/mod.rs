//! Assembler and disassembler.
//!
//! This module provides:
//! - A two-pass assembler (text → 16-bit words)
//! - The raw binary image format
//! - A disassembler (words → readable text)

pub mod assembler;
pub mod disasm;
pub mod image;
pub mod literal;

pub use assembler::{assemble, assemble_file, assemble_named, AssemblerError, ErrorKind, Program, SymbolTable};
pub use disasm::{disassemble, listing};
pub use image::{load_image, save_image, ImageError};
pub use literal::LiteralError;
