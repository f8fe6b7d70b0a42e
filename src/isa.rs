//! Instruction set definition.
//!
//! The canonical opcode table (mnemonic, 4-bit opcode, operand shape) and
//! the register name table. Both the assembler and the CPU decoder consult
//! these tables, so they are the single source of truth for the encoding.

use std::fmt;
use serde::{Serialize, Deserialize};

/// One of the sixteen operations selected by bits 15-12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Nop = 0x0,
    Halt = 0x1,
    Mw = 0x2,
    Mwl = 0x3,
    Mwh = 0x4,
    Lw = 0x5,
    Sw = 0x6,
    Add = 0x7,
    Sub = 0x8,
    And = 0x9,
    Addc = 0xA,
    Not = 0xB,
    Jmpz = 0xC,
    Jmpn = 0xD,
    Push = 0xE,
    Pop = 0xF,
}

/// Operand shape of an instruction.
///
/// The two two-operand shapes differ in which side may hold an immediate:
/// `RegFirstRegOrImm` always has a register destination, while
/// `ImmOrRegRegSecond` (used by `SW`) takes an address first and a
/// register source second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    NoParams,
    RegisterOnly,
    ImmediateOnly,
    RegisterOrImmediate,
    RegFirstRegOrImm,
    ImmOrRegRegSecond,
}

impl Shape {
    /// Number of operands written in source.
    pub fn operand_count(self) -> usize {
        match self {
            Shape::NoParams => 0,
            Shape::RegisterOnly | Shape::ImmediateOnly | Shape::RegisterOrImmediate => 1,
            Shape::RegFirstRegOrImm | Shape::ImmOrRegRegSecond => 2,
        }
    }

    /// Human description used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            Shape::NoParams => "no operands",
            Shape::RegisterOnly => "a register",
            Shape::ImmediateOnly => "an 8-bit immediate",
            Shape::RegisterOrImmediate => "a register or 8-bit immediate",
            Shape::RegFirstRegOrImm => "a register, then a register or 8-bit immediate",
            Shape::ImmOrRegRegSecond => "a register or 8-bit immediate, then a register",
        }
    }
}

impl Opcode {
    /// All opcodes in encoding order.
    pub const ALL: [Opcode; 16] = [
        Opcode::Nop, Opcode::Halt, Opcode::Mw, Opcode::Mwl,
        Opcode::Mwh, Opcode::Lw, Opcode::Sw, Opcode::Add,
        Opcode::Sub, Opcode::And, Opcode::Addc, Opcode::Not,
        Opcode::Jmpz, Opcode::Jmpn, Opcode::Push, Opcode::Pop,
    ];

    /// The opcode held in the low four bits of `bits`.
    ///
    /// Every 4-bit value names an opcode, so this never fails.
    #[inline]
    pub fn from_bits(bits: u8) -> Opcode {
        Self::ALL[(bits & 0xF) as usize]
    }

    /// The 4-bit opcode value.
    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Canonical upper-case mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Halt => "HALT",
            Opcode::Mw => "MW",
            Opcode::Mwl => "MWL",
            Opcode::Mwh => "MWH",
            Opcode::Lw => "LW",
            Opcode::Sw => "SW",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::And => "AND",
            Opcode::Addc => "ADDC",
            Opcode::Not => "NOT",
            Opcode::Jmpz => "JMPZ",
            Opcode::Jmpn => "JMPN",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
        }
    }

    pub fn shape(self) -> Shape {
        match self {
            Opcode::Nop | Opcode::Halt => Shape::NoParams,
            Opcode::Mwl | Opcode::Mwh => Shape::ImmediateOnly,
            Opcode::Mw | Opcode::Lw | Opcode::Add | Opcode::Sub
            | Opcode::And | Opcode::Addc | Opcode::Not => Shape::RegFirstRegOrImm,
            Opcode::Sw => Shape::ImmOrRegRegSecond,
            Opcode::Jmpz | Opcode::Jmpn | Opcode::Push => Shape::RegisterOrImmediate,
            Opcode::Pop => Shape::RegisterOnly,
        }
    }

    /// Look up a mnemonic, ignoring ASCII case.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(mnemonic))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Look up a mnemonic's opcode and operand shape.
pub fn lookup(mnemonic: &str) -> Option<(Opcode, Shape)> {
    Opcode::from_mnemonic(mnemonic).map(|op| (op, op.shape()))
}

/// One of the eight registers addressable by a 3-bit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Register {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    /// Address register for indexed memory access and long jumps.
    Hl = 5,
    Sr = 6,
    /// Condition bits, see [`crate::cpu::Flag`].
    Flag = 7,
}

impl Register {
    /// All registers in index order.
    pub const ALL: [Register; 8] = [
        Register::A, Register::B, Register::C, Register::D,
        Register::E, Register::Hl, Register::Sr, Register::Flag,
    ];

    /// The 3-bit register index.
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// The register for a 3-bit index, if in range.
    pub fn from_index(index: u8) -> Option<Register> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::A => "A",
            Register::B => "B",
            Register::C => "C",
            Register::D => "D",
            Register::E => "E",
            Register::Hl => "HL",
            Register::Sr => "SR",
            Register::Flag => "FLAG",
        }
    }

    /// Parse a register name, ignoring ASCII case. `F` is accepted for `FLAG`.
    pub fn from_name(name: &str) -> Option<Register> {
        if name.eq_ignore_ascii_case("F") {
            return Some(Register::Flag);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|reg| reg.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Index of a named register.
pub fn register_index(name: &str) -> Option<u8> {
    Register::from_name(name).map(Register::index)
}

/// Name of the register at a 3-bit index.
pub fn register_name(index: u8) -> Option<&'static str> {
    Register::from_index(index).map(Register::name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values_follow_table_order() {
        for (value, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(op.bits() as usize, value);
            assert_eq!(Opcode::from_bits(value as u8), *op);
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("MW"), Some((Opcode::Mw, Shape::RegFirstRegOrImm)));
        assert_eq!(lookup("sw"), Some((Opcode::Sw, Shape::ImmOrRegRegSecond)));
        assert_eq!(lookup("POP"), Some((Opcode::Pop, Shape::RegisterOnly)));
        assert_eq!(lookup("MWH"), Some((Opcode::Mwh, Shape::ImmediateOnly)));
        assert_eq!(lookup("JMP"), None);
    }

    #[test]
    fn test_register_table() {
        assert_eq!(register_index("A"), Some(0));
        assert_eq!(register_index("hl"), Some(5));
        assert_eq!(register_index("SR"), Some(6));
        assert_eq!(register_index("FLAG"), Some(7));
        assert_eq!(register_index("F"), Some(7));
        assert_eq!(register_index("PC"), None);
        assert_eq!(register_name(4), Some("E"));
        assert_eq!(register_name(8), None);

        for reg in Register::ALL {
            assert_eq!(Register::from_index(reg.index()), Some(reg));
            assert_eq!(Register::from_name(reg.name()), Some(reg));
        }
    }

    #[test]
    fn test_operand_counts() {
        assert_eq!(Opcode::Halt.shape().operand_count(), 0);
        assert_eq!(Opcode::Push.shape().operand_count(), 1);
        assert_eq!(Opcode::Sw.shape().operand_count(), 2);
    }
}
