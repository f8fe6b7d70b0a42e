//! Instruction encoding and decoding.
//!
//! Every instruction is one 16-bit word, MSB first:
//!
//! ```text
//! 15    12  11   10   8  7     5 4     0
//! +--------+----+------+--------------+
//! | opcode |mode| reg1 | reg2 | 00000 |   mode = 0
//! | opcode |mode| reg1 |     imm8     |   mode = 1
//! +--------+----+------+--------------+
//! ```
//!
//! A register in the first operand goes to `reg1`, a register in the second
//! operand to `reg2`, and an immediate to `imm8` with the mode bit set. `SW`
//! is the exception: its source register lives in `reg1` and its address
//! operand in the `reg2`/`imm8` slot, so `SW 0x10, A` still fits one word.

use std::fmt;
use crate::isa::{Opcode, Register, Shape};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// A resolved operand: a register or an 8-bit immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Register(Register),
    Immediate(u8),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(reg) => write!(f, "{}", reg),
            Operand::Immediate(imm) => write!(f, "{}", imm),
        }
    }
}

/// Decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// No operation
    Nop,

    /// Stop execution; PC stays on the HALT
    Halt,

    /// Move: dst := src
    Mw { dst: Register, src: Operand },

    /// Load low byte of HL: HL := (HL & 0xFF00) | imm
    Mwl { imm: u8 },

    /// Load high byte of HL: HL := (HL & 0x00FF) | imm << 8
    Mwh { imm: u8 },

    /// Load word: dst := [addr]
    Lw { dst: Register, addr: Operand },

    /// Store word: [addr] := src
    Sw { addr: Operand, src: Register },

    /// dst := dst + src
    Add { dst: Register, src: Operand },

    /// dst := dst - src
    Sub { dst: Register, src: Operand },

    /// dst := dst & src
    And { dst: Register, src: Operand },

    /// dst := dst + src + Carry
    Addc { dst: Register, src: Operand },

    /// dst := !src
    Not { dst: Register, src: Operand },

    /// Jump if Zero is set
    Jmpz { target: Operand },

    /// Jump if Negative is set
    Jmpn { target: Operand },

    /// SP -= 1; [SP] := src
    Push { src: Operand },

    /// dst := [SP]; SP += 1
    Pop { dst: Register },
}

impl Instruction {
    /// Build an instruction from its opcode and source-order operands.
    ///
    /// Fails if the operands do not fit the opcode's shape.
    pub fn from_parts(
        opcode: Opcode,
        operand1: Option<Operand>,
        operand2: Option<Operand>,
    ) -> Result<Instruction, DecodeError> {
        use Operand::{Immediate as Imm, Register as Reg};

        let instr = match (opcode, operand1, operand2) {
            (Opcode::Nop, None, None) => Instruction::Nop,
            (Opcode::Halt, None, None) => Instruction::Halt,
            (Opcode::Mw, Some(Reg(dst)), Some(src)) => Instruction::Mw { dst, src },
            (Opcode::Mwl, Some(Imm(imm)), None) => Instruction::Mwl { imm },
            (Opcode::Mwh, Some(Imm(imm)), None) => Instruction::Mwh { imm },
            (Opcode::Lw, Some(Reg(dst)), Some(addr)) => Instruction::Lw { dst, addr },
            (Opcode::Sw, Some(addr), Some(Reg(src))) => Instruction::Sw { addr, src },
            (Opcode::Add, Some(Reg(dst)), Some(src)) => Instruction::Add { dst, src },
            (Opcode::Sub, Some(Reg(dst)), Some(src)) => Instruction::Sub { dst, src },
            (Opcode::And, Some(Reg(dst)), Some(src)) => Instruction::And { dst, src },
            (Opcode::Addc, Some(Reg(dst)), Some(src)) => Instruction::Addc { dst, src },
            (Opcode::Not, Some(Reg(dst)), Some(src)) => Instruction::Not { dst, src },
            (Opcode::Jmpz, Some(target), None) => Instruction::Jmpz { target },
            (Opcode::Jmpn, Some(target), None) => Instruction::Jmpn { target },
            (Opcode::Push, Some(src), None) => Instruction::Push { src },
            (Opcode::Pop, Some(Reg(dst)), None) => Instruction::Pop { dst },
            _ => {
                return Err(DecodeError::ShapeMismatch {
                    mnemonic: opcode.mnemonic(),
                    shape: opcode.shape(),
                })
            }
        };

        Ok(instr)
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::Halt => Opcode::Halt,
            Instruction::Mw { .. } => Opcode::Mw,
            Instruction::Mwl { .. } => Opcode::Mwl,
            Instruction::Mwh { .. } => Opcode::Mwh,
            Instruction::Lw { .. } => Opcode::Lw,
            Instruction::Sw { .. } => Opcode::Sw,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Sub { .. } => Opcode::Sub,
            Instruction::And { .. } => Opcode::And,
            Instruction::Addc { .. } => Opcode::Addc,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Jmpz { .. } => Opcode::Jmpz,
            Instruction::Jmpn { .. } => Opcode::Jmpn,
            Instruction::Push { .. } => Opcode::Push,
            Instruction::Pop { .. } => Opcode::Pop,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        self.opcode().mnemonic()
    }

    pub fn shape(&self) -> Shape {
        self.opcode().shape()
    }

    /// Operands in source order.
    pub fn operands(&self) -> (Option<Operand>, Option<Operand>) {
        let reg = Operand::Register;
        match *self {
            Instruction::Nop | Instruction::Halt => (None, None),
            Instruction::Mwl { imm } | Instruction::Mwh { imm } => {
                (Some(Operand::Immediate(imm)), None)
            }
            Instruction::Mw { dst, src }
            | Instruction::Add { dst, src }
            | Instruction::Sub { dst, src }
            | Instruction::And { dst, src }
            | Instruction::Addc { dst, src }
            | Instruction::Not { dst, src } => (Some(reg(dst)), Some(src)),
            Instruction::Lw { dst, addr } => (Some(reg(dst)), Some(addr)),
            Instruction::Sw { addr, src } => (Some(addr), Some(reg(src))),
            Instruction::Jmpz { target } | Instruction::Jmpn { target } => (Some(target), None),
            Instruction::Push { src } => (Some(src), None),
            Instruction::Pop { dst } => (Some(reg(dst)), None),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())?;
        match self.operands() {
            (Some(first), Some(second)) => write!(f, " {}, {}", first, second),
            (Some(first), None) => write!(f, " {}", first),
            _ => Ok(()),
        }
    }
}

/// The raw bit fields of an instruction word.
///
/// `operand` is `reg2` (0-7) when `immediate` is false, `imm8` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub opcode: u8,
    pub immediate: bool,
    pub reg1: u8,
    pub operand: u8,
}

impl Encoding {
    /// Pack the fields into a word. Out-of-range fields are masked.
    pub fn pack(self) -> u16 {
        let low = if self.immediate {
            self.operand as u16
        } else {
            ((self.operand & 0x7) as u16) << 5
        };

        ((self.opcode & 0xF) as u16) << 12
            | (self.immediate as u16) << 11
            | ((self.reg1 & 0x7) as u16) << 8
            | low
    }

    /// Split a word into its fields. Bits 4-0 are dropped when mode is 0.
    pub fn unpack(word: u16) -> Encoding {
        let immediate = word & 0x0800 != 0;
        Encoding {
            opcode: (word >> 12) as u8,
            immediate,
            reg1: ((word >> 8) & 0x7) as u8,
            operand: if immediate {
                (word & 0xFF) as u8
            } else {
                ((word >> 5) & 0x7) as u8
            },
        }
    }
}

/// Encode an instruction into its 16-bit word.
pub fn encode(instr: &Instruction) -> u16 {
    let (first, second) = instr.operands();
    let reg_bits = |op: Option<Operand>| match op {
        Some(Operand::Register(reg)) => reg.index(),
        _ => 0,
    };

    // (reg1 field, operand for the reg2/imm8 slot)
    let (reg1, slot) = match instr.shape() {
        Shape::NoParams => (0, None),
        Shape::RegisterOnly | Shape::ImmediateOnly | Shape::RegisterOrImmediate => match first {
            Some(Operand::Register(reg)) => (reg.index(), None),
            other => (0, other),
        },
        Shape::RegFirstRegOrImm => (reg_bits(first), second),
        Shape::ImmOrRegRegSecond => (reg_bits(second), first),
    };

    let (immediate, operand) = match slot {
        Some(Operand::Immediate(imm)) => (true, imm),
        Some(Operand::Register(reg)) => (false, reg.index()),
        None => (false, 0),
    };

    Encoding {
        opcode: instr.opcode().bits(),
        immediate,
        reg1,
        operand,
    }
    .pack()
}

/// Decode a 16-bit word.
///
/// Bits the instruction's shape does not use must be zero, and the mode
/// bit must agree with the shape.
pub fn decode(word: u16) -> Result<Instruction, DecodeError> {
    let enc = Encoding::unpack(word);
    let opcode = Opcode::from_bits(enc.opcode);
    let malformed = || DecodeError::MalformedWord {
        word,
        mnemonic: opcode.mnemonic(),
    };

    if !enc.immediate && word & 0x1F != 0 {
        return Err(malformed());
    }

    let reg1 = Register::from_index(enc.reg1).ok_or_else(malformed)?;
    let slot = if enc.immediate {
        Operand::Immediate(enc.operand)
    } else {
        Operand::Register(Register::from_index(enc.operand).ok_or_else(malformed)?)
    };

    let (first, second) = match opcode.shape() {
        Shape::NoParams => {
            if word & 0x0FFF != 0 {
                return Err(malformed());
            }
            (None, None)
        }
        Shape::RegisterOnly => {
            if enc.immediate || enc.operand != 0 {
                return Err(malformed());
            }
            (Some(Operand::Register(reg1)), None)
        }
        Shape::ImmediateOnly => {
            if !enc.immediate || enc.reg1 != 0 {
                return Err(malformed());
            }
            (Some(slot), None)
        }
        Shape::RegisterOrImmediate => {
            if enc.immediate {
                if enc.reg1 != 0 {
                    return Err(malformed());
                }
                (Some(slot), None)
            } else {
                if enc.operand != 0 {
                    return Err(malformed());
                }
                (Some(Operand::Register(reg1)), None)
            }
        }
        Shape::RegFirstRegOrImm => (Some(Operand::Register(reg1)), Some(slot)),
        Shape::ImmOrRegRegSecond => (Some(slot), Some(Operand::Register(reg1))),
    };

    Instruction::from_parts(opcode, first, second)
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("word {word:#06x} is not a valid {mnemonic} encoding")]
    MalformedWord { word: u16, mnemonic: &'static str },

    #[error("{mnemonic} takes {}", shape.describe())]
    ShapeMismatch { mnemonic: &'static str, shape: Shape },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_no_param_words() {
        assert_eq!(encode(&Instruction::Nop), 0x0000);
        assert_eq!(encode(&Instruction::Halt), 0x1000);
        assert_eq!(decode(0x0000).unwrap(), Instruction::Nop);
        assert_eq!(decode(0x1000).unwrap(), Instruction::Halt);
    }

    #[test]
    fn test_immediate_sets_mode_bit() {
        let mw = Instruction::Mw { dst: Register::A, src: Operand::Immediate(5) };
        assert_eq!(encode(&mw), 0x2805);
        assert_eq!(decode(0x2805).unwrap(), mw);
    }

    #[test]
    fn test_register_operand_in_reg2() {
        // ADD C, HL: opcode 7, mode 0, reg1 = 2, reg2 = 5
        let add = Instruction::Add { dst: Register::C, src: Operand::Register(Register::Hl) };
        assert_eq!(encode(&add), 0x7000 | 2 << 8 | 5 << 5);
    }

    #[test]
    fn test_store_keeps_source_in_reg1() {
        let sw = Instruction::Sw { addr: Operand::Immediate(0x10), src: Register::B };
        assert_eq!(encode(&sw), 0x6000 | 0x0800 | 1 << 8 | 0x10);

        let sw = Instruction::Sw { addr: Operand::Register(Register::Hl), src: Register::B };
        assert_eq!(encode(&sw), 0x6000 | 1 << 8 | 5 << 5);
        assert_eq!(decode(encode(&sw)).unwrap(), sw);
    }

    #[test]
    fn test_single_operand_register_in_reg1() {
        let pop = Instruction::Pop { dst: Register::D };
        assert_eq!(encode(&pop), 0xF300);

        let jmp = Instruction::Jmpz { target: Operand::Register(Register::Hl) };
        assert_eq!(encode(&jmp), 0xC500);

        let push = Instruction::Push { src: Operand::Immediate(0xFF) };
        assert_eq!(encode(&push), 0xE8FF);
    }

    #[test]
    fn test_decode_rejects_malformed_words() {
        // HALT with stray operand bits
        assert!(matches!(decode(0x1001), Err(DecodeError::MalformedWord { .. })));
        // MWH without the mode bit
        assert!(matches!(decode(0x4012), Err(DecodeError::MalformedWord { .. })));
        // register form with bits 4-0 set
        assert!(matches!(decode(0x2001), Err(DecodeError::MalformedWord { .. })));
        // POP cannot take an immediate
        assert!(matches!(decode(0xF805), Err(DecodeError::MalformedWord { .. })));
        // immediate PUSH with a stray reg1
        assert!(matches!(decode(0xE905), Err(DecodeError::MalformedWord { .. })));
    }

    #[test]
    fn test_from_parts_checks_shape() {
        let err = Instruction::from_parts(Opcode::Pop, Some(Operand::Immediate(1)), None)
            .unwrap_err();
        assert_eq!(err, DecodeError::ShapeMismatch { mnemonic: "POP", shape: Shape::RegisterOnly });
        assert_eq!(err.to_string(), "POP takes a register");

        assert!(Instruction::from_parts(Opcode::Halt, None, None).is_ok());
        assert!(Instruction::from_parts(Opcode::Mw, Some(Operand::Register(Register::A)), None).is_err());
    }

    #[test]
    fn test_display() {
        let sw = Instruction::Sw { addr: Operand::Immediate(16), src: Register::A };
        assert_eq!(sw.to_string(), "SW 16, A");
        assert_eq!(Instruction::Mwh { imm: 0 }.to_string(), "MWH 0");
        assert_eq!(Instruction::Pop { dst: Register::Flag }.to_string(), "POP FLAG");
        assert_eq!(Instruction::Halt.to_string(), "HALT");
    }

    fn any_encoding() -> impl Strategy<Value = Encoding> {
        (0u8..16, any::<bool>(), 0u8..8, any::<u8>()).prop_map(|(opcode, immediate, reg1, operand)| {
            Encoding {
                opcode,
                immediate,
                reg1,
                operand: if immediate { operand } else { operand & 0x7 },
            }
        })
    }

    proptest! {
        #[test]
        fn prop_fields_survive_packing(enc in any_encoding()) {
            prop_assert_eq!(Encoding::unpack(enc.pack()), enc);
        }

        #[test]
        fn prop_well_formed_words_reencode(word in any::<u16>()) {
            if let Ok(instr) = decode(word) {
                prop_assert_eq!(encode(&instr), word);
            }
        }
    }
}
