//! CPU register file.
//!
//! Eight 16-bit registers addressable by a 3-bit index:
//! - A, B, C, D, E: general purpose
//! - HL: address register for indexed loads/stores and long jumps
//! - SR: general purpose, saved-result by convention
//! - FLAG: condition bits (Zero, Negative, Carry)
//!
//! plus the program counter and the stack pointer.

use std::fmt;
use serde::{Serialize, Deserialize};
use crate::isa::Register;
use crate::cpu::bus::STACK_TOP;

/// Condition bits held in the FLAG register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    Zero = 0,
    Negative = 1,
    Carry = 2,
}

impl Flag {
    /// Bit mask of this flag within FLAG.
    #[inline]
    pub fn mask(self) -> u16 {
        1 << (self as u16)
    }
}

/// The register file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// A, B, C, D, E, HL, SR, FLAG in index order.
    gpr: [u16; 8],

    /// Program counter (word address).
    pub pc: u16,

    /// Stack pointer, grows downward from [`STACK_TOP`].
    pub sp: u16,
}

impl Registers {
    /// Create a register file in its power-on state.
    pub fn new() -> Self {
        Self {
            gpr: [0; 8],
            pc: 0,
            sp: STACK_TOP,
        }
    }

    /// Reset to the power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn get(&self, reg: Register) -> u16 {
        self.gpr[reg.index() as usize]
    }

    #[inline]
    pub fn set(&mut self, reg: Register, value: u16) {
        self.gpr[reg.index() as usize] = value;
    }

    /// Test a condition bit.
    pub fn flag(&self, flag: Flag) -> bool {
        self.get(Register::Flag) & flag.mask() != 0
    }

    pub fn set_flag(&mut self, flag: Flag, on: bool) {
        let bits = self.get(Register::Flag);
        let bits = if on { bits | flag.mask() } else { bits & !flag.mask() };
        self.set(Register::Flag, bits);
    }

    /// Update Zero and Negative from a result.
    pub fn set_result_flags(&mut self, result: u16) {
        self.set_flag(Flag::Zero, result == 0);
        self.set_flag(Flag::Negative, result & 0x8000 != 0);
    }

    /// Increment the program counter by 1, wrapping at 16 bits.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u16) {
        self.pc = addr;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// Register dump in the layout printed after a fatal error.
impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "A: {:04x} B: {:04x} C: {:04x} D: {:04x} E: {:04x} HL: {:04x}",
            self.get(Register::A),
            self.get(Register::B),
            self.get(Register::C),
            self.get(Register::D),
            self.get(Register::E),
            self.get(Register::Hl),
        )?;
        writeln!(f, "FLAG: {:04x}", self.get(Register::Flag))?;
        writeln!(f, "PC: {:04x} SP: {:04x}", self.pc, self.sp)?;
        write!(f, "SR: {:04x}", self.get(Register::Sr))
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Registers");
        for reg in Register::ALL {
            s.field(reg.name(), &format_args!("{:#06x}", self.get(reg)));
        }
        s.field("PC", &format_args!("{:#06x}", self.pc))
            .field("SP", &format_args!("{:#06x}", self.sp))
            .finish()
    }
}
