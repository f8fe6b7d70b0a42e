//! CPU emulation.
//!
//! - 65536-word flat memory bus with a ROM/VRAM/RAM/keyboard map
//! - 8 registers (A, B, C, D, E, HL, SR, FLAG) plus PC and SP
//! - 16-instruction set, one 16-bit word per instruction

pub mod bus;
pub mod registers;
pub mod decode;
pub mod execute;

pub use bus::{Bus, BusError, Region};
pub use registers::{Flag, Registers};
pub use decode::{decode, encode, DecodeError, Encoding, Instruction, Operand};
pub use execute::{Cpu, CpuError, CpuState, StepResult};
