//! # bit16
//!
//! A small 16-bit instruction set with its two-pass assembler and an
//! emulator: CPU, memory bus and cooperatively polled devices.
//!
//! The assembler and the CPU decoder share one opcode table ([`isa`]), so
//! every word the assembler emits is exactly what the decoder expects.

pub mod isa;
pub mod cpu;
pub mod devices;
pub mod asm;
pub mod config;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use isa::{Opcode, Register, Shape};
pub use cpu::{Bus, Cpu, CpuError, CpuState, Instruction, Operand, Registers};
pub use devices::{Device, KeyBuffer, Keyboard, Machine, MachineError, RunOutcome, RunSummary, Screen};
pub use asm::{assemble, disassemble, AssemblerError, Program, load_image, save_image};
pub use config::EmulatorConfig;

#[cfg(feature = "tui")]
pub use tui::run_debugger;
