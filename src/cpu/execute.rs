//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! The CPU does not own memory: every step borrows the harness's [`Bus`].

use crate::cpu::bus::Bus;
use crate::cpu::decode::{self, Instruction, Operand};
use crate::cpu::registers::{Flag, Registers};
use crate::isa::Register;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed HALT).
    Halted,
    /// CPU hit an instruction it could not decode.
    Error,
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    Halted,
}

/// The CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count.
    pub cycles: u64,
    /// Last executed instruction (for debugging).
    #[serde(skip)]
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a CPU in its power-on state.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            state: CpuState::Running,
            cycles: 0,
            last_instr: None,
        }
    }

    /// Reset the CPU to its power-on state.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Set the address execution starts from.
    pub fn set_load_address(&mut self, addr: u16) {
        self.regs.pc = addr;
    }

    /// Execute a single instruction.
    pub fn step(&mut self, bus: &mut Bus) -> Result<StepResult, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        // Fetch
        let pc = self.regs.pc;
        let word = bus.read(pc);

        // Decode
        let instr = match decode::decode(word) {
            Ok(instr) => instr,
            Err(source) => {
                self.state = CpuState::Error;
                tracing::error!(pc, word, "invalid instruction");
                return Err(CpuError::InvalidInstruction {
                    pc,
                    word,
                    registers: Box::new(self.regs.clone()),
                    source,
                });
            }
        };
        tracing::trace!(pc, word, %instr, "execute");

        // Execute
        let result = self.execute(instr, bus);

        self.cycles += 1;
        self.last_instr = Some(instr);

        Ok(result)
    }

    /// Run until HALT or until `max_cycles` instructions have executed.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self, bus: &mut Bus, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.cycles - start_cycles < max_cycles {
            if self.step(bus)? == StepResult::Halted {
                break;
            }
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction, bus: &mut Bus) -> StepResult {
        match instr {
            Instruction::Nop => {}

            Instruction::Halt => {
                self.state = CpuState::Halted;
                return StepResult::Halted;
            }

            // ==================== Data Transfer ====================

            Instruction::Mw { dst, src } => {
                let value = self.value(src);
                self.regs.set(dst, value);
            }

            Instruction::Mwl { imm } => {
                let hl = self.regs.get(Register::Hl);
                self.regs.set(Register::Hl, (hl & 0xFF00) | imm as u16);
            }

            Instruction::Mwh { imm } => {
                let hl = self.regs.get(Register::Hl);
                self.regs.set(Register::Hl, (hl & 0x00FF) | (imm as u16) << 8);
            }

            Instruction::Lw { dst, addr } => {
                let value = bus.read(self.value(addr));
                self.regs.set(dst, value);
            }

            Instruction::Sw { addr, src } => {
                bus.write(self.value(addr), self.regs.get(src));
            }

            // ==================== Arithmetic ====================

            Instruction::Add { dst, src } => {
                let (result, carry) = self.regs.get(dst).overflowing_add(self.value(src));
                self.regs.set(dst, result);
                self.regs.set_result_flags(result);
                self.regs.set_flag(Flag::Carry, carry);
            }

            Instruction::Sub { dst, src } => {
                let (result, borrow) = self.regs.get(dst).overflowing_sub(self.value(src));
                self.regs.set(dst, result);
                self.regs.set_result_flags(result);
                self.regs.set_flag(Flag::Carry, borrow);
            }

            Instruction::Addc { dst, src } => {
                let carry_in = self.regs.flag(Flag::Carry) as u16;
                let (partial, c1) = self.regs.get(dst).overflowing_add(self.value(src));
                let (result, c2) = partial.overflowing_add(carry_in);
                self.regs.set(dst, result);
                self.regs.set_result_flags(result);
                self.regs.set_flag(Flag::Carry, c1 || c2);
            }

            Instruction::And { dst, src } => {
                let result = self.regs.get(dst) & self.value(src);
                self.regs.set(dst, result);
                self.regs.set_result_flags(result);
            }

            Instruction::Not { dst, src } => {
                let result = !self.value(src);
                self.regs.set(dst, result);
                self.regs.set_result_flags(result);
            }

            // ==================== Control Flow ====================

            Instruction::Jmpz { target } => {
                if self.regs.flag(Flag::Zero) {
                    let addr = self.value(target);
                    self.regs.jump(addr);
                    return StepResult::Continue;
                }
            }

            Instruction::Jmpn { target } => {
                if self.regs.flag(Flag::Negative) {
                    let addr = self.value(target);
                    self.regs.jump(addr);
                    return StepResult::Continue;
                }
            }

            // ==================== Stack ====================

            Instruction::Push { src } => {
                let value = self.value(src);
                self.regs.sp = self.regs.sp.wrapping_sub(1);
                bus.write(self.regs.sp, value);
            }

            Instruction::Pop { dst } => {
                let value = bus.read(self.regs.sp);
                self.regs.set(dst, value);
                self.regs.sp = self.regs.sp.wrapping_add(1);
            }
        }

        self.regs.advance_pc();
        StepResult::Continue
    }

    /// Value of an operand: an immediate is zero-extended.
    #[inline]
    fn value(&self, operand: Operand) -> u16 {
        match operand {
            Operand::Register(reg) => self.regs.get(reg),
            Operand::Immediate(imm) => imm as u16,
        }
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("machine has been shut down")]
    ShutDown,

    #[error("invalid instruction {word:#06x} at {pc:#06x}: {source}\n{registers}")]
    InvalidInstruction {
        pc: u16,
        word: u16,
        registers: Box<Registers>,
        source: decode::DecodeError,
    },
}
