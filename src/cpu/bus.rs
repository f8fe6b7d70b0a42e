//! Memory bus.
//!
//! One flat array of 65536 sixteen-bit words. The regions below are a
//! software convention; the bus itself accepts any 16-bit address.
//!
//! | Range           | Region                         |
//! |-----------------|--------------------------------|
//! | `0x0000-0x7FFF` | ROM, loaded from the image     |
//! | `0x8000-0xBFFF` | VRAM, memory-mapped display    |
//! | `0xC000-0xFDFD` | RAM and the descending stack   |
//! | `0xFDFE`        | keyboard input port            |

use std::fmt;
use thiserror::Error;

/// Total number of addressable words.
pub const MEMORY_SIZE: usize = 0x1_0000;

pub const ROM_BEGIN: u16 = 0x0000;
pub const ROM_END: u16 = 0x7FFF;
/// ROM capacity in words.
pub const ROM_SIZE: usize = 32_768;

pub const VRAM_BEGIN: u16 = 0x8000;
pub const VRAM_END: u16 = 0xBFFF;
pub const VRAM_SIZE: usize = 16_384;

pub const RAM_BEGIN: u16 = 0xC000;
pub const RAM_END: u16 = 0xFDFD;

/// Initial stack pointer. The stack grows toward `RAM_BEGIN`.
pub const STACK_TOP: u16 = RAM_END;

/// Memory-mapped keyboard port.
pub const KEYBOARD_PORT: u16 = 0xFDFE;

/// Region of the address space an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Rom,
    Vram,
    Ram,
    Keyboard,
    /// `0xFDFF-0xFFFF`, outside any documented region.
    Unmapped,
}

impl Region {
    pub fn of(addr: u16) -> Region {
        match addr {
            ROM_BEGIN..=ROM_END => Region::Rom,
            VRAM_BEGIN..=VRAM_END => Region::Vram,
            RAM_BEGIN..=RAM_END => Region::Ram,
            KEYBOARD_PORT => Region::Keyboard,
            _ => Region::Unmapped,
        }
    }
}

/// The memory bus. Owned by the harness; the CPU and devices borrow it.
#[derive(Clone)]
pub struct Bus {
    cells: Vec<u16>,
}

impl Bus {
    /// Create a bus with all words zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    #[inline]
    pub fn read(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        self.cells[addr as usize] = value;
    }

    /// Copy an assembled image into ROM starting at word 0.
    pub fn load_program(&mut self, program: &[u16]) -> Result<(), BusError> {
        if program.len() > ROM_SIZE {
            return Err(BusError::ProgramTooLarge {
                size: program.len(),
                available: ROM_SIZE,
            });
        }

        self.cells[..program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Borrow a contiguous range of words, clamped to the address space.
    pub fn slice(&self, start: u16, count: usize) -> &[u16] {
        let start = start as usize;
        let end = (start + count).min(MEMORY_SIZE);
        &self.cells[start..end]
    }

    /// Dump `(address, value)` pairs (for debugging).
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, u16)> {
        self.slice(start, count)
            .iter()
            .enumerate()
            .map(|(i, &value)| (start.wrapping_add(i as u16), value))
            .collect()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Bus")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur when loading the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("program size {size} exceeds ROM capacity of {available} words")]
    ProgramTooLarge { size: usize, available: usize },
}
