//! Screen device.
//!
//! VRAM is read as a text grid: the low byte of each word is one ASCII
//! cell, [`COLUMNS`] cells per row starting at `VRAM_BEGIN`. The screen
//! never raises interrupts.

use super::Device;
use crate::cpu::bus::{VRAM_BEGIN, VRAM_SIZE};
use crate::cpu::{Bus, Cpu};

pub const COLUMNS: usize = 80;
pub const ROWS: usize = 25;

/// The screen device.
#[derive(Debug, Clone)]
pub struct Screen {
    refresh_interval: u64,
    ticks: u64,
    frame: Vec<String>,
    frames_rendered: u64,
}

impl Screen {
    /// Create a screen that re-reads VRAM every `refresh_interval` ticks.
    pub fn new(refresh_interval: u64) -> Self {
        Self {
            refresh_interval: refresh_interval.max(1),
            ticks: 0,
            frame: vec![String::new(); ROWS],
            frames_rendered: 0,
        }
    }

    /// Render the visible VRAM rows, trailing blanks trimmed.
    pub fn render(bus: &Bus) -> Vec<String> {
        debug_assert!(COLUMNS * ROWS <= VRAM_SIZE);

        (0..ROWS)
            .map(|row| {
                let start = VRAM_BEGIN + (row * COLUMNS) as u16;
                let line: String = bus
                    .slice(start, COLUMNS)
                    .iter()
                    .map(|&word| match (word & 0xFF) as u8 {
                        c @ 0x20..=0x7E => c as char,
                        _ => ' ',
                    })
                    .collect();
                line.trim_end().to_string()
            })
            .collect()
    }

    /// Rendered VRAM as text, without trailing empty rows.
    pub fn text(bus: &Bus) -> String {
        let rows = Self::render(bus);
        let used = rows.iter().rposition(|row| !row.is_empty()).map_or(0, |i| i + 1);
        rows[..used].join("\n")
    }

    /// The most recently rendered frame.
    pub fn frame(&self) -> &[String] {
        &self.frame
    }

    /// Number of refreshes that changed the frame.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

impl Device for Screen {
    fn name(&self) -> &str {
        "Screen"
    }

    fn tick(&mut self, _cpu: &Cpu, bus: &Bus) {
        self.ticks += 1;
        if self.ticks % self.refresh_interval != 0 {
            return;
        }

        let frame = Self::render(bus);
        if frame != self.frame {
            self.frame = frame;
            self.frames_rendered += 1;
            tracing::trace!(frames = self.frames_rendered, "screen refreshed");
        }
    }

    fn interrupt_pending(&self) -> bool {
        false
    }

    fn try_send(&mut self) -> Option<u8> {
        None
    }

    fn receive(&mut self, _cpu: &Cpu, _data: u8) {}

    fn clear_interrupt(&mut self) {}

    fn shutdown(&mut self, _cpu: &Cpu) {
        tracing::info!(frames = self.frames_rendered, "screen shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_vram_text() {
        let mut bus = Bus::new();
        for (i, c) in "HI".bytes().enumerate() {
            bus.write(VRAM_BEGIN + i as u16, c as u16);
        }
        bus.write(VRAM_BEGIN + COLUMNS as u16, 0x1F00 | b'!' as u16);
        bus.write(VRAM_BEGIN + COLUMNS as u16 + 1, 0x07);

        let rows = Screen::render(&bus);
        assert_eq!(rows.len(), ROWS);
        assert_eq!(rows[0], "HI");
        assert_eq!(rows[1], "!");
        assert_eq!(Screen::text(&bus), "HI\n!");
        assert_eq!(Screen::text(&Bus::new()), "");
    }

    #[test]
    fn test_refresh_interval() {
        let cpu = Cpu::new();
        let mut bus = Bus::new();
        let mut screen = Screen::new(3);

        bus.write(VRAM_BEGIN, b'A' as u16);
        screen.tick(&cpu, &bus);
        screen.tick(&cpu, &bus);
        assert_eq!(screen.frames_rendered(), 0);

        screen.tick(&cpu, &bus);
        assert_eq!(screen.frames_rendered(), 1);
        assert_eq!(screen.frame()[0], "A");

        // unchanged VRAM is not a new frame
        for _ in 0..3 {
            screen.tick(&cpu, &bus);
        }
        assert_eq!(screen.frames_rendered(), 1);
        assert!(!screen.interrupt_pending());
    }
}
