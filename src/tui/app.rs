//! Debugger application state and logic.

use crate::asm::disasm::disassemble_instruction;
use crate::config::DEFAULT_SCREEN_REFRESH;
use crate::cpu::StepResult;
use crate::devices::{KeyBuffer, Keyboard, Machine, MachineError, Screen};
use std::collections::HashSet;

/// Instructions executed per UI frame while running.
const STEPS_PER_FRAME: usize = 2000;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub machine: Machine,
    /// Original image for resets.
    pub program: Vec<u16>,
    pub load_address: u16,
    /// Keys typed in input mode go here.
    pub keys: KeyBuffer,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u16>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Keys go to the emulated keyboard instead of the debugger.
    pub input_mode: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// First address shown in the memory view.
    pub mem_scroll: u16,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(program: Vec<u16>, load_address: u16) -> Result<Self, MachineError> {
        let keys = KeyBuffer::new();
        let machine = build_machine(&program, load_address, &keys)?;

        Ok(Self {
            machine,
            program,
            load_address,
            keys,
            breakpoints: HashSet::new(),
            running: false,
            input_mode: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: crate::cpu::bus::RAM_BEGIN,
        })
    }

    /// Step one cycle.
    pub fn step(&mut self) {
        if !self.machine.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.machine.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.machine.cpu.regs.pc;
        match self.machine.cycle() {
            Ok(StepResult::Continue) => {
                let disasm = self
                    .machine
                    .cpu
                    .last_instruction()
                    .map(|instr| instr.to_string())
                    .unwrap_or_default();
                self.status = format!("PC={:04x}: {}", pc, disasm);
            }
            Ok(StepResult::Halted) => {
                self.status = format!("Halted after {} cycles", self.machine.cycles());
                self.running = false;
            }
            Err(e) => {
                self.status = format!("Error: {}", e.to_string().lines().next().unwrap_or(""));
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one frame of continuous execution.
    pub fn tick(&mut self) {
        for _ in 0..STEPS_PER_FRAME {
            if !self.running {
                return;
            }

            if !self.machine.cpu.is_running() {
                self.running = false;
                self.status = format!("Stopped after {} cycles", self.machine.cycles());
                return;
            }

            // Check for breakpoint
            let pc = self.machine.cpu.regs.pc;
            if self.breakpoints.contains(&pc) {
                self.running = false;
                self.status = format!("Breakpoint at PC={:04x}", pc);
                return;
            }

            self.step();
        }
    }

    /// Toggle breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.machine.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={:04x}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:04x}", pc);
        }
    }

    /// Feed a typed byte to the emulated keyboard.
    pub fn type_key(&mut self, key: u8) {
        self.keys.push(key);
        self.status = format!("Queued key {:#04x} ({} pending)", key, self.keys.len());
    }

    /// Rebuild the machine from the original image.
    pub fn reset(&mut self) {
        self.machine.shutdown();
        self.keys = KeyBuffer::new();
        match build_machine(&self.program, self.load_address, &self.keys) {
            Ok(machine) => {
                self.machine = machine;
                self.status = "Reset. Ready.".into();
            }
            Err(e) => self.status = format!("Reset failed: {}", e),
        }
        self.running = false;
    }

    /// Get disassembly around current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u16, String, bool)> {
        let pc = self.machine.cpu.regs.pc;
        let start = pc.saturating_sub((lines / 2) as u16);

        (0..lines)
            .map_while(|i| {
                let addr = start.checked_add(i as u16)?;
                let disasm = disassemble_instruction(self.machine.bus.read(addr));
                Some((addr, disasm, addr == pc))
            })
            .collect()
    }

    /// Current VRAM text.
    pub fn screen_rows(&self) -> Vec<String> {
        Screen::render(&self.machine.bus)
    }

    pub fn scroll_memory(&mut self, delta: i32) {
        self.mem_scroll = (self.mem_scroll as i32 + delta).clamp(0, 0xFFF0) as u16;
    }
}

fn build_machine(program: &[u16], load_address: u16, keys: &KeyBuffer) -> Result<Machine, MachineError> {
    let mut machine = Machine::with_program(program, load_address)?;
    machine.add_device(Box::new(Keyboard::new(keys.clone())))?;
    machine.add_device(Box::new(Screen::new(DEFAULT_SCREEN_REFRESH)))?;
    Ok(machine)
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<u16>, load_address: u16) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Create app
    let mut app = DebuggerApp::new(program, load_address)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(30))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.input_mode {
                        match key.code {
                            KeyCode::Esc => {
                                app.input_mode = false;
                                app.status = "Debugger controls.".into();
                            }
                            KeyCode::Enter => app.type_key(b'\n'),
                            KeyCode::Backspace => app.type_key(0x08),
                            KeyCode::Char(c) if c.is_ascii() => app.type_key(c as u8),
                            _ => {}
                        }
                    } else {
                        match key.code {
                            KeyCode::Char('q') => app.should_quit = true,
                            KeyCode::Char('s') => {
                                app.running = false;
                                app.step();
                            }
                            KeyCode::Char('r') => app.run(),
                            KeyCode::Char('p') => {
                                app.running = false;
                                app.status = "Paused.".into();
                            }
                            KeyCode::Char('b') => app.toggle_breakpoint(),
                            KeyCode::Char('x') => app.reset(),
                            KeyCode::Char('i') => {
                                app.input_mode = true;
                                app.status = "Typing to keyboard. Esc returns.".into();
                            }
                            KeyCode::Up => app.scroll_memory(-1),
                            KeyCode::Down => app.scroll_memory(1),
                            KeyCode::PageUp => app.scroll_memory(-16),
                            KeyCode::PageDown => app.scroll_memory(16),
                            _ => {}
                        }
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    app.machine.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    fn app(source: &str) -> DebuggerApp {
        let words = assemble(source).unwrap().words();
        DebuggerApp::new(words, 0).unwrap()
    }

    #[test]
    fn test_step_and_breakpoint() {
        let mut app = app("NOP\nNOP\nHALT");

        app.step();
        assert_eq!(app.machine.cpu.regs.pc, 1);
        assert!(app.status.contains("NOP"));

        app.toggle_breakpoint();
        app.run();
        app.tick();
        assert!(!app.running);
        assert_eq!(app.machine.cpu.regs.pc, 1);

        app.toggle_breakpoint();
        app.run();
        app.tick();
        assert!(app.machine.cpu.is_halted());
    }

    #[test]
    fn test_typed_keys_reach_program() {
        let mut app = app("MWH 0xFD\nMWL 0xFE\nLW A, HL\nHALT");
        app.type_key(b'k');

        app.run();
        app.tick();

        assert_eq!(app.machine.cpu.regs.get(crate::isa::Register::A), b'k' as u16);
    }

    #[test]
    fn test_reset_restores_program() {
        let mut app = app("MW A, 9\nHALT");
        app.run();
        app.tick();
        assert!(app.machine.cpu.is_halted());

        app.reset();
        assert!(app.machine.cpu.is_running());
        assert_eq!(app.machine.cpu.regs.pc, 0);

        let view = app.get_disassembly(4);
        assert_eq!(view[0], (0, "MW A, 9".to_string(), true));
        assert_eq!(view[1].1, "HALT");
    }
}
