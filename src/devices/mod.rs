//! Polled devices and the simulation harness.
//!
//! The [`Machine`] owns the bus, the CPU, and the registered devices. Each
//! cycle it services every device in registration order, delivering at most
//! one pending interrupt per device, and then executes exactly one CPU
//! instruction. Everything runs to completion on one thread, so a given
//! program and device-tick sequence always replays the same way.

mod keyboard;
mod screen;

pub use keyboard::{KeyBuffer, KeySource, Keyboard};
#[cfg(feature = "tui")]
pub use keyboard::TerminalKeys;
pub use screen::Screen;

use crate::cpu::{Bus, BusError, Cpu, CpuError, StepResult};
use thiserror::Error;

/// Maximum number of devices a machine accepts.
pub const MAX_DEVICES: usize = 256;

/// A cooperatively polled device.
///
/// A device owns its interrupt-pending state. The harness calls [`tick`]
/// once per cycle; if the device then reports a pending interrupt, the
/// harness takes a byte with [`try_send`], writes it to the device's port,
/// acknowledges it through [`receive`], and finally calls
/// [`clear_interrupt`].
///
/// [`tick`]: Device::tick
/// [`try_send`]: Device::try_send
/// [`receive`]: Device::receive
/// [`clear_interrupt`]: Device::clear_interrupt
pub trait Device {
    fn name(&self) -> &str;

    /// Memory-mapped port interrupt data is written to.
    fn port(&self) -> Option<u16> {
        None
    }

    fn tick(&mut self, cpu: &Cpu, bus: &Bus);

    fn interrupt_pending(&self) -> bool;

    fn try_send(&mut self) -> Option<u8>;

    fn receive(&mut self, cpu: &Cpu, data: u8);

    fn clear_interrupt(&mut self);

    /// Called exactly once when the machine stops.
    fn shutdown(&mut self, cpu: &Cpu);
}

struct Slot {
    device: Box<dyn Device>,
    cycles: u64,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Halted,
    CycleLimit,
}

/// Result of [`Machine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Cycles executed by this run.
    pub cycles: u64,
    pub outcome: RunOutcome,
}

/// The simulation harness.
pub struct Machine {
    /// The CPU. It borrows `bus` on every step.
    pub cpu: Cpu,
    /// Exclusively owned memory.
    pub bus: Bus,
    slots: Vec<Slot>,
    cycles: u64,
    shut_down: bool,
}

impl Machine {
    /// Create a machine with empty memory and no devices.
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            slots: Vec::new(),
            cycles: 0,
            shut_down: false,
        }
    }

    /// Create a machine with `program` in ROM and PC at `load_address`.
    pub fn with_program(program: &[u16], load_address: u16) -> Result<Self, MachineError> {
        let mut machine = Self::new();
        machine.bus.load_program(program)?;
        machine.cpu.set_load_address(load_address);
        Ok(machine)
    }

    /// Register a device. Devices are serviced in registration order.
    pub fn add_device(&mut self, device: Box<dyn Device>) -> Result<(), MachineError> {
        if self.slots.len() >= MAX_DEVICES {
            return Err(MachineError::TooManyDevices { limit: MAX_DEVICES });
        }
        tracing::debug!(device = device.name(), "device attached");
        self.slots.push(Slot { device, cycles: 0 });
        Ok(())
    }

    /// Names of the registered devices, in service order.
    pub fn device_names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.device.name()).collect()
    }

    /// Number of cycles the device at `index` has been ticked.
    pub fn device_cycles(&self, index: usize) -> Option<u64> {
        self.slots.get(index).map(|slot| slot.cycles)
    }

    /// Total cycles run.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Service every device once.
    fn poll_devices(&mut self) {
        for slot in &mut self.slots {
            let device = &mut slot.device;
            device.tick(&self.cpu, &self.bus);

            if device.interrupt_pending() {
                if let Some(data) = device.try_send() {
                    tracing::debug!(device = device.name(), data, "interrupt");
                    if let Some(port) = device.port() {
                        self.bus.write(port, data as u16);
                    }
                    device.receive(&self.cpu, data);
                }
                device.clear_interrupt();
            }

            slot.cycles += 1;
        }
    }

    /// Run one cycle: poll all devices, then execute one instruction.
    ///
    /// Nothing is polled or counted once the CPU has stopped or the devices
    /// have been shut down.
    pub fn cycle(&mut self) -> Result<StepResult, CpuError> {
        if self.shut_down {
            return Err(CpuError::ShutDown);
        }
        if !self.cpu.is_running() {
            return Err(CpuError::NotRunning(self.cpu.state));
        }
        self.cycles += 1;
        self.poll_devices();
        self.cpu.step(&mut self.bus)
    }

    /// Run until HALT, a CPU error, or `max_cycles` cycles.
    ///
    /// Devices are shut down on every exit path.
    pub fn run(&mut self, max_cycles: u64) -> Result<RunSummary, CpuError> {
        let start = self.cycles;

        let result = loop {
            if self.cycles - start >= max_cycles {
                tracing::info!(max_cycles, "cycle limit reached");
                break Ok(RunOutcome::CycleLimit);
            }
            match self.cycle() {
                Ok(StepResult::Halted) => {
                    tracing::info!(cycles = self.cycles, "halted");
                    break Ok(RunOutcome::Halted);
                }
                Ok(StepResult::Continue) => {}
                Err(err) => break Err(err),
            }
        };

        self.shutdown();
        result.map(|outcome| RunSummary {
            cycles: self.cycles - start,
            outcome,
        })
    }

    /// Shut down every device, in registration order. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        for slot in &mut self.slots {
            slot.device.shutdown(&self.cpu);
        }
        self.shut_down = true;
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("cpu", &self.cpu)
            .field("devices", &self.device_names())
            .field("cycles", &self.cycles)
            .finish()
    }
}

/// Errors that can occur while assembling a machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("device limit of {limit} exceeded")]
    TooManyDevices { limit: usize },

    #[error(transparent)]
    Bus(#[from] BusError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{encode, CpuState, Instruction, Operand};
    use crate::isa::Register;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Raises an interrupt on every `every`-th tick and logs each callback.
    struct Recorder {
        name: String,
        port: Option<u16>,
        every: u64,
        ticks: u64,
        pending: bool,
        log: Log,
    }

    impl Recorder {
        fn boxed(name: &str, port: Option<u16>, every: u64, log: &Log) -> Box<dyn Device> {
            Box::new(Recorder {
                name: name.to_string(),
                port,
                every,
                ticks: 0,
                pending: false,
                log: Rc::clone(log),
            })
        }

        fn push(&self, event: String) {
            self.log.borrow_mut().push(event);
        }
    }

    impl Device for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn port(&self) -> Option<u16> {
            self.port
        }

        fn tick(&mut self, cpu: &Cpu, _bus: &Bus) {
            self.ticks += 1;
            self.pending = self.ticks % self.every == 0;
            self.push(format!("{} tick @{}", self.name, cpu.cycles));
        }

        fn interrupt_pending(&self) -> bool {
            self.pending
        }

        fn try_send(&mut self) -> Option<u8> {
            self.push(format!("{} send", self.name));
            Some(self.ticks as u8)
        }

        fn receive(&mut self, _cpu: &Cpu, data: u8) {
            self.push(format!("{} receive {}", self.name, data));
        }

        fn clear_interrupt(&mut self) {
            self.pending = false;
            self.push(format!("{} clear", self.name));
        }

        fn shutdown(&mut self, _cpu: &Cpu) {
            self.push(format!("{} shutdown", self.name));
        }
    }

    fn program(instructions: &[Instruction]) -> Vec<u16> {
        instructions.iter().map(encode).collect()
    }

    #[test]
    fn test_devices_serviced_in_order_before_cpu() {
        let log: Log = Rc::default();
        let mut machine = Machine::with_program(
            &program(&[Instruction::Nop, Instruction::Halt]),
            0,
        )
        .unwrap();
        machine.add_device(Recorder::boxed("first", None, 1, &log)).unwrap();
        machine.add_device(Recorder::boxed("second", None, 2, &log)).unwrap();

        let summary = machine.run(100).unwrap();

        assert_eq!(summary, RunSummary { cycles: 2, outcome: RunOutcome::Halted });
        assert_eq!(
            *log.borrow(),
            vec![
                "first tick @0", "first send", "first receive 1", "first clear",
                "second tick @0",
                "first tick @1", "first send", "first receive 2", "first clear",
                "second tick @1", "second send", "second receive 2", "second clear",
                "first shutdown", "second shutdown",
            ]
        );
        assert_eq!(machine.device_cycles(0), Some(2));
        assert_eq!(machine.device_cycles(2), None);
    }

    #[test]
    fn test_interrupt_data_written_to_port() {
        let log: Log = Rc::default();
        let mut machine = Machine::new();
        machine.add_device(Recorder::boxed("dev", Some(0xC100), 1, &log)).unwrap();

        machine.cycle().unwrap();
        assert_eq!(machine.bus.read(0xC100), 1);
        machine.cycle().unwrap();
        assert_eq!(machine.bus.read(0xC100), 2);
    }

    #[test]
    fn test_cycle_limit_still_shuts_down_once() {
        let log: Log = Rc::default();
        let mut machine = Machine::new();
        machine.add_device(Recorder::boxed("dev", None, 1000, &log)).unwrap();

        let summary = machine.run(5).unwrap();
        machine.shutdown();

        assert_eq!(summary, RunSummary { cycles: 5, outcome: RunOutcome::CycleLimit });
        let shutdowns = log.borrow().iter().filter(|e| e.ends_with("shutdown")).count();
        assert_eq!(shutdowns, 1);
    }

    #[test]
    fn test_no_cycles_after_shutdown() {
        let log: Log = Rc::default();
        let mut machine = Machine::new();
        machine.add_device(Recorder::boxed("dev", None, 1000, &log)).unwrap();

        machine.run(3).unwrap();
        let entries = log.borrow().len();

        assert!(matches!(machine.run(3), Err(CpuError::ShutDown)));
        assert!(matches!(machine.cycle(), Err(CpuError::ShutDown)));
        assert_eq!(machine.cycles(), 3);
        assert_eq!(machine.device_cycles(0), Some(3));
        assert_eq!(log.borrow().len(), entries);
    }

    #[test]
    fn test_no_polling_once_halted() {
        let log: Log = Rc::default();
        let mut machine = Machine::with_program(&program(&[Instruction::Halt]), 0).unwrap();
        machine.add_device(Recorder::boxed("dev", None, 1000, &log)).unwrap();

        assert_eq!(machine.cycle().unwrap(), StepResult::Halted);
        assert!(matches!(
            machine.cycle(),
            Err(CpuError::NotRunning(CpuState::Halted))
        ));
        assert_eq!(machine.cycles(), 1);
        assert_eq!(machine.device_cycles(0), Some(1));
        assert_eq!(log.borrow().iter().filter(|e| e.contains("tick")).count(), 1);
    }

    #[test]
    fn test_cpu_error_shuts_down_devices() {
        let log: Log = Rc::default();
        let mut machine = Machine::with_program(&[0x1001], 0).unwrap();
        machine.add_device(Recorder::boxed("dev", None, 1000, &log)).unwrap();

        assert!(machine.run(10).is_err());
        assert_eq!(log.borrow().last().map(String::as_str), Some("dev shutdown"));
    }

    #[test]
    fn test_device_limit() {
        let log: Log = Rc::default();
        let mut machine = Machine::new();
        for i in 0..MAX_DEVICES {
            machine.add_device(Recorder::boxed(&format!("d{i}"), None, 1, &log)).unwrap();
        }

        let err = machine.add_device(Recorder::boxed("extra", None, 1, &log)).unwrap_err();
        assert_eq!(err, MachineError::TooManyDevices { limit: MAX_DEVICES });
    }

    #[test]
    fn test_keyboard_byte_visible_to_program() {
        let keys = KeyBuffer::from_bytes(b"x");
        let mut machine = Machine::with_program(
            &program(&[
                Instruction::Mwh { imm: 0xFD },
                Instruction::Mwl { imm: 0xFE },
                Instruction::Lw { dst: Register::A, addr: Operand::Register(Register::Hl) },
                Instruction::Halt,
            ]),
            0,
        )
        .unwrap();
        machine.add_device(Box::new(Keyboard::new(keys.clone()))).unwrap();
        machine.add_device(Box::new(Screen::new(1))).unwrap();

        machine.run(100).unwrap();

        assert_eq!(machine.cpu.regs.get(Register::A), b'x' as u16);
        assert!(keys.is_empty());
        assert_eq!(machine.device_names(), vec!["Keyboard", "Screen"]);
    }
}
