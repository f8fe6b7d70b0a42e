//! Keyboard device.
//!
//! Each tick the keyboard polls its [`KeySource`]; a key raises an
//! interrupt and its byte is written to [`KEYBOARD_PORT`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::Device;
use crate::cpu::bus::KEYBOARD_PORT;
use crate::cpu::{Bus, Cpu};

/// Somewhere key presses come from.
pub trait KeySource {
    /// Return the next key without blocking.
    fn poll_key(&mut self) -> Option<u8>;
}

/// Shared queue of scripted key presses.
///
/// Clones share the same queue, so a front end can keep one handle and
/// push keys while the keyboard device drains the other.
#[derive(Debug, Clone, Default)]
pub struct KeyBuffer(Rc<RefCell<VecDeque<u8>>>);

impl KeyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let buffer = Self::new();
        buffer.push_bytes(bytes);
        buffer
    }

    pub fn push(&self, key: u8) {
        self.0.borrow_mut().push_back(key);
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.0.borrow_mut().extend(bytes.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

impl KeySource for KeyBuffer {
    fn poll_key(&mut self) -> Option<u8> {
        self.0.borrow_mut().pop_front()
    }
}

/// Polls the controlling terminal for key presses.
#[cfg(feature = "tui")]
#[derive(Debug, Default)]
pub struct TerminalKeys;

#[cfg(feature = "tui")]
impl KeySource for TerminalKeys {
    fn poll_key(&mut self) -> Option<u8> {
        use crossterm::event::{self, Event, KeyCode, KeyEventKind};
        use std::time::Duration;

        if !event::poll(Duration::ZERO).ok()? {
            return None;
        }
        match event::read().ok()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
                KeyCode::Enter => Some(b'\n'),
                KeyCode::Backspace => Some(0x08),
                KeyCode::Tab => Some(b'\t'),
                KeyCode::Esc => Some(0x1B),
                _ => None,
            },
            _ => None,
        }
    }
}

/// The keyboard device.
#[derive(Debug)]
pub struct Keyboard<S: KeySource = KeyBuffer> {
    source: S,
    pending: bool,
    data: Option<u8>,
    delivered: u64,
}

impl<S: KeySource> Keyboard<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            pending: false,
            data: None,
            delivered: 0,
        }
    }

    /// Keys delivered to the bus so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl<S: KeySource> Device for Keyboard<S> {
    fn name(&self) -> &str {
        "Keyboard"
    }

    fn port(&self) -> Option<u16> {
        Some(KEYBOARD_PORT)
    }

    fn tick(&mut self, _cpu: &Cpu, _bus: &Bus) {
        if self.pending {
            return;
        }
        if let Some(key) = self.source.poll_key() {
            tracing::trace!(key, "key pressed");
            self.pending = true;
            self.data = Some(key);
        }
    }

    fn interrupt_pending(&self) -> bool {
        self.pending
    }

    fn try_send(&mut self) -> Option<u8> {
        self.data.take()
    }

    fn receive(&mut self, _cpu: &Cpu, data: u8) {
        self.delivered += 1;
        tracing::debug!(data, "keyboard data delivered");
    }

    fn clear_interrupt(&mut self) {
        self.pending = false;
        self.data = None;
    }

    fn shutdown(&mut self, _cpu: &Cpu) {
        self.clear_interrupt();
        tracing::info!(delivered = self.delivered, "keyboard shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_buffer_shares_queue() {
        let buffer = KeyBuffer::from_bytes(b"ab");
        let mut handle = buffer.clone();

        buffer.push(b'c');
        assert_eq!(handle.len(), 3);
        assert_eq!(handle.poll_key(), Some(b'a'));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_one_key_per_interrupt() {
        let cpu = Cpu::new();
        let bus = Bus::new();
        let mut keyboard = Keyboard::new(KeyBuffer::from_bytes(b"hi"));

        keyboard.tick(&cpu, &bus);
        assert!(keyboard.interrupt_pending());
        // still pending: the second key waits
        keyboard.tick(&cpu, &bus);
        assert_eq!(keyboard.try_send(), Some(b'h'));
        keyboard.receive(&cpu, b'h');
        keyboard.clear_interrupt();

        keyboard.tick(&cpu, &bus);
        assert_eq!(keyboard.try_send(), Some(b'i'));
        keyboard.clear_interrupt();

        keyboard.tick(&cpu, &bus);
        assert!(!keyboard.interrupt_pending());
        assert_eq!(keyboard.delivered(), 1);
    }
}
