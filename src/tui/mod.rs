//! TUI debugger.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and flag view
//! - Memory view and the VRAM text screen
//! - Step/run/breakpoint controls
//! - Disassembly view
//! - An input mode that types into the emulated keyboard

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
