//! Emulator configuration.
//!
//! Loaded from a JSON file; missing fields take their defaults. Command
//! line flags are applied on top by the binary.

use std::path::Path;

use crate::cpu::bus::ROM_END;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cycle ceiling used when none is given.
pub const DEFAULT_MAX_CYCLES: u64 = 1_000_000_000;

/// Device ticks between screen refreshes.
pub const DEFAULT_SCREEN_REFRESH: u64 = 1000;

/// Settings for one emulator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Initial PC.
    pub load_address: u16,
    pub max_cycles: u64,
    /// Bytes fed to the keyboard, one per interrupt.
    pub keyboard_input: String,
    /// Print the screen contents after the run.
    pub show_screen: bool,
    pub screen_refresh: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            load_address: 0,
            max_cycles: DEFAULT_MAX_CYCLES,
            keyboard_input: String::new(),
            show_screen: false,
            screen_refresh: DEFAULT_SCREEN_REFRESH,
        }
    }
}

impl EmulatorConfig {
    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: EmulatorConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_address > ROM_END {
            return Err(ConfigError::LoadAddress(self.load_address));
        }
        if self.screen_refresh == 0 {
            return Err(ConfigError::ScreenRefresh);
        }
        Ok(())
    }
}

/// Errors that can occur while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("load address {0:#06x} is past the end of ROM ({:#06x})", ROM_END)]
    LoadAddress(u16),

    #[error("screen refresh interval must be at least 1")]
    ScreenRefresh,
}
