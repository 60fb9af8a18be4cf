/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! Machine configuration errors.
use core::fmt;

/// An error reported while putting a machine together.
///
/// These are fatal: a machine is never constructed from an invalid
/// configuration and nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The host clock provider is required for frame pacing.
    MissingClock,
    /// The ROM provider is missing or could not provide the ROM image with the given index.
    MissingRom { index: usize },
    /// A ROM image does not fit into a single 16kb bank.
    InvalidRomSize { index: usize, size: usize },
    /// The memory layout can not be paged into the four 16kb slots.
    InvalidBankCount { rom_count: usize, ram_bank_count: usize },
    /// The screen geometry is inconsistent.
    InvalidScreenTiming(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingClock => f.write_str("the virtual machine needs a clock provider"),
            ConfigError::MissingRom { index } => write!(f, "ROM #{} is not available", index),
            ConfigError::InvalidRomSize { index, size } => {
                write!(f, "ROM #{} is {} bytes long, a ROM bank holds at most 16384 bytes", index, size)
            }
            ConfigError::InvalidBankCount { rom_count, ram_bank_count } => {
                write!(f, "invalid memory layout: {} ROM(s), {} RAM bank(s)", rom_count, ram_bank_count)
            }
            ConfigError::InvalidScreenTiming(reason) => write!(f, "invalid screen timing: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages() {
        assert_eq!(ConfigError::MissingClock.to_string(), "the virtual machine needs a clock provider");
        assert_eq!(ConfigError::MissingRom { index: 1 }.to_string(), "ROM #1 is not available");
        assert_eq!(ConfigError::InvalidRomSize { index: 0, size: 20000 }.to_string(),
                   "ROM #0 is 20000 bytes long, a ROM bank holds at most 16384 bytes");
    }
}
