/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! Machine configuration and the stock ZX Spectrum models.
#[cfg(feature = "serde")]
use serde::{Serialize, Deserialize};

use crate::error::ConfigError;

/// The size of a single ROM or RAM bank.
pub const BANK_SIZE: usize = 0x4000;
/// The default address where the Spectrum ROM returns from the maskable interrupt routine.
pub const ISR_RETURN_ADDRESS: u16 = 0x0052;

/// The emulated hardware model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpectrumModel {
    #[default]
    Spectrum48,
    Spectrum128,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CpuConfig {
    /// The base clock frequency in T-states per second.
    pub base_clock_hz: u32,
    /// The requested clock multiplier, normalized to 1, 2, 4 or 8.
    pub clock_multiplier: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MemoryConfig {
    pub rom_count: usize,
    pub ram_bank_count: usize,
}

/// The raster geometry of the ULA in lines and tacts.
///
/// A frame consists of vertical sync lines, non-visible border lines, visible
/// border lines and display lines. Each line consists of the horizontal blanking
/// period, the left border, the display area, the right border and a non-visible
/// remainder. Every tact renders two pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScreenConfig {
    pub interrupt_tact: u32,
    pub vertical_sync_lines: u32,
    pub nonvisible_border_top_lines: u32,
    pub border_top_lines: u32,
    pub display_lines: u32,
    pub border_bottom_lines: u32,
    pub nonvisible_border_bottom_lines: u32,
    pub horizontal_blanking_time: u32,
    pub border_left_time: u32,
    pub display_line_time: u32,
    pub border_right_time: u32,
    pub nonvisible_border_right_time: u32,
    /// How many tacts before the first pixel of a display line the contention begins.
    pub contention_lead_time: u32,
}

impl ScreenConfig {
    pub const fn lines(&self) -> u32 {
        self.vertical_sync_lines + self.nonvisible_border_top_lines + self.border_top_lines
        + self.display_lines + self.border_bottom_lines + self.nonvisible_border_bottom_lines
    }

    pub const fn line_tacts(&self) -> u32 {
        self.horizontal_blanking_time + self.border_left_time + self.display_line_time
        + self.border_right_time + self.nonvisible_border_right_time
    }

    pub const fn frame_tacts(&self) -> u32 {
        self.lines() * self.line_tacts()
    }

    /// The first raster line rendered into the visible buffer.
    pub const fn first_visible_line(&self) -> u32 {
        self.vertical_sync_lines + self.nonvisible_border_top_lines
    }

    pub const fn first_display_line(&self) -> u32 {
        self.first_visible_line() + self.border_top_lines
    }

    /// The tact within a line of the first visible border pixel.
    pub const fn first_visible_tact(&self) -> u32 {
        self.horizontal_blanking_time
    }

    /// The tact within a line of the first display pixel.
    pub const fn first_pixel_tact(&self) -> u32 {
        self.horizontal_blanking_time + self.border_left_time
    }

    /// The width in pixels of the visible buffer.
    pub const fn screen_width(&self) -> u32 {
        2 * (self.border_left_time + self.display_line_time + self.border_right_time)
    }

    /// The height in pixels of the visible buffer.
    pub const fn screen_height(&self) -> u32 {
        self.border_top_lines + self.display_lines + self.border_bottom_lines
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display_lines != 192 || self.display_line_time != 128 {
            return Err(ConfigError::InvalidScreenTiming("the display area must be 256x192 pixels"))
        }
        if self.interrupt_tact >= self.frame_tacts() {
            return Err(ConfigError::InvalidScreenTiming("the interrupt tact lies beyond the frame"))
        }
        if self.contention_lead_time > self.first_pixel_tact() {
            return Err(ConfigError::InvalidScreenTiming("the contention begins before the line"))
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AudioConfig {
    pub sample_rate: u32,
}

/// The complete configuration of a virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MachineConfig {
    pub model: SpectrumModel,
    pub cpu: CpuConfig,
    pub memory: MemoryConfig,
    pub screen: ScreenConfig,
    pub audio: AudioConfig,
    /// The address at which the debugger considers the maskable interrupt routine finished.
    pub isr_return_address: u16,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig::spectrum48()
    }
}

impl MachineConfig {
    /// The ZX Spectrum 48K.
    pub const fn spectrum48() -> Self {
        MachineConfig {
            model: SpectrumModel::Spectrum48,
            cpu: CpuConfig { base_clock_hz: 3_500_000, clock_multiplier: 1 },
            memory: MemoryConfig { rom_count: 1, ram_bank_count: 3 },
            screen: ScreenConfig {
                interrupt_tact: 64,
                vertical_sync_lines: 8,
                nonvisible_border_top_lines: 8,
                border_top_lines: 48,
                display_lines: 192,
                border_bottom_lines: 48,
                nonvisible_border_bottom_lines: 8,
                horizontal_blanking_time: 40,
                border_left_time: 24,
                display_line_time: 128,
                border_right_time: 24,
                nonvisible_border_right_time: 8,
                contention_lead_time: 1,
            },
            audio: AudioConfig { sample_rate: 48_000 },
            isr_return_address: ISR_RETURN_ADDRESS
        }
    }

    /// The ZX Spectrum 128K.
    pub const fn spectrum128() -> Self {
        MachineConfig {
            model: SpectrumModel::Spectrum128,
            cpu: CpuConfig { base_clock_hz: 3_546_900, clock_multiplier: 1 },
            memory: MemoryConfig { rom_count: 2, ram_bank_count: 8 },
            screen: ScreenConfig {
                interrupt_tact: 66,
                vertical_sync_lines: 8,
                nonvisible_border_top_lines: 7,
                border_top_lines: 48,
                display_lines: 192,
                border_bottom_lines: 48,
                nonvisible_border_bottom_lines: 8,
                horizontal_blanking_time: 40,
                border_left_time: 24,
                display_line_time: 128,
                border_right_time: 24,
                nonvisible_border_right_time: 12,
                contention_lead_time: 1,
            },
            audio: AudioConfig { sample_rate: 48_000 },
            isr_return_address: ISR_RETURN_ADDRESS
        }
    }

    pub const fn with_clock_multiplier(mut self, clock_multiplier: u32) -> Self {
        self.cpu.clock_multiplier = clock_multiplier;
        self
    }

    pub const fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.audio.sample_rate = sample_rate;
        self
    }

    pub const fn with_isr_return_address(mut self, address: u16) -> Self {
        self.isr_return_address = address;
        self
    }

    /// Check the consistency of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let MemoryConfig { rom_count, ram_bank_count } = self.memory;
        let layout_ok = match self.model {
            SpectrumModel::Spectrum48 => rom_count == 1 && ram_bank_count == 3,
            SpectrumModel::Spectrum128 => rom_count == 2 && ram_bank_count == 8,
        };
        if !layout_ok {
            return Err(ConfigError::InvalidBankCount { rom_count, ram_bank_count })
        }
        if self.cpu.base_clock_hz == 0 || self.audio.sample_rate == 0 {
            return Err(ConfigError::InvalidScreenTiming("clock and sample rates must not be zero"))
        }
        self.screen.validate()
    }
}
