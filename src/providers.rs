/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! Host services the virtual machine consumes.
//!
//! Each provider is handed to the machine once, at construction, inside
//! [`Providers`]. Only the [`HostClock`] and the [`RomProvider`] are mandatory.
use crate::config::SpectrumModel;
use crate::device::keyboard::SpectrumKey;
use crate::host::HostClock;

/// Static facts about the machine a provider is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MachineInfo {
    pub model: SpectrumModel,
    /// Base clock frequency in T-states per second.
    pub base_clock_hz: u32,
    /// Normalized CPU clock multiplier.
    pub clock_multiplier: u32,
    /// Number of base clock tacts in a single frame.
    pub frame_tacts: u32,
    /// Audio samples per second.
    pub sample_rate: u32,
}

impl MachineInfo {
    /// Return the CPU clock frequency in T-states per second.
    pub fn cpu_clock_hz(&self) -> u64 {
        u64::from(self.base_clock_hz) * u64::from(self.clock_multiplier)
    }
}

/// The life cycle hooks shared by every provider.
pub trait VmComponentProvider {
    /// Called once when the machine owning this provider has been built.
    fn on_attached_to_vm(&mut self, _info: &MachineInfo) {}
    /// Called when the machine is reset.
    fn reset(&mut self) {}
}

/// Receives completed screen frames.
pub trait ScreenFrameProvider: VmComponentProvider + Send {
    /// Receive a frame of `width` x `height` palette indices, see [`crate::device::screen::SPECTRUM_PALETTE`].
    fn display_frame(&mut self, pixels: &[u8], width: usize, height: usize);
}

/// Receives audio samples in the range `0.0..=1.0`.
pub trait AudioProvider: VmComponentProvider + Send {
    /// Receive the samples generated during the last frame.
    fn add_samples(&mut self, samples: &[f32]);
    /// The emulation starts or resumes.
    fn play_sound(&mut self) {}
    /// The emulation has been paused.
    fn pause_sound(&mut self) {}
    /// The emulation has been stopped.
    fn kill_sound(&mut self) {}
}

/// A source of keyboard state changes.
pub trait KeyboardProvider: VmComponentProvider + Send {
    /// Report every key state change since the last call, `true` meaning the key is down.
    fn poll_keys(&mut self, apply: &mut dyn FnMut(SpectrumKey, bool));
}

/// A source of tape blocks to load and a sink for saved blocks.
///
/// Blocks are in the TAP payload format: a flag byte, the data bytes and a checksum.
pub trait TapeProvider: VmComponentProvider + Send {
    /// Return the next block to play or `None` at the end of the tape.
    fn next_block(&mut self) -> Option<Vec<u8>>;
    /// Rewind the tape to its first block.
    fn rewind(&mut self) {}
    /// Store a block saved by the emulated program.
    fn save_block(&mut self, block: &[u8]);
}

/// A source of ROM images.
pub trait RomProvider: VmComponentProvider + Send {
    /// Return the contents of the ROM with the given index.
    fn rom_bytes(&mut self, index: usize) -> Option<Vec<u8>>;
}

/// ROM images held in memory.
#[derive(Clone, Debug, Default)]
pub struct StaticRoms(pub Vec<Vec<u8>>);

impl VmComponentProvider for StaticRoms {}

impl RomProvider for StaticRoms {
    fn rom_bytes(&mut self, index: usize) -> Option<Vec<u8>> {
        self.0.get(index).cloned()
    }
}

/// The set of providers a machine is built with.
#[derive(Default)]
pub struct Providers {
    pub clock: Option<Box<dyn HostClock>>,
    pub rom: Option<Box<dyn RomProvider>>,
    pub screen: Option<Box<dyn ScreenFrameProvider>>,
    pub beeper: Option<Box<dyn AudioProvider>>,
    pub sound: Option<Box<dyn AudioProvider>>,
    pub keyboard: Option<Box<dyn KeyboardProvider>>,
    pub tape: Option<Box<dyn TapeProvider>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock<C: HostClock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn with_rom<R: RomProvider + 'static>(mut self, rom: R) -> Self {
        self.rom = Some(Box::new(rom));
        self
    }

    pub fn with_screen<S: ScreenFrameProvider + 'static>(mut self, screen: S) -> Self {
        self.screen = Some(Box::new(screen));
        self
    }

    pub fn with_beeper<A: AudioProvider + 'static>(mut self, beeper: A) -> Self {
        self.beeper = Some(Box::new(beeper));
        self
    }

    pub fn with_sound<A: AudioProvider + 'static>(mut self, sound: A) -> Self {
        self.sound = Some(Box::new(sound));
        self
    }

    pub fn with_keyboard<K: KeyboardProvider + 'static>(mut self, keyboard: K) -> Self {
        self.keyboard = Some(Box::new(keyboard));
        self
    }

    pub fn with_tape<T: TapeProvider + 'static>(mut self, tape: T) -> Self {
        self.tape = Some(Box::new(tape));
        self
    }
}
