//! A test ROM and fake host providers shared by the machine tests.
#![allow(dead_code)]
use std::sync::{Arc, Mutex};

use spectrum_engine::{*, z80emu::Cpu};
use spectrum_engine::providers::*;

/// The address incremented by the test ROM interrupt routine.
pub const ISR_COUNTER: u16 = 0x9000;
/// Where test programs are injected.
pub const CODE: u16 = 0x8000;
pub const STACK_TOP: u16 = 0xFF00;

/// A 16kb ROM: `DI; JR $` at reset and an IM 1 routine counting the interrupts.
pub fn test_rom(marker: u8) -> Vec<u8> {
    let mut rom = vec![0u8; 0x4000];
    rom[0x0000..0x0003].copy_from_slice(&[0xF3, 0x18, 0xFE]);
    rom[0x0038..0x0044].copy_from_slice(&[
        0xF5,             // PUSH AF
        0x3A, 0x00, 0x90, // LD A,(0x9000)
        0x3C,             // INC A
        0x32, 0x00, 0x90, // LD (0x9000),A
        0xF1,             // POP AF
        0xC3, 0x52, 0x00  // JP 0x0052
    ]);
    rom[0x0052..0x0054].copy_from_slice(&[0xFB, 0xC9]); // EI; RET
    rom[0x3FFF] = marker;
    rom
}

/// Host clock advancing only when waited on, recording the targets.
#[derive(Clone, Debug, Default)]
pub struct VirtualClock {
    pub now: u64,
    pub frequency: u64,
    pub targets: Arc<Mutex<Vec<u64>>>,
    pub cancel_after: Option<usize>,
}

impl VirtualClock {
    /// Ticks as fast as the 48K base clock.
    pub fn new() -> Self {
        VirtualClock { frequency: 3_500_000, ..Default::default() }
    }

    pub fn cancelling_after(waits: usize) -> Self {
        VirtualClock { cancel_after: Some(waits), ..Self::new() }
    }
}

impl VmComponentProvider for VirtualClock {}

impl HostClock for VirtualClock {
    fn counter(&self) -> u64 {
        self.now
    }

    fn frequency(&self) -> u64 {
        self.frequency
    }

    fn wait_until(&mut self, target: u64, token: &CancelToken) {
        let mut targets = self.targets.lock().unwrap();
        targets.push(target);
        self.now = self.now.max(target);
        if Some(targets.len()) == self.cancel_after {
            token.cancel();
        }
    }
}

/// Counts the published frames.
#[derive(Clone, Debug, Default)]
pub struct FrameCounter {
    pub frames: Arc<Mutex<Vec<(usize, usize)>>>,
    pub attached: Arc<Mutex<Option<MachineInfo>>>,
}

impl VmComponentProvider for FrameCounter {
    fn on_attached_to_vm(&mut self, info: &MachineInfo) {
        *self.attached.lock().unwrap() = Some(*info);
    }
}

impl ScreenFrameProvider for FrameCounter {
    fn display_frame(&mut self, pixels: &[u8], width: usize, height: usize) {
        assert_eq!(pixels.len(), width * height);
        self.frames.lock().unwrap().push((width, height));
    }
}

/// Keeps the given keys pressed.
#[derive(Clone, Debug, Default)]
pub struct HeldKeys(pub Vec<SpectrumKey>);

impl VmComponentProvider for HeldKeys {}

impl KeyboardProvider for HeldKeys {
    fn poll_keys(&mut self, apply: &mut dyn FnMut(SpectrumKey, bool)) {
        for key in self.0.iter() {
            apply(*key, true);
        }
    }
}

/// Collects the audio samples.
#[derive(Clone, Debug, Default)]
pub struct SampleSink {
    pub samples: Arc<Mutex<Vec<f32>>>,
    pub playing: Arc<Mutex<bool>>,
}

impl VmComponentProvider for SampleSink {}

impl AudioProvider for SampleSink {
    fn add_samples(&mut self, samples: &[f32]) {
        self.samples.lock().unwrap().extend_from_slice(samples);
    }

    fn play_sound(&mut self) {
        *self.playing.lock().unwrap() = true;
    }

    fn pause_sound(&mut self) {
        *self.playing.lock().unwrap() = false;
    }
}

pub fn spectrum48(clock: VirtualClock) -> Spectrum {
    spectrum_with(MachineConfig::spectrum48(), Providers::new().with_clock(clock))
}

pub fn spectrum_with(config: MachineConfig, providers: Providers) -> Spectrum {
    let roms = (0..config.memory.rom_count).map(|n| test_rom(n as u8)).collect();
    match Spectrum::new(config, providers.with_rom(StaticRoms(roms))) {
        Ok(spectrum) => spectrum,
        Err(err) => panic!("machine failed: {}", err)
    }
}

/// Inject `code` at [`CODE`], point the PC at it and set up the stack.
pub fn load_program(spectrum: &mut Spectrum, code: &[u8]) {
    spectrum.inject_code(CODE, code);
    spectrum.set_pc(CODE);
    spectrum.cpu_mut().z80_mut().set_sp(STACK_TOP);
}
