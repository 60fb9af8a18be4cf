/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! The AY-3-8912 programmable sound generator of the 128K model.
#[allow(unused_imports)]
use log::{error, warn, info, debug, trace, Level};

use crate::clock::Ts;
use crate::providers::{AudioProvider, MachineInfo};
use super::{Device, FrameBound, FrameContext};

/// The output level of each of the 16 volume steps.
pub const VOLUME_TABLE: [f32;16] = [
    0.0000, 0.0137, 0.0205, 0.0291,
    0.0423, 0.0618, 0.0847, 0.1369,
    0.1691, 0.2647, 0.3527, 0.4499,
    0.5765, 0.7258, 0.8819, 1.0000,
];

/// The PSG is clocked at half the base clock and its generators at 1/8 of that.
const BASE_TACTS_PER_TICK: u64 = 16;

const REG_MIXER: usize = 7;
const REG_VOLUME_A: usize = 8;
const REG_ENV_SHAPE: usize = 13;
const REGISTER_MASKS: [u8;16] = [
    0xFF, 0x0F, 0xFF, 0x0F, 0xFF, 0x0F, 0x1F, 0xFF,
    0x1F, 0x1F, 0x1F, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF,
];

#[derive(Clone, Copy, Debug, Default)]
struct Tone {
    period: u16,
    counter: u16,
    output: bool,
}

impl Tone {
    fn clock(&mut self) {
        self.counter = self.counter.saturating_sub(1);
        if self.counter == 0 {
            self.counter = self.period.max(1);
            self.output = !self.output;
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Noise {
    period: u8,
    counter: u8,
    lfsr: u32,
    output: bool,
}

impl Default for Noise {
    fn default() -> Self {
        Noise { period: 0, counter: 0, lfsr: 1, output: false }
    }
}

impl Noise {
    fn clock(&mut self) {
        self.counter = self.counter.saturating_sub(1);
        if self.counter == 0 {
            self.counter = self.period.max(1);
            let feedback = ((self.lfsr ^ (self.lfsr >> 3)) & 1) ^ 1;
            self.lfsr = (self.lfsr >> 1) | (feedback << 16);
            self.output = self.lfsr & 1 != 0;
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Envelope {
    period: u16,
    counter: u16,
    step: u8,
    shape: u8,
    attack: bool,
    holding: bool,
}

impl Envelope {
    fn restart(&mut self, shape: u8) {
        self.shape = shape & 0x0F;
        self.step = 0;
        self.counter = self.period.max(1);
        self.holding = false;
        self.attack = shape & 0x04 != 0;
    }

    fn clock(&mut self) {
        if self.holding {
            return
        }
        self.counter = self.counter.saturating_sub(1);
        if self.counter != 0 {
            return
        }
        self.counter = self.period.max(1);
        self.step += 1;
        if self.step < 16 {
            return
        }
        let (cont, alt, hold) = (self.shape & 8 != 0, self.shape & 2 != 0, self.shape & 1 != 0);
        match (cont, hold) {
            (false, _) => {
                self.holding = true;
                self.attack = false;
                self.step = 15;
            }
            (true, true) => {
                self.holding = true;
                self.step = 15;
                if alt {
                    self.attack = !self.attack;
                }
            }
            (true, false) => {
                self.step = 0;
                if alt {
                    self.attack = !self.attack;
                }
            }
        }
    }

    fn level(&self) -> u8 {
        if self.attack { self.step } else { 15 - self.step }
    }
}

/// The sound generator with its 16 registers, mixed down to a mono sample stream.
pub struct SoundDevice {
    regs: [u8;16],
    selected: u8,
    tones: [Tone;3],
    noise: Noise,
    envelope: Envelope,
    tick_tacts: u64,
    next_tick: Ts,
    tick_count: u64,
    cpu_clock_hz: u64,
    sample_rate: u64,
    next_sample: u64,
    samples: Vec<f32>,
    provider: Option<Box<dyn AudioProvider>>,
}

impl SoundDevice {
    pub fn new(info: &MachineInfo, provider: Option<Box<dyn AudioProvider>>) -> Self {
        let tick_tacts = BASE_TACTS_PER_TICK * u64::from(info.clock_multiplier);
        SoundDevice {
            regs: [0;16],
            selected: 0,
            tones: [Tone::default();3],
            noise: Noise::default(),
            envelope: Envelope::default(),
            tick_tacts,
            next_tick: tick_tacts,
            tick_count: 0,
            cpu_clock_hz: info.cpu_clock_hz(),
            sample_rate: info.sample_rate.into(),
            next_sample: 0,
            samples: Vec::new(),
            provider
        }
    }

    /// Return the index of the selected register.
    pub fn selected_register(&self) -> u8 {
        self.selected
    }

    pub fn select_register(&mut self, reg: u8) {
        self.selected = reg & 0x0F;
    }

    /// Return the value of the selected register.
    pub fn read_register(&self) -> u8 {
        self.regs[self.selected as usize]
    }

    /// Write to the selected register at the CPU T-state `ts`.
    pub fn write_register(&mut self, value: u8, ts: Ts) {
        self.render_to(ts);
        let reg = self.selected as usize;
        let value = value & REGISTER_MASKS[reg];
        self.regs[reg] = value;
        match reg {
            0..=5 => {
                let ch = reg / 2;
                self.tones[ch].period = u16::from_le_bytes([self.regs[ch * 2], self.regs[ch * 2 + 1]]);
            }
            6 => self.noise.period = value,
            11 | 12 => self.envelope.period = u16::from_le_bytes([self.regs[11], self.regs[12]]),
            REG_ENV_SHAPE => {
                self.envelope.period = u16::from_le_bytes([self.regs[11], self.regs[12]]);
                self.envelope.restart(value);
            }
            _ => {}
        }
    }

    /// Return the samples generated since the last frame was completed.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    fn clock_to(&mut self, ts: Ts) {
        while self.next_tick <= ts {
            for tone in self.tones.iter_mut() {
                tone.clock();
            }
            self.noise.clock();
            if self.tick_count & 1 == 1 {
                self.envelope.clock();
            }
            self.tick_count += 1;
            self.next_tick += self.tick_tacts;
        }
    }

    fn mix(&self) -> f32 {
        let mixer = self.regs[REG_MIXER];
        let sum: f32 = (0..3).map(|ch| {
            let tone = self.tones[ch].output || mixer & (1 << ch) != 0;
            let noise = self.noise.output || mixer & (8 << ch) != 0;
            let volume = self.regs[REG_VOLUME_A + ch];
            let level = if volume & 0x10 != 0 { self.envelope.level() } else { volume & 0x0F };
            if tone && noise { VOLUME_TABLE[level as usize] } else { 0.0 }
        }).sum();
        sum / 3.0
    }

    fn render_to(&mut self, ts: Ts) {
        loop {
            let sample_ts = self.next_sample * self.cpu_clock_hz / self.sample_rate;
            if sample_ts >= ts {
                break
            }
            self.clock_to(sample_ts);
            self.samples.push(self.mix());
            self.next_sample += 1;
        }
        self.clock_to(ts);
    }

    pub fn play_sound(&mut self) {
        if let Some(provider) = self.provider.as_mut() {
            provider.play_sound();
        }
    }

    pub fn pause_sound(&mut self) {
        if let Some(provider) = self.provider.as_mut() {
            provider.pause_sound();
        }
    }

    pub fn kill_sound(&mut self) {
        if let Some(provider) = self.provider.as_mut() {
            provider.kill_sound();
        }
    }
}

impl Device for SoundDevice {
    fn on_attached_to_vm(&mut self, info: &MachineInfo) {
        if let Some(provider) = self.provider.as_mut() {
            provider.on_attached_to_vm(info);
        }
    }

    fn reset(&mut self) {
        self.regs = [0;16];
        self.selected = 0;
        self.tones = [Tone::default();3];
        self.noise = Noise::default();
        self.envelope = Envelope::default();
        self.next_tick = self.tick_tacts;
        self.tick_count = 0;
        self.next_sample = 0;
        self.samples.clear();
        if let Some(provider) = self.provider.as_mut() {
            provider.reset();
        }
    }

    fn as_frame_bound(&mut self) -> Option<&mut dyn FrameBound> {
        Some(self)
    }
}

impl FrameBound for SoundDevice {
    fn on_new_frame(&mut self, _ctx: &FrameContext) {
        self.samples.clear();
    }

    fn on_frame_completed(&mut self, ctx: &FrameContext) {
        self.render_to(ctx.tacts);
        if let Some(provider) = self.provider.as_mut() {
            provider.add_samples(&self.samples);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpectrumModel;

    fn sound() -> SoundDevice {
        let info = MachineInfo {
            model: SpectrumModel::Spectrum128,
            base_clock_hz: 3_500_000,
            clock_multiplier: 1,
            frame_tacts: 70908,
            sample_rate: 50_000
        };
        SoundDevice::new(&info, None)
    }

    fn write(dev: &mut SoundDevice, reg: u8, value: u8) {
        dev.select_register(reg);
        dev.write_register(value, 0);
    }

    #[test]
    fn sound_registers_are_masked() {
        let mut dev = sound();
        write(&mut dev, 1, 0xFF);
        assert_eq!(dev.read_register(), 0x0F);
        write(&mut dev, 8, 0xFF);
        assert_eq!(dev.read_register(), 0x1F);
        dev.select_register(0x17);
        assert_eq!(dev.selected_register(), 7);
    }

    #[test]
    fn sound_tone_produces_square_wave() {
        let mut dev = sound();
        write(&mut dev, 0, 10);       // tone A period 10: toggles every 160 T-states
        write(&mut dev, 7, 0b0011_1110);
        write(&mut dev, 8, 15);
        dev.on_frame_completed(&FrameContext { tacts: 70_000, ..FrameContext::default() });
        let samples = dev.samples();
        assert_eq!(samples.len(), 1000);
        let loud = samples.iter().filter(|&&s| s > 0.3).count();
        let silent = samples.iter().filter(|&&s| s == 0.0).count();
        assert_eq!(loud + silent, samples.len());
        assert!(loud > 400 && silent > 400, "{} {}", loud, silent);
    }

    #[test]
    fn sound_envelope_decays_and_holds() {
        let mut dev = sound();
        write(&mut dev, 7, 0b0011_1111);   // all channels constantly on
        write(&mut dev, 8, 0x10);
        write(&mut dev, 11, 1);
        write(&mut dev, 13, 0);          // decay then hold at 0
        assert_eq!(dev.envelope.level(), 15);
        dev.on_frame_completed(&FrameContext { tacts: 70_000, ..FrameContext::default() });
        assert!(dev.samples()[0] > 0.3);
        assert_eq!(dev.samples()[dev.samples().len() - 1], 0.0);
    }
}
