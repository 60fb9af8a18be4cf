/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! The 1-bit beeper driven by the EAR line.
use crate::clock::Ts;
use crate::providers::{AudioProvider, MachineInfo};
use super::{Device, FrameBound, FrameContext};

/// Converts EAR line changes into audio samples at the configured sample rate.
///
/// Sample `n` since the last reset is taken at the CPU T-state
/// `n * cpu_clock_hz / sample_rate`, so no rounding error accumulates between frames.
pub struct BeeperDevice {
    cpu_clock_hz: u64,
    sample_rate: u64,
    next_sample: u64,
    ear: bool,
    samples: Vec<f32>,
    provider: Option<Box<dyn AudioProvider>>,
}

impl BeeperDevice {
    pub fn new(info: &MachineInfo, provider: Option<Box<dyn AudioProvider>>) -> Self {
        let samples_per_frame = (u64::from(info.frame_tacts) * u64::from(info.sample_rate)
                                 / u64::from(info.base_clock_hz)) as usize;
        BeeperDevice {
            cpu_clock_hz: info.cpu_clock_hz(),
            sample_rate: info.sample_rate.into(),
            next_sample: 0,
            ear: false,
            samples: Vec::with_capacity(samples_per_frame + 1),
            provider
        }
    }

    /// Return the last level of the EAR line.
    pub fn ear_bit(&self) -> bool {
        self.ear
    }

    /// Set the level of the EAR line at the CPU T-state `ts`.
    pub fn process_ear_bit(&mut self, ear: bool, ts: Ts) {
        if ear != self.ear {
            self.fill_samples(ts);
            self.ear = ear;
        }
    }

    /// Return the samples generated since the last frame was completed.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    fn sample_tact(&self, index: u64) -> Ts {
        index * self.cpu_clock_hz / self.sample_rate
    }

    fn fill_samples(&mut self, ts: Ts) {
        let level = if self.ear { 1.0 } else { 0.0 };
        while self.sample_tact(self.next_sample) < ts {
            self.samples.push(level);
            self.next_sample += 1;
        }
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

impl Device for BeeperDevice {
    fn on_attached_to_vm(&mut self, info: &MachineInfo) {
        if let Some(provider) = self.provider.as_mut() {
            provider.on_attached_to_vm(info);
        }
    }

    fn reset(&mut self) {
        self.next_sample = 0;
        self.ear = false;
        self.samples.clear();
        if let Some(provider) = self.provider.as_mut() {
            provider.reset();
        }
    }

    fn as_frame_bound(&mut self) -> Option<&mut dyn FrameBound> {
        Some(self)
    }
}

impl FrameBound for BeeperDevice {
    fn on_new_frame(&mut self, _ctx: &FrameContext) {
        self.samples.clear();
    }

    fn on_frame_completed(&mut self, ctx: &FrameContext) {
        self.fill_samples(ctx.tacts);
        if let Some(provider) = self.provider.as_mut() {
            provider.add_samples(&self.samples);
        }
    }
}
