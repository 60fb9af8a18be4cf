/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! The CPU T-state [`Clock`] with memory and I/O contention.
use core::num::{NonZeroU8, NonZeroU16};
use std::sync::Arc;
use z80emu::host::{cycles, Clock};
use cycles::*;

#[cfg(feature = "serde")]
use serde::{Serialize, Deserialize};

use crate::device::memory::ContendedSlots;

/// The type used for `Timestamps`: CPU T-states elapsed since the last reset.
pub type Ts = u64;

/// The normalized ratio between the CPU clock and the base Spectrum clock.
///
/// Only 1, 2, 4 and 8 are valid multipliers, see [`ClockMultiplier::normalize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "u32", from = "u32"))]
pub struct ClockMultiplier(u8);

impl ClockMultiplier {
    /// Return a multiplier from a requested value.
    ///
    /// Values below 2 become 1, 2 to 3 become 2, 4 to 7 become 4 and anything above becomes 8.
    pub const fn normalize(multiplier: u32) -> Self {
        ClockMultiplier(match multiplier {
            0..=1 => 1,
            2..=3 => 2,
            4..=7 => 4,
            _ => 8
        })
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0 as u32
    }
}

impl Default for ClockMultiplier {
    fn default() -> Self {
        ClockMultiplier(1)
    }
}

impl From<u32> for ClockMultiplier {
    fn from(multiplier: u32) -> Self {
        ClockMultiplier::normalize(multiplier)
    }
}

impl From<ClockMultiplier> for u32 {
    fn from(multiplier: ClockMultiplier) -> u32 {
        multiplier.get()
    }
}

/// Contention delays indexed by the frame tact, shared by the screen and the CPU clock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentionTable(Arc<[u8]>);

impl ContentionTable {
    pub fn new(delays: Vec<u8>) -> Self {
        ContentionTable(delays.into())
    }

    /// Return the delay in T-states of a contended access at the given frame tact.
    ///
    /// Tacts outside of the table are never contended.
    #[inline]
    pub fn value(&self, frame_tact: u32) -> u8 {
        self.0.get(frame_tact as usize).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The CPU clock of the machine.
///
/// Counts CPU T-states and converts them to the frame tacts of the base clock.
/// Memory accesses to the contended 16kb slots and ULA port accesses are
/// delayed according to the current frame tact.
#[derive(Clone, Debug)]
pub struct CpuClock {
    tacts: Ts,
    frame_start: Ts,
    multiplier: ClockMultiplier,
    contention: ContentionTable,
    contended: ContendedSlots,
}

impl CpuClock {
    pub fn new(multiplier: ClockMultiplier, contention: ContentionTable) -> Self {
        CpuClock {
            tacts: 0,
            frame_start: 0,
            multiplier,
            contention,
            contended: ContendedSlots::empty()
        }
    }

    /// Reset the T-state counter and the frame origin.
    pub fn reset(&mut self) {
        self.tacts = 0;
        self.frame_start = 0;
    }

    /// Return the number of CPU T-states since the last reset.
    #[inline]
    pub fn tacts(&self) -> Ts {
        self.tacts
    }

    #[inline]
    pub fn multiplier(&self) -> ClockMultiplier {
        self.multiplier
    }

    /// Return the CPU T-state counter value at the start of the current frame.
    #[inline]
    pub fn frame_start(&self) -> Ts {
        self.frame_start
    }

    /// Start a new frame with `overflow` frame tacts already elapsed.
    pub fn start_frame(&mut self, overflow: u32) {
        let elapsed = u64::from(overflow) * u64::from(self.multiplier.get());
        self.frame_start = self.tacts.saturating_sub(elapsed);
    }

    /// Return the number of base clock tacts elapsed since the frame start.
    #[inline]
    pub fn frame_tact(&self) -> u32 {
        let tact = (self.tacts - self.frame_start) / u64::from(self.multiplier.get());
        u32::try_from(tact).unwrap_or(u32::MAX)
    }

    /// Add `ts` T-states to the counter.
    #[inline]
    pub fn delay(&mut self, ts: u32) {
        self.tacts += u64::from(ts);
    }

    #[inline]
    pub fn contended_slots(&self) -> ContendedSlots {
        self.contended
    }

    /// Set which 16kb memory slots are currently contended.
    #[inline]
    pub fn set_contended_slots(&mut self, slots: ContendedSlots) {
        self.contended = slots;
    }

    /// Delay the clock if `addr` lies in a contended slot.
    #[inline]
    pub fn contention_wait(&mut self, addr: u16) {
        if self.contended.covers(addr) {
            self.contend();
        }
    }

    #[inline]
    fn contend(&mut self) {
        let delay = self.contention.value(self.frame_tact());
        self.tacts += u64::from(delay);
    }

    // An I/O cycle takes 4 T-states and is split according to whether the ULA
    // decodes the port (A0 reset) and whether the high byte lies in a contended slot.
    fn io_cycle(&mut self, port: u16) {
        let io_ts = u64::from(IO_CYCLE_TS);
        let high_contended = self.contended.covers(port);
        match (high_contended, port & 1 == 0) {
            (true, true) => { // C:1, C:3
                self.contend();
                self.tacts += 1;
                self.contend();
                self.tacts += io_ts - 1;
            }
            (true, false) => { // C:1, C:1, C:1, C:1
                for _ in 0..io_ts {
                    self.contend();
                    self.tacts += 1;
                }
            }
            (false, true) => { // N:1, C:3
                self.tacts += 1;
                self.contend();
                self.tacts += io_ts - 1;
            }
            (false, false) => { // N:4
                self.tacts += io_ts;
            }
        }
    }
}

impl Clock for CpuClock {
    type Limit = Ts;
    type Timestamp = Ts;

    #[inline]
    fn is_past_limit(&self, limit: Self::Limit) -> bool {
        self.tacts >= limit
    }

    #[inline]
    fn add_irq(&mut self, _pc: u16) -> Ts {
        self.tacts += u64::from(IRQ_ACK_CYCLE_TS);
        self.tacts
    }

    #[inline]
    fn add_no_mreq(&mut self, addr: u16, add_ts: NonZeroU8) {
        for _ in 0..add_ts.get() {
            self.contention_wait(addr);
            self.tacts += 1;
        }
    }

    #[inline]
    fn add_io(&mut self, port: u16) -> Ts {
        self.io_cycle(port);
        self.tacts
    }

    #[inline]
    fn add_mreq(&mut self, addr: u16) -> Ts {
        self.contention_wait(addr);
        self.tacts += u64::from(MEMRW_CYCLE_TS);
        self.tacts
    }

    #[inline]
    fn add_m1(&mut self, addr: u16) -> Ts {
        self.contention_wait(addr);
        self.tacts += u64::from(M1_CYCLE_TS);
        self.tacts
    }

    #[inline]
    fn add_wait_states(&mut self, _bus: u16, wait_states: NonZeroU16) {
        self.tacts += u64::from(wait_states.get());
    }

    #[inline]
    fn as_timestamp(&self) -> Ts {
        self.tacts
    }
}
