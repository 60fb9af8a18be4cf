/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! The maskable interrupt generated by the ULA once per frame.
#[allow(unused_imports)]
use log::{error, warn, info, debug, trace, Level};

use super::{Device, FrameBound, FrameContext};

/// The longest Z80 instruction in T-states.
///
/// The interrupt line is held active at least this long so an instruction
/// started just before the interrupt tact can not miss it.
pub const LONGEST_OP_TACTS: u32 = 23;

/// The INT line as seen by the interrupt device.
pub trait InterruptLine {
    fn raise_int(&mut self);
    fn lower_int(&mut self);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InterruptState {
    #[default]
    Idle,
    Asserted,
}

/// Raises the INT line once per frame at the interrupt tact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterruptDevice {
    interrupt_tact: u32,
    state: InterruptState,
    raised: bool,
    revoked: bool,
}

impl InterruptDevice {
    pub fn new(interrupt_tact: u32) -> Self {
        InterruptDevice {
            interrupt_tact,
            state: InterruptState::Idle,
            raised: false,
            revoked: false
        }
    }

    pub fn interrupt_tact(&self) -> u32 {
        self.interrupt_tact
    }

    pub fn state(&self) -> InterruptState {
        self.state
    }

    /// Return whether the interrupt has already been raised in the current frame.
    pub fn is_raised(&self) -> bool {
        self.raised
    }

    /// Raise or revoke the interrupt according to the current frame tact.
    ///
    /// The interrupt is raised once per frame when the tact reaches the
    /// interrupt tact and revoked when the tact passes the window of
    /// [`LONGEST_OP_TACTS`] while still pending.
    pub fn check_for_interrupt(&mut self, frame_tact: u32, line: &mut dyn InterruptLine) {
        if self.revoked || frame_tact < self.interrupt_tact {
            return
        }
        if frame_tact > self.interrupt_tact + LONGEST_OP_TACTS {
            self.revoked = true;
            if self.state == InterruptState::Asserted {
                trace!("interrupt revoked at tact: {}", frame_tact);
                self.state = InterruptState::Idle;
                line.lower_int();
            }
            return
        }
        if !self.raised {
            trace!("interrupt raised at tact: {}", frame_tact);
            self.raised = true;
            self.state = InterruptState::Asserted;
            line.raise_int();
        }
    }

    /// The CPU has accepted the interrupt.
    pub fn acknowledge(&mut self) {
        self.state = InterruptState::Idle;
    }
}

impl Device for InterruptDevice {
    fn reset(&mut self) {
        self.state = InterruptState::Idle;
        self.raised = false;
        self.revoked = false;
    }

    fn as_frame_bound(&mut self) -> Option<&mut dyn FrameBound> {
        Some(self)
    }
}

impl FrameBound for InterruptDevice {
    fn on_new_frame(&mut self, _ctx: &FrameContext) {
        self.raised = false;
        self.revoked = false;
    }

    fn on_frame_completed(&mut self, _ctx: &FrameContext) {}
}
