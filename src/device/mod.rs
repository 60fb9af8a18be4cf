/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! Devices attached to the machine bus.
//!
//! Every device is [`Device`], some of them also react to frame boundaries
//! ([`FrameBound`]) or to each completed CPU operation ([`OperationBound`]).
//! The machine asks each device for its capabilities instead of keeping
//! separate lists of them.
pub mod beeper;
pub mod interrupt;
pub mod keyboard;
pub mod memory;
pub mod screen;
pub mod sound;
pub mod tape;

use crate::clock::Ts;
use crate::providers::MachineInfo;

/// The machine state devices observe when they are notified.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameContext {
    /// CPU T-states since the last reset.
    pub tacts: Ts,
    /// The CPU T-state counter value at the start of the current frame.
    pub frame_start: Ts,
    /// Base clock tacts elapsed in the current frame.
    pub frame_tact: u32,
    /// Frames completed since the last reset.
    pub frame_count: u64,
    /// Tacts of the previous frame that spilled over into the current one.
    pub overflow: u32,
    /// The program counter.
    pub pc: u16,
}

/// A device attached to the machine.
pub trait Device {
    /// Called once when the machine has been built.
    fn on_attached_to_vm(&mut self, _info: &MachineInfo) {}
    /// Restore the power-on state.
    fn reset(&mut self);
    fn as_frame_bound(&mut self) -> Option<&mut dyn FrameBound> {
        None
    }
    fn as_operation_bound(&mut self) -> Option<&mut dyn OperationBound> {
        None
    }
}

/// A device notified at frame boundaries.
pub trait FrameBound {
    fn on_new_frame(&mut self, ctx: &FrameContext);
    fn on_frame_completed(&mut self, ctx: &FrameContext);
}

/// A device notified after every CPU operation.
pub trait OperationBound {
    fn on_cpu_operation_completed(&mut self, ctx: &FrameContext);
}
