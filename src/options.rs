/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! Options controlling a single execution cycle.
#[cfg(feature = "serde")]
use serde::{Serialize, Deserialize};

/// When the execution cycle should return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EmulationMode {
    /// Run frame after frame until cancelled.
    #[default]
    Continuous,
    /// Return as soon as the CPU enters the HALT state.
    UntilHalt,
    /// Return after the current frame has been completed.
    UntilFrameEnds,
    /// Return when the CPU reaches the termination point in the termination ROM.
    UntilExecutionPoint,
    /// Run frame after frame and stop according to the [`DebugStepMode`].
    Debugger,
}

/// How the debugger decides to stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DebugStepMode {
    /// Stop at breakpoints only.
    #[default]
    StopAtBreakpoint,
    /// Stop before the next instruction.
    StepInto,
    /// Stop before the next instruction, running subroutine calls, RSTs,
    /// HALT and block repeat instructions to completion.
    StepOver,
}

/// Options of a single [`crate::machine::Spectrum::execute_cycle`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExecuteCycleOptions {
    pub emulation_mode: EmulationMode,
    pub debug_step_mode: DebugStepMode,
    /// The index of the ROM which must be paged in at the termination point.
    pub termination_rom: usize,
    /// The address of the termination point, see [`EmulationMode::UntilExecutionPoint`].
    pub termination_point: u16,
    /// Whether the debugger ignores everything executed inside a maskable interrupt routine.
    pub skip_interrupt_routine: bool,
}

impl ExecuteCycleOptions {
    pub const fn continuous() -> Self {
        Self::with_mode(EmulationMode::Continuous)
    }

    pub const fn until_halt() -> Self {
        Self::with_mode(EmulationMode::UntilHalt)
    }

    pub const fn until_frame_ends() -> Self {
        Self::with_mode(EmulationMode::UntilFrameEnds)
    }

    pub const fn until_execution_point(termination_rom: usize, termination_point: u16) -> Self {
        ExecuteCycleOptions {
            termination_rom,
            termination_point,
            ..Self::with_mode(EmulationMode::UntilExecutionPoint)
        }
    }

    pub const fn debugger(debug_step_mode: DebugStepMode) -> Self {
        ExecuteCycleOptions {
            debug_step_mode,
            ..Self::with_mode(EmulationMode::Debugger)
        }
    }

    pub const fn with_skip_interrupt_routine(mut self, skip: bool) -> Self {
        self.skip_interrupt_routine = skip;
        self
    }

    const fn with_mode(emulation_mode: EmulationMode) -> Self {
        ExecuteCycleOptions {
            emulation_mode,
            debug_step_mode: DebugStepMode::StopAtBreakpoint,
            termination_rom: 0,
            termination_point: 0,
            skip_interrupt_routine: false
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn options_deserialize_with_defaults() {
        let options: ExecuteCycleOptions = serde_json::from_str(
            r#"{"emulation_mode":"Debugger","debug_step_mode":"StepOver"}"#).unwrap();
        assert_eq!(options, ExecuteCycleOptions::debugger(DebugStepMode::StepOver));
        let json = serde_json::to_string(&ExecuteCycleOptions::until_execution_point(1, 0x12a9)).unwrap();
        assert!(json.contains(r#""termination_point":4777"#));
        assert!(json.contains(r#""emulation_mode":"UntilExecutionPoint""#));
    }
}
