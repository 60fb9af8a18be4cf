//! Tests the debugger step modes of the execution cycle.
use spectrum_engine::*;

mod vm;
use vm::*;

const NOPS_AND_LOOP: [u8;5] = [0x00, 0x00, 0x00, 0x18, 0xFE];

#[test]
fn step_into() {
    let screen = FrameCounter::default();
    let providers = Providers::new().with_clock(VirtualClock::new()).with_screen(screen.clone());
    let mut spectrum = spectrum_with(MachineConfig::spectrum48(), providers);
    load_program(&mut spectrum, &NOPS_AND_LOOP);
    let token = CancelToken::new();
    let options = ExecuteCycleOptions::debugger(DebugStepMode::StepInto);
    for pc in [CODE + 1, CODE + 2, CODE + 3, CODE + 3] {
        assert!(spectrum.execute_cycle(&token, &options));
        assert_eq!(spectrum.execution_state(), ExecutionState::StoppedForDebug);
        assert_eq!(spectrum.cpu().pc(), pc);
    }
    assert_eq!(spectrum.cpu().tacts(), 4 + 4 + 4 + 12);
    assert_eq!(spectrum.frame_count(), 0);
    // each stop publishes the frame rendered so far
    assert_eq!(screen.frames.lock().unwrap().len(), 4);
    assert_eq!(spectrum.bus().screen().next_tact(), 25);
}

#[test]
fn stop_at_breakpoint_and_resume() {
    let mut spectrum = spectrum48(VirtualClock::cancelling_after(1));
    load_program(&mut spectrum, &NOPS_AND_LOOP);
    spectrum.debug_state_mut().add_cpu_breakpoint(CODE + 2);
    let token = CancelToken::new();
    let options = ExecuteCycleOptions::debugger(DebugStepMode::StopAtBreakpoint);
    assert!(spectrum.execute_cycle(&token, &options));
    assert_eq!(spectrum.execution_state(), ExecutionState::StoppedForDebug);
    assert_eq!(spectrum.cpu().pc(), CODE + 2);
    assert_eq!(spectrum.debug_state().last_breakpoint(), Some(CODE + 2));
    // resuming does not stop at the same breakpoint again
    assert!(!spectrum.execute_cycle(&token, &options));
    assert_eq!(spectrum.execution_state(), ExecutionState::Cancelled);
    assert_eq!(spectrum.cpu().pc(), CODE + 3);
    assert_eq!(spectrum.frame_count(), 1);
}

#[test]
fn breakpoint_in_a_loop_stops_every_iteration() {
    let mut spectrum = spectrum48(VirtualClock::new());
    load_program(&mut spectrum, &NOPS_AND_LOOP);
    spectrum.set_pc(CODE + 3);
    spectrum.debug_state_mut().add_cpu_breakpoint(CODE + 3);
    let token = CancelToken::new();
    let options = ExecuteCycleOptions::debugger(DebugStepMode::StopAtBreakpoint);
    // a fresh breakpoint at the current PC stops at once
    assert!(spectrum.execute_cycle(&token, &options));
    assert_eq!(spectrum.cpu().tacts(), 0);
    for n in 1..=3 {
        assert!(spectrum.execute_cycle(&token, &options));
        assert_eq!(spectrum.cpu().pc(), CODE + 3);
        assert_eq!(spectrum.cpu().tacts(), 12 * n);
    }
}

#[test]
fn step_over_call() {
    let mut spectrum = spectrum48(VirtualClock::new());
    load_program(&mut spectrum, &[
        0xCD, 0x10, 0x80, // CALL 0x8010
        0x00,             // NOP
        0x18, 0xFE        // JR $
    ]);
    spectrum.inject_code(CODE + 0x10, &[0x00, 0x00, 0xC9]); // NOP; NOP; RET
    let token = CancelToken::new();
    let options = ExecuteCycleOptions::debugger(DebugStepMode::StepOver);
    assert!(spectrum.execute_cycle(&token, &options));
    assert_eq!(spectrum.execution_state(), ExecutionState::StoppedForDebug);
    assert_eq!(spectrum.cpu().pc(), CODE + 3);
    assert_eq!(spectrum.cpu().tacts(), 17 + 4 + 4 + 10);
    assert_eq!(spectrum.debug_state().imminent_breakpoint(), None);
    // no call: stops at the next instruction
    assert!(spectrum.execute_cycle(&token, &options));
    assert_eq!(spectrum.cpu().pc(), CODE + 4);
    let options = ExecuteCycleOptions::debugger(DebugStepMode::StepInto);
    spectrum.set_pc(CODE);
    assert!(spectrum.execute_cycle(&token, &options));
    assert_eq!(spectrum.cpu().pc(), CODE + 0x10);
}

#[test]
fn step_over_repeated_block_instruction() {
    let mut spectrum = spectrum48(VirtualClock::new());
    load_program(&mut spectrum, &[
        0x21, 0x00, 0x90, // LD HL,0x9000
        0x11, 0x00, 0xA0, // LD DE,0xA000
        0x01, 0x10, 0x00, // LD BC,16
        0xED, 0xB0,       // LDIR
        0x18, 0xFE        // JR $
    ]);
    spectrum.inject_code(0x9000, &[0x5A; 16]);
    spectrum.debug_state_mut().add_cpu_breakpoint(CODE + 9);
    let token = CancelToken::new();
    assert!(spectrum.execute_cycle(&token, &ExecuteCycleOptions::debugger(DebugStepMode::StopAtBreakpoint)));
    assert_eq!(spectrum.cpu().pc(), CODE + 9);
    assert!(spectrum.execute_cycle(&token, &ExecuteCycleOptions::debugger(DebugStepMode::StepOver)));
    assert_eq!(spectrum.cpu().pc(), CODE + 11);
    assert_eq!(spectrum.read_memory(0xA00F, true), 0x5A);
}

#[test]
fn interrupt_routine_breakpoint() {
    let mut spectrum = spectrum48(VirtualClock::new());
    // IM 1; EI; JR $
    load_program(&mut spectrum, &[0xED, 0x56, 0xFB, 0x18, 0xFE]);
    spectrum.debug_state_mut().add_cpu_breakpoint(0x0038);
    let token = CancelToken::new();
    let options = ExecuteCycleOptions::debugger(DebugStepMode::StopAtBreakpoint);
    assert!(spectrum.execute_cycle(&token, &options));
    assert_eq!(spectrum.cpu().pc(), 0x0038);
    assert!(spectrum.runs_in_maskable_interrupt());
    assert!(spectrum.current_frame_tact() >= spectrum.bus().interrupt().interrupt_tact());
    assert_eq!(spectrum.read_memory(ISR_COUNTER, true), 0);
}

#[test]
fn interrupt_routine_skipped() {
    let mut spectrum = spectrum48(VirtualClock::new());
    load_program(&mut spectrum, &[0xED, 0x56, 0xFB, 0x18, 0xFE]);
    spectrum.debug_state_mut().add_cpu_breakpoint(0x0038);
    spectrum.debug_state_mut().add_cpu_breakpoint(0x0052);
    let token = CancelToken::new();
    let options = ExecuteCycleOptions::debugger(DebugStepMode::StopAtBreakpoint)
                  .with_skip_interrupt_routine(true);
    for frame in 0..3 {
        assert!(spectrum.execute_cycle(&token, &options));
        assert_eq!(spectrum.cpu().pc(), 0x0052);
        assert!(!spectrum.runs_in_maskable_interrupt());
        assert_eq!(spectrum.frame_count(), frame);
        assert_eq!(spectrum.read_memory(ISR_COUNTER, true), frame as u8 + 1);
    }
}

#[test]
fn run_mode_leaves_interrupt_routine() {
    let mut spectrum = spectrum48(VirtualClock::cancelling_after(1));
    load_program(&mut spectrum, &[0xED, 0x56, 0xFB, 0x18, 0xFE]); // IM 1; EI; JR $
    spectrum.debug_state_mut().add_cpu_breakpoint(0x0038);
    let token = CancelToken::new();
    assert!(spectrum.execute_cycle(&token, &ExecuteCycleOptions::debugger(DebugStepMode::StopAtBreakpoint)));
    assert_eq!(spectrum.cpu().pc(), 0x0038);
    assert!(spectrum.runs_in_maskable_interrupt());
    // start an injected program from inside the interrupt routine
    spectrum.inject_code(0xA000, &[0xF3, 0x00, 0x00, 0x00, 0x18, 0xFE]); // DI; NOP; NOP; NOP; JR $
    spectrum.prepare_run_mode();
    spectrum.set_pc(0xA000);
    assert!(!spectrum.runs_in_maskable_interrupt());
    spectrum.debug_state_mut().add_cpu_breakpoint(0xA002);
    let options = ExecuteCycleOptions::debugger(DebugStepMode::StopAtBreakpoint)
                  .with_skip_interrupt_routine(true);
    assert!(spectrum.execute_cycle(&token, &options));
    assert_eq!(spectrum.execution_state(), ExecutionState::StoppedForDebug);
    assert_eq!(spectrum.cpu().pc(), 0xA002);
    assert!(!spectrum.runs_in_maskable_interrupt());
}

#[test]
fn step_over_from_stale_imminent_breakpoint() {
    let mut spectrum = spectrum48(VirtualClock::new());
    load_program(&mut spectrum, &NOPS_AND_LOOP);
    // left over from a cancelled step over that returned to CODE
    spectrum.debug_state_mut().set_imminent_breakpoint(Some(CODE));
    let token = CancelToken::new();
    let options = ExecuteCycleOptions::debugger(DebugStepMode::StepOver);
    assert!(spectrum.execute_cycle(&token, &options));
    assert_eq!(spectrum.execution_state(), ExecutionState::StoppedForDebug);
    assert_eq!(spectrum.cpu().pc(), CODE + 1);
    assert_eq!(spectrum.cpu().tacts(), 4);
    assert_eq!(spectrum.debug_state().imminent_breakpoint(), None);
}

#[test]
fn breakpoints_survive_reset() {
    let mut spectrum = spectrum48(VirtualClock::new());
    spectrum.debug_state_mut().add_cpu_breakpoint(0x0001);
    spectrum.reset();
    assert!(spectrum.debug_state().should_break_at(0x0001));
    let token = CancelToken::new();
    assert!(spectrum.execute_cycle(&token, &ExecuteCycleOptions::debugger(DebugStepMode::StopAtBreakpoint)));
    assert_eq!(spectrum.cpu().pc(), 0x0001);
    let preview = spectrum.debug_preview().unwrap();
    assert_eq!(preview.pc, 0x0001);
    assert_eq!(&preview.code[..], &[0x18, 0xFE]);
}
