//! Tests the machine running on its own thread.
use std::time::Duration;
use spectrum_engine::*;
use spectrum_engine::thread::{VmController, VmEvent};

mod vm;
use vm::*;

const TIMEOUT: Duration = Duration::from_secs(10);

fn next_event(vm: &VmController) -> VmEvent {
    vm.events().recv_timeout(TIMEOUT).expect("machine event")
}

#[test]
fn run_pause_and_terminate() {
    let mut vm = VmController::spawn(spectrum48(VirtualClock::new()));
    vm.run(ExecuteCycleOptions::continuous());
    assert_eq!(next_event(&vm), VmEvent::Started);
    assert_eq!(next_event(&vm), VmEvent::Frame { count: 1 });
    assert_eq!(next_event(&vm), VmEvent::Frame { count: 2 });
    vm.pause();
    let stopped = loop {
        match next_event(&vm) {
            VmEvent::Frame { .. } => continue,
            event => break event
        }
    };
    match stopped {
        VmEvent::Stopped { completed, state, pc } => {
            assert!(!completed);
            assert_eq!(state, ExecutionState::Cancelled);
            assert!(pc <= 2);
        }
        event => panic!("unexpected event: {:?}", event)
    }

    vm.run(ExecuteCycleOptions::until_frame_ends());
    assert_eq!(next_event(&vm), VmEvent::Started);
    let count = match next_event(&vm) {
        VmEvent::Frame { count } => count,
        event => panic!("unexpected event: {:?}", event)
    };
    assert!(count > 2);
    assert!(matches!(next_event(&vm), VmEvent::Stopped { completed: true, state: ExecutionState::FrameDone, .. }));

    vm.reset();
    assert_eq!(next_event(&vm), VmEvent::Reset);
    let spectrum = vm.terminate().expect("machine");
    assert_eq!(spectrum.frame_count(), 0);
    assert_eq!(spectrum.cpu().tacts(), 0);
}

#[test]
fn terminate_running_machine() {
    let mut vm = VmController::spawn(spectrum48(VirtualClock::new()));
    vm.run(ExecuteCycleOptions::continuous());
    assert_eq!(next_event(&vm), VmEvent::Started);
    let spectrum = vm.terminate().expect("machine");
    assert_eq!(spectrum.execution_state(), ExecutionState::Cancelled);
}
