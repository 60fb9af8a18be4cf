/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! Std thread runner for the [`Spectrum`] machine.
use std::thread::{self, JoinHandle};
use std::sync::mpsc::{channel, Sender, Receiver};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace, Level};

use crate::host::CancelToken;
use crate::machine::{ExecutionState, Spectrum};
use crate::options::ExecuteCycleOptions;

/// Requests handled by the machine thread.
#[derive(Clone, Debug)]
pub enum ControlMsg {
    /// Run the execution cycle until it stops or the token is cancelled.
    Run(ExecuteCycleOptions, CancelToken),
    Reset,
    Terminate
}

/// Notifications sent by the machine thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmEvent {
    /// The execution cycle has started.
    Started,
    /// A frame has been completed.
    Frame { count: u64 },
    /// The execution cycle has returned.
    Stopped {
        /// `false` if the cycle has been cancelled.
        completed: bool,
        state: ExecutionState,
        pc: u16
    },
    /// The machine has been reset.
    Reset,
    /// The thread is about to exit.
    Terminated
}

/// Owns a machine running on its own thread.
pub struct VmController {
    control: Sender<ControlMsg>,
    events: Receiver<VmEvent>,
    token: Option<CancelToken>,
    handle: Option<JoinHandle<Spectrum>>,
}

impl VmController {
    /// Move the `spectrum` to a new thread waiting for [`ControlMsg`] requests.
    pub fn spawn(mut spectrum: Spectrum) -> Self {
        let (control, control_rx) = channel();
        let (events_tx, events) = channel();
        let frame_tx = events_tx.clone();
        spectrum.set_frame_listener(Some(Box::new(move |ctx| {
            let _ = frame_tx.send(VmEvent::Frame { count: ctx.frame_count });
        })));
        let handle = thread::spawn(move || {
            run_machine(&mut spectrum, control_rx, events_tx);
            spectrum.set_frame_listener(None);
            spectrum
        });
        VmController { control, events, token: None, handle: Some(handle) }
    }

    /// Start the execution cycle with the given `options`, cancelling the one running.
    pub fn run(&mut self, options: ExecuteCycleOptions) {
        self.pause();
        let token = CancelToken::new();
        self.token = Some(token.clone());
        self.send(ControlMsg::Run(options, token));
    }

    /// Cancel the running execution cycle.
    pub fn pause(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    /// Cancel the running execution cycle and reset the machine.
    pub fn reset(&mut self) {
        self.pause();
        self.send(ControlMsg::Reset);
    }

    /// Return the receiver of the machine thread notifications.
    pub fn events(&self) -> &Receiver<VmEvent> {
        &self.events
    }

    /// Stop the machine thread and return the machine.
    ///
    /// Returns `None` if the thread has panicked.
    pub fn terminate(mut self) -> Option<Spectrum> {
        self.shutdown()
    }

    fn send(&self, msg: ControlMsg) {
        if self.control.send(msg).is_err() {
            warn!("the machine thread is gone");
        }
    }

    fn shutdown(&mut self) -> Option<Spectrum> {
        self.pause();
        let handle = self.handle.take()?;
        self.send(ControlMsg::Terminate);
        match handle.join() {
            Ok(spectrum) => Some(spectrum),
            Err(_) => {
                error!("the machine thread has panicked");
                None
            }
        }
    }
}

impl Drop for VmController {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn run_machine(spectrum: &mut Spectrum, control: Receiver<ControlMsg>, events: Sender<VmEvent>) {
    // a closed channel terminates the thread just like an explicit request
    while let Ok(msg) = control.recv() {
        match msg {
            ControlMsg::Run(options, token) => {
                let _ = events.send(VmEvent::Started);
                let completed = spectrum.execute_cycle(&token, &options);
                let _ = events.send(VmEvent::Stopped {
                    completed,
                    state: spectrum.execution_state(),
                    pc: spectrum.cpu().pc()
                });
            }
            ControlMsg::Reset => {
                spectrum.reset();
                let _ = events.send(VmEvent::Reset);
            }
            ControlMsg::Terminate => break
        }
    }
    debug!("machine thread terminated");
    let _ = events.send(VmEvent::Terminated);
}
