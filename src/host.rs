/*
    spectrum-engine: ZX Spectrum execution cycle engine.
    Copyright (C) 2024  spectrum-engine contributors

    For the full copyright notice, see the lib.rs file.
*/
//! Host time source and cooperative cancellation.
//!
//! The execution cycle never blocks except while waiting for the wall-clock
//! end of an emulated frame. That wait goes through a [`HostClock`] and is
//! cut short as soon as the [`CancelToken`] is cancelled.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::providers::VmComponentProvider;

/// The longest single sleep while waiting in [`SystemClock::wait_until`].
pub const WAIT_SLICE: Duration = Duration::from_millis(2);

/// A cloneable cancellation flag shared between the engine and its controllers.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Return a new, not cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones of this token observe it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Return whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A host clock used to pace the emulation to real time.
pub trait HostClock: VmComponentProvider + Send {
    /// Return the current value of a monotonic counter.
    fn counter(&self) -> u64;
    /// Return the number of counter ticks per second.
    fn frequency(&self) -> u64;
    /// Block the caller until the counter reaches `target` or the `token` is cancelled.
    ///
    /// Implementations must return promptly once the token is cancelled.
    fn wait_until(&mut self, target: u64, token: &CancelToken);
}

/// [`HostClock`] implementation based on [`Instant`] with a nanosecond counter.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock { origin: Instant::now() }
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VmComponentProvider for SystemClock {}

impl HostClock for SystemClock {
    fn counter(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn frequency(&self) -> u64 {
        1_000_000_000
    }

    fn wait_until(&mut self, target: u64, token: &CancelToken) {
        loop {
            if token.is_cancelled() {
                return
            }
            let now = self.counter();
            if now >= target {
                return
            }
            thread::sleep(Duration::from_nanos(target - now).min(WAIT_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn system_clock_waits_for_target() {
        let mut clock = SystemClock::new();
        let token = CancelToken::new();
        let target = clock.counter() + 5_000_000;
        clock.wait_until(target, &token);
        assert!(clock.counter() >= target);
    }

    #[test]
    fn system_clock_returns_on_cancellation() {
        let mut clock = SystemClock::new();
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        let target = clock.counter() + 10 * clock.frequency();
        clock.wait_until(target, &token);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
