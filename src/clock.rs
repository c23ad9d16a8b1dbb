//! The wall-clock/sleep provider used to simulate settlement latency. Abstracted so integration
//! tests can exercise real locking semantics without waiting out real settlement delays.
//!
//! Settlement sleeps execute while currency locks are held, and the Lock Coordinator
//! itself is synchronous `parking_lot`, so both run on a blocking thread (see
//! [`crate::engine::LiquidityPoolEngine`]) rather than via an async sleep — a [`Clock`]
//! implementation blocks its calling thread, it does not yield to an executor.

use std::time::Duration;

pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps for real, via [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RealClock;

impl Clock for RealClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Returns immediately regardless of the requested duration. Test-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantClock;

impl Clock for InstantClock {
    fn sleep(&self, _duration: Duration) {}
}
