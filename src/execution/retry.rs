//! Bounded wait loops with an injectable clock.

use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Poll `probe` every `interval` until it yields a value or `timeout` has
/// elapsed. The probe always runs at least once.
pub fn wait_for<T>(
    clock: &dyn Clock,
    timeout: Duration,
    interval: Duration,
    mut probe: impl FnMut() -> Option<T>,
) -> Option<T> {
    let deadline = clock.now() + timeout;
    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if clock.now() >= deadline {
            return None;
        }
        clock.sleep(interval);
    }
}

/// Run `op` up to `attempts` times, sleeping `interval` between failures.
/// Returns the last error when every attempt fails.
pub fn retry<T, E>(
    clock: &dyn Clock,
    attempts: u32,
    interval: Duration,
    mut op: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, E> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(_) => {
                clock.sleep(interval);
                attempt += 1;
            }
        }
    }
}
