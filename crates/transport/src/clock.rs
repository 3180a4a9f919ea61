use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic time source, in seconds.
///
/// The transport measures every playback position against an origin taken from one of
/// these, so all stems share one notion of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock backed by `Instant`, zeroed at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to. Drives headless sessions deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    // f64 bits
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.now.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1.5);
        assert_eq!(clock.now(), 1.5);
        clock.advance(0.25);
        assert_eq!(clock.now(), 1.75);
        clock.set(0.0);
        assert_eq!(clock.now(), 0.0);
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
