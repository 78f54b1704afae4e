use std::fmt::Debug;
use std::thread;
use std::time::{Duration, Instant};

/// A monotonic millisecond clock.
///
/// Every blocking loop in the HMI checks its deadline against [Clock::now_ms] and yields
/// through [Clock::sleep_ms], so the host decides how waiting is actually done.
pub trait Clock: Debug {
    /// Milliseconds since an arbitrary, fixed epoch. Never goes backwards.
    fn now_ms(&self) -> u64;

    /// Yields for roughly `ms` milliseconds.
    fn sleep_ms(&self, ms: u64);

    /// Milliseconds elapsed since `since`, saturating at zero.
    fn elapsed_since(&self, since: u64) -> u64 {
        self.now_ms().saturating_sub(since)
    }
}

/// [Clock] backed by [Instant] and [thread::sleep].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let before = clock.now_ms();
        clock.sleep_ms(2);
        assert!(clock.now_ms() >= before + 1);
        assert_eq!(clock.elapsed_since(u64::MAX), 0);
    }
}
