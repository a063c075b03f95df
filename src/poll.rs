//! # Bounded Status Polling
//!
//! The controller waits for hardware progress by re-reading a status register
//! a fixed number of times with a fixed delay in between. [`PollPolicy`] makes
//! that budget explicit so it can be tested against a simulated delay.

use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A bounded busy-wait: up to `attempts` checks, `interval_us` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Maximum number of checks
    pub attempts: u32,
    /// Delay after each failed check, in microseconds
    pub interval_us: u32,
}

/// The policy ran out of attempts without the condition becoming true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollExhausted {
    /// Number of checks performed
    pub attempts: u32,
}

impl PollPolicy {
    /// Wait for the transmitter to go idle before loading the FIFO (~100 ms).
    pub const READY_WAIT: PollPolicy = PollPolicy::new(1_000, 100);

    /// Wait for a transmission to complete (~1 s).
    pub const TX_COMPLETE: PollPolicy = PollPolicy::new(10_000, 100);

    pub const fn new(attempts: u32, interval_us: u32) -> Self {
        Self {
            attempts,
            interval_us,
        }
    }

    /// Worst-case time spent waiting.
    pub fn total_budget(&self) -> Duration {
        Duration::from_micros(self.attempts as u64 * self.interval_us as u64)
    }

    /// Evaluate `done` until it returns true or the attempts run out.
    ///
    /// Returns the number of checks it took. Every failed check, including the
    /// last, is followed by one `interval_us` delay.
    pub fn run<D, F>(&self, delay: &mut D, mut done: F) -> Result<u32, PollExhausted>
    where
        D: DelayNs,
        F: FnMut() -> bool,
    {
        for attempt in 1..=self.attempts {
            if done() {
                return Ok(attempt);
            }
            delay.delay_us(self.interval_us);
        }
        Err(PollExhausted {
            attempts: self.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingDelay {
        calls: u32,
        total_us: u64,
    }

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.calls += 1;
            self.total_us += (ns / 1_000) as u64;
        }

        fn delay_us(&mut self, us: u32) {
            self.calls += 1;
            self.total_us += us as u64;
        }
    }

    #[test]
    fn test_budgets() {
        assert_eq!(PollPolicy::READY_WAIT.total_budget(), Duration::from_millis(100));
        assert_eq!(PollPolicy::TX_COMPLETE.total_budget(), Duration::from_secs(1));
    }

    #[test]
    fn test_immediate_success_does_not_delay() {
        let mut delay = CountingDelay::default();
        assert_eq!(PollPolicy::READY_WAIT.run(&mut delay, || true), Ok(1));
        assert_eq!(delay.calls, 0);
    }

    #[test]
    fn test_success_after_some_checks() {
        let mut delay = CountingDelay::default();
        let mut checks = 0;
        let result = PollPolicy::new(10, 100).run(&mut delay, || {
            checks += 1;
            checks == 4
        });
        assert_eq!(result, Ok(4));
        assert_eq!(delay.calls, 3);
        assert_eq!(delay.total_us, 300);
    }

    #[test]
    fn test_exhaustion_checks_exactly_attempts() {
        let mut delay = CountingDelay::default();
        let mut checks = 0;
        let result = PollPolicy::TX_COMPLETE.run(&mut delay, || {
            checks += 1;
            false
        });
        assert_eq!(result, Err(PollExhausted { attempts: 10_000 }));
        assert_eq!(checks, 10_000);
        assert_eq!(delay.total_us, 1_000_000);
    }
}
