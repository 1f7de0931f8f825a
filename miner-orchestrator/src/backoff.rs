//! Exponential backoff with jitter for worker restart scheduling.
//!
//! `delay(attempt) = min(max, base * 2^(attempt-1)) + jitter`, where
//! `jitter` is uniform in `[0, 0.1 * delay)`. `attempt` starts at 1 on the
//! first unplanned exit and resets to 0 on an operator-initiated start or
//! restart.

use std::time::Duration;

use crate::clock::Jitter;

const BASE: Duration = Duration::from_secs(2);
const MAX: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct BackoffState {
    attempt: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Advances the attempt counter and returns the delay to wait before the
    /// next restart.
    pub fn next_delay(&mut self, jitter: &dyn Jitter) -> Duration {
        self.attempt += 1;
        let exponent = self.attempt.saturating_sub(1).min(31);
        let scaled = BASE.saturating_mul(1u32 << exponent);
        let sleep = scaled.min(MAX);
        let jitter_amt = sleep.mul_f64(0.1 * jitter.fraction());
        sleep + jitter_amt
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ZeroJitter;

    #[test]
    fn schedule_reaches_ceiling_with_zero_jitter() {
        let mut state = BackoffState::new();
        let jitter = ZeroJitter;
        let expected_secs = [2, 4, 8, 16, 32, 60, 60];
        for &expected in &expected_secs {
            let delay = state.next_delay(&jitter);
            assert_eq!(delay, Duration::from_secs(expected));
        }
    }

    #[test]
    fn reset_restarts_schedule_from_first_step() {
        let mut state = BackoffState::new();
        let jitter = ZeroJitter;
        state.next_delay(&jitter);
        state.next_delay(&jitter);
        assert_eq!(state.attempt(), 2);
        state.reset();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.next_delay(&jitter), Duration::from_secs(2));
    }

    #[test]
    fn jitter_adds_up_to_ten_percent() {
        struct MaxJitter;
        impl Jitter for MaxJitter {
            fn fraction(&self) -> f64 {
                0.999_999
            }
        }
        let mut state = BackoffState::new();
        let delay = state.next_delay(&MaxJitter);
        assert!(delay >= Duration::from_secs(2));
        assert!(delay < Duration::from_millis(2_200));
    }
}
