//! Exponential reconnect backoff with jitter. Delays double per failed
//! attempt up to the configured maximum, with a randomized variance so a
//! fleet of agents does not reconnect in lockstep after an outage.

use rand::Rng;
use std::time::Duration;

#[derive(Debug)]
pub struct Backoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_fraction: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, jitter_fraction: f64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_fraction: jitter_fraction.clamp(0.0, 1.0),
            attempt: 0,
        }
    }

    /// Delay before the next attempt: `min(max, base * 2^attempt)` scaled by
    /// `1 ± jitter_fraction`. Increments the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(self.attempt).unwrap_or(u64::MAX))
            .min(self.max_delay_ms);
        self.attempt = self.attempt.saturating_add(1);

        let jittered = if self.jitter_fraction > 0.0 {
            let factor = 1.0
                + rand::rng().random_range(-self.jitter_fraction..=self.jitter_fraction);
            (exp as f64 * factor).max(0.0) as u64
        } else {
            exp
        };
        Duration::from_millis(jittered)
    }

    /// Called after a successful connection so the next failure starts over
    /// at the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_are_monotone_up_to_max_without_jitter() {
        let mut backoff = Backoff::new(100, 3000, 0.0);
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 3000, 3000, 3000]);
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn reset_returns_to_base_delay() {
        let mut backoff = Backoff::new(100, 3000, 0.0);
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_fraction_bounds() {
        let mut backoff = Backoff::new(1000, 60_000, 0.2);
        for _ in 0..100 {
            backoff.reset();
            let d = backoff.next_delay().as_millis() as u64;
            assert!((800..=1200).contains(&d), "delay {} outside jitter band", d);
        }
    }

    #[test]
    fn shift_overflow_is_saturating() {
        let mut backoff = Backoff::new(1000, 30_000, 0.0);
        for _ in 0..80 {
            let d = backoff.next_delay();
            assert!(d <= Duration::from_millis(30_000));
        }
    }
}
