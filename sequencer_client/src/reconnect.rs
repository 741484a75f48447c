//! Reconnection backoff policy (§4.7): exponential backoff with jitter,
//! shared between the WebSocket transport and REST retry handling.

use std::time::Duration;

const BASE_MS: u64 = 1000;
const CAP_MS: u64 = 30_000;
const JITTER_FRACTION: f64 = 0.25;

/// Tracks the current attempt count and produces the next backoff delay.
/// `reset` on successful connect.
#[derive(Debug, Default)]
pub struct Backoff {
    attempt: u32,
}

impl Backoff {
    pub fn new() -> Backoff {
        Backoff { attempt: 0 }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Doubled per attempt, capped at 30s, plus up to 25% jitter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.attempt.min(5);
        self.attempt += 1;
        let base = BASE_MS.saturating_mul(1u64 << exp).min(CAP_MS);
        let jitter_span = (base as f64 * JITTER_FRACTION) as u64;
        let jitter = if jitter_span == 0 { 0 } else { rand::random::<u64>() % jitter_span };
        Duration::from_millis(base + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delay_is_around_base() {
        let mut backoff = Backoff::new();
        let delay = backoff.next_delay();
        assert!(delay.as_millis() >= BASE_MS as u128);
        assert!(delay.as_millis() <= (BASE_MS as f64 * (1.0 + JITTER_FRACTION)) as u128);
    }

    #[test]
    fn delay_doubles_and_caps() {
        let mut backoff = Backoff::new();
        for _ in 0..10 {
            let delay = backoff.next_delay();
            assert!(delay.as_millis() <= (CAP_MS as f64 * (1.0 + JITTER_FRACTION)) as u128);
        }
    }

    #[test]
    fn reset_restarts_from_base() {
        let mut backoff = Backoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        let delay = backoff.next_delay();
        assert!(delay.as_millis() <= (BASE_MS as f64 * (1.0 + JITTER_FRACTION)) as u128);
    }
}
