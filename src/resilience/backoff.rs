//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based), capped at `max_ms` plus up
/// to 10% jitter. Attempt 0 is immediate.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let b1 = calculate_backoff(1, 500, 30_000);
        assert!(b1.as_millis() >= 500 && b1.as_millis() < 550);

        let b2 = calculate_backoff(2, 500, 30_000);
        assert!(b2.as_millis() >= 1000 && b2.as_millis() < 1100);
    }

    #[test]
    fn capped_at_max() {
        let b = calculate_backoff(40, 500, 30_000);
        assert!(b.as_millis() >= 30_000 && b.as_millis() < 33_000);
    }

    #[test]
    fn attempt_zero_is_immediate() {
        assert_eq!(calculate_backoff(0, 500, 30_000), Duration::ZERO);
    }
}
