//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Fraction of the exponential term used as the jitter range (±25%).
const JITTER_RATIO: f64 = 0.25;

/// Un-jittered delay for a 1-based attempt: `base · 2^(attempt-1)`, capped at `max`.
pub fn exponential_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(factor).min(max)
}

/// Calculate the delay before the next attempt.
///
/// `min(max, base · 2^(attempt-1) + jitter)` where jitter is uniform in ±25% of
/// the exponential term.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    let exponential = base.saturating_mul(factor).as_secs_f64();
    let jitter = exponential * JITTER_RATIO * rand::thread_rng().gen_range(-1.0..=1.0);
    let delay = (exponential + jitter).max(0.0).min(max.as_secs_f64());
    Duration::from_secs_f64(delay)
}
