//! Human-looking request pacing.

use rand::Rng;

/// A delay drawn from uniform(min, max) plus triangular jitter of ±`jitter`,
/// clamped below at `min`. All values in milliseconds.
///
/// The triangular term is the sum of two uniforms — small deviations are more
/// likely than the extremes, the way real pauses between actions distribute.
pub fn human_delay_ms(min: u64, max: u64, jitter: u64) -> u64 {
    let mut rng = rand::rng();

    let base = if max > min {
        rng.random_range(min..=max)
    } else {
        min
    };

    let triangular = if jitter > 0 {
        let j = jitter as f64;
        let u1: f64 = rng.random_range(0.0..1.0);
        let u2: f64 = rng.random_range(0.0..1.0);
        (u1 + u2 - 1.0) * j
    } else {
        0.0
    };

    let delayed = base as f64 + triangular;
    delayed.max(min as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_below_min() {
        for _ in 0..1000 {
            assert!(human_delay_ms(500, 1500, 400) >= 500);
        }
    }

    #[test]
    fn bounded_above_by_max_plus_jitter() {
        for _ in 0..1000 {
            assert!(human_delay_ms(500, 1500, 400) <= 1900);
        }
    }

    #[test]
    fn zero_jitter_stays_in_range() {
        for _ in 0..100 {
            let d = human_delay_ms(100, 200, 0);
            assert!((100..=200).contains(&d));
        }
    }

    #[test]
    fn degenerate_range() {
        assert_eq!(human_delay_ms(250, 250, 0), 250);
    }
}
