use rand::Rng;
use std::time::Duration;

pub const DEFAULT_INTERVAL_MILLIS: u64 = 1_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const MAX_BACKOFF_MILLIS: u64 = 4 * 60 * 60 * 1_000;
pub const RANDOM_FACTOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub interval_millis: u64,
    pub backoff_factor: f64,
    /// Relative jitter applied on top of the exponential value. Kept below
    /// `(factor - 1) / (factor + 1)` so that consecutive delays keep growing.
    pub random_factor: f64,
    pub max_millis: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            interval_millis: DEFAULT_INTERVAL_MILLIS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            random_factor: RANDOM_FACTOR,
            max_millis: MAX_BACKOFF_MILLIS,
        }
    }
}

impl BackoffConfig {
    pub fn new(interval: Duration, max: Duration) -> Self {
        Self {
            interval_millis: duration_millis(interval),
            max_millis: duration_millis(max),
            ..Self::default()
        }
    }
}

/// Delay to wait after `backoff_count` consecutive failures.
///
/// A count of zero returns the base interval without jitter.
pub fn calculate_backoff(backoff_count: u32, config: BackoffConfig) -> Duration {
    Duration::from_millis(calculate_backoff_with_rng(
        backoff_count,
        config,
        &mut rand::thread_rng(),
    ))
}

fn calculate_backoff_with_rng<R: Rng + ?Sized>(
    backoff_count: u32,
    config: BackoffConfig,
    rng: &mut R,
) -> u64 {
    if backoff_count == 0 {
        return config.interval_millis.min(config.max_millis);
    }
    let exponent = backoff_count.min(i32::MAX as u32) as i32;
    let base = (config.interval_millis as f64) * config.backoff_factor.powi(exponent);
    let jitter = if config.random_factor > 0.0 {
        config.random_factor * base * rng.gen_range(-1.0..=1.0)
    } else {
        0.0
    };
    let value = (base + jitter)
        .round()
        .clamp(0.0, config.max_millis as f64);
    value as u64
}

fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn zero_count_is_base_interval() {
        let config = BackoffConfig::new(Duration::from_secs(5), Duration::from_secs(60));
        assert_eq!(calculate_backoff(0, config), Duration::from_secs(5));
    }

    #[test]
    fn deterministic_with_seeded_rng() {
        let mut rng = StdRng::seed_from_u64(42);
        let value = calculate_backoff_with_rng(3, BackoffConfig::default(), &mut rng);
        assert!(value > 0);
        assert!(value <= MAX_BACKOFF_MILLIS);
    }

    #[test]
    fn backoff_strictly_grows_until_capped() {
        let config = BackoffConfig::new(Duration::from_secs(1), Duration::from_secs(3600));
        let mut rng = StdRng::seed_from_u64(7);
        let mut previous = calculate_backoff_with_rng(0, config, &mut rng);
        for count in 1..8 {
            let next = calculate_backoff_with_rng(count, config, &mut rng);
            assert!(next > previous, "count {count}: {next} <= {previous}");
            previous = next;
        }
    }

    #[test]
    fn backoff_is_capped() {
        let config = BackoffConfig::new(Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(calculate_backoff(30, config), Duration::from_secs(10));
    }
}
