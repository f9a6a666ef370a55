//! Retry delay computation.
//!
//! Pure and deterministic: `delay = min(base * 2^retry_count, max)`. No
//! hidden state; eligibility decisions are made by the outbox against the
//! caller-supplied clock.

use std::time::Duration;

use crate::config::SyncConfig;

/// Exponent clamp so the shift below can never overflow a u64.
const MAX_EXPONENT: u32 = 32;

/// Compute the retry delay for an item that has failed `retry_count` times.
#[must_use]
pub fn delay(config: &SyncConfig, retry_count: u32) -> Duration {
    let factor = 1u64 << retry_count.min(MAX_EXPONENT);
    let secs = config.base_delay_secs.saturating_mul(factor);
    Duration::from_secs(secs.min(config.max_delay_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_growth() {
        let config = SyncConfig::default();

        let expected = [1, 2, 4, 8, 16, 32, 60];
        for (retry_count, secs) in expected.iter().enumerate() {
            assert_eq!(
                delay(&config, retry_count as u32),
                Duration::from_secs(*secs),
                "retry_count {retry_count}"
            );
        }
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let config = SyncConfig::default();
        assert_eq!(delay(&config, 10), Duration::from_secs(60));
        assert_eq!(delay(&config, 1000), Duration::from_secs(60));
        assert_eq!(delay(&config, u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_respects_custom_config() {
        let config = SyncConfig {
            base_delay_secs: 5,
            max_delay_secs: 300,
            ..SyncConfig::default()
        };

        assert_eq!(delay(&config, 0), Duration::from_secs(5));
        assert_eq!(delay(&config, 1), Duration::from_secs(10));
        assert_eq!(delay(&config, 5), Duration::from_secs(160));
        assert_eq!(delay(&config, 10), Duration::from_secs(300));
    }
}
