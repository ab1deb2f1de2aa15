//! Validated configuration.
//!
//! Every tunable is a `nutype` newtype, so an out-of-range configuration
//! cannot be constructed or deserialized. The aggregate config structs have
//! `Default` impls matching the recommended production values.

use std::time::Duration;

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Base visibility margin of the multi-projection safe window, in ms.
///
/// Events whose sortable-id timestamp is older than `now - SafeWindowMs` are
/// considered final.
#[nutype(
    validate(less_or_equal = 3_600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct SafeWindowMs(u64);

impl SafeWindowMs {
    /// Convert to Duration.
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into())
    }
}

/// Upper bound on how far observed lag may widen the safe window, in ms.
#[nutype(
    validate(less_or_equal = 3_600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct MaxExtraSafeWindowMs(u64);

/// Smoothing factor of the observed-lag moving average.
#[nutype(
    validate(greater_or_equal = 0.01, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Into, Serialize, Deserialize)
)]
pub struct LagEmaAlpha(f64);

/// Per-second decay applied to the observed lag between updates.
#[nutype(
    validate(greater_or_equal = 0.5, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Into, Serialize, Deserialize)
)]
pub struct LagDecayPerSecond(f64);

/// Widens the safe window by the recently observed delivery lag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicSafeWindowConfig {
    /// Cap on the extra window.
    pub max_extra: MaxExtraSafeWindowMs,
    /// Moving-average smoothing.
    pub lag_ema_alpha: LagEmaAlpha,
    /// Decay per second without observations.
    pub lag_decay_per_second: LagDecayPerSecond,
}

impl Default for DynamicSafeWindowConfig {
    fn default() -> Self {
        Self {
            max_extra: MaxExtraSafeWindowMs::try_new(30_000)
                .expect("30s is a valid extra window"),
            lag_ema_alpha: LagEmaAlpha::try_new(0.3).expect("0.3 is a valid alpha"),
            lag_decay_per_second: LagDecayPerSecond::try_new(0.98)
                .expect("0.98 is a valid decay"),
        }
    }
}

/// Multi-projection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiProjectionConfig {
    /// Base safe window.
    pub safe_window: SafeWindowMs,
    /// Optional lag-driven widening.
    pub dynamic: Option<DynamicSafeWindowConfig>,
}

impl Default for MultiProjectionConfig {
    fn default() -> Self {
        Self {
            safe_window: SafeWindowMs::try_new(20_000).expect("20s is a valid safe window"),
            dynamic: None,
        }
    }
}

impl MultiProjectionConfig {
    /// Sets the base safe window.
    #[must_use]
    pub const fn with_safe_window(mut self, safe_window: SafeWindowMs) -> Self {
        self.safe_window = safe_window;
        self
    }

    /// Enables lag-driven widening.
    #[must_use]
    pub const fn with_dynamic_window(mut self, dynamic: DynamicSafeWindowConfig) -> Self {
        self.dynamic = Some(dynamic);
        self
    }
}

/// Compressed size above which a snapshot body is moved to blob storage.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct OffloadThresholdBytes(usize);

/// Hard limit on the serialized (uncompressed) size of a snapshot.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct MaxSnapshotBytes(usize);

/// Snapshot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Offload threshold on the compressed body.
    pub offload_threshold: OffloadThresholdBytes,
    /// Optional size limit.
    pub max_snapshot_bytes: Option<MaxSnapshotBytes>,
    /// Provider name recorded for offloaded bodies.
    pub blob_provider: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            offload_threshold: OffloadThresholdBytes::try_new(1_000_000)
                .expect("1MB is a valid offload threshold"),
            max_snapshot_bytes: None,
            blob_provider: "memory".to_string(),
        }
    }
}

/// Maximum number of attempts for retried command execution.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct MaxRetryAttempts(u32);

/// Base delay between retry attempts in milliseconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct RetryBaseDelayMs(u64);

/// Maximum delay between retry attempts in milliseconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 300_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct RetryMaxDelayMs(u64);

/// Exponential backoff multiplier for retry delays.
#[nutype(
    validate(greater_or_equal = 1.0, less_or_equal = 3.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Into, Serialize, Deserialize)
)]
pub struct BackoffMultiplier(f64);

/// Retry behaviour for idempotent command handlers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: MaxRetryAttempts,
    /// Delay before the first retry.
    pub base_delay: RetryBaseDelayMs,
    /// Ceiling on any single delay.
    pub max_delay: RetryMaxDelayMs,
    /// Growth factor between retries.
    pub backoff_multiplier: BackoffMultiplier,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MaxRetryAttempts::try_new(3).expect("3 is a valid attempt count"),
            base_delay: RetryBaseDelayMs::try_new(100).expect("100ms is a valid delay"),
            max_delay: RetryMaxDelayMs::try_new(30_000).expect("30s is a valid delay"),
            backoff_multiplier: BackoffMultiplier::try_new(2.0).expect("2.0 is a valid multiplier"),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based), with ±25% jitter.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base_delay_ms = u64::from(self.base_delay) as f64;
        let max_delay_ms = u64::from(self.max_delay) as f64;
        let multiplier: f64 = self.backoff_multiplier.into();

        let delay = (base_delay_ms * multiplier.powi(attempt as i32)).min(max_delay_ms);
        let jitter = delay * 0.25 * (rand::rng().random::<f64>() - 0.5) * 2.0;
        let final_delay = (delay + jitter).max(0.0).min(max_delay_ms) as u64;

        Duration::from_millis(final_delay)
    }
}

/// Command executor configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Retry behaviour for idempotent handlers.
    pub retry: RetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recommended_values() {
        let projection = MultiProjectionConfig::default();
        assert_eq!(u64::from(projection.safe_window), 20_000);
        assert!(projection.dynamic.is_none());

        let snapshot = SnapshotConfig::default();
        assert_eq!(usize::from(snapshot.offload_threshold), 1_000_000);

        let dynamic = DynamicSafeWindowConfig::default();
        assert_eq!(u64::from(dynamic.max_extra), 30_000);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(SafeWindowMs::try_new(3_600_001).is_err());
        assert!(LagEmaAlpha::try_new(0.0).is_err());
        assert!(LagDecayPerSecond::try_new(0.4).is_err());
        assert!(LagDecayPerSecond::try_new(1.1).is_err());
        assert!(OffloadThresholdBytes::try_new(0).is_err());
        assert!(MaxRetryAttempts::try_new(0).is_err());
        assert!(MaxRetryAttempts::try_new(11).is_err());
        assert!(BackoffMultiplier::try_new(4.0).is_err());
    }

    #[test]
    fn invalid_values_fail_deserialization() {
        let result: Result<MultiProjectionConfig, _> =
            serde_json::from_str(r#"{"safe_window":99999999,"dynamic":null}"#);
        assert!(result.is_err());

        let parsed: MultiProjectionConfig =
            serde_json::from_str(r#"{"safe_window":5000,"dynamic":null}"#).unwrap();
        assert_eq!(u64::from(parsed.safe_window), 5_000);
    }

    #[test]
    fn retry_delay_grows_and_is_capped() {
        let config = RetryConfig {
            max_attempts: MaxRetryAttempts::try_new(5).unwrap(),
            base_delay: RetryBaseDelayMs::try_new(100).unwrap(),
            max_delay: RetryMaxDelayMs::try_new(1_000).unwrap(),
            backoff_multiplier: BackoffMultiplier::try_new(2.0).unwrap(),
        };
        let first = config.delay_for_attempt(0);
        assert!(first >= Duration::from_millis(75) && first <= Duration::from_millis(125));
        assert!(config.delay_for_attempt(10) <= Duration::from_millis(1_000));
    }
}
