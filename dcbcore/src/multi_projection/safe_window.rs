//! Safe-window threshold computation.
//!
//! The threshold is `now - (safe_window + extra)`, expressed as the smallest
//! sortable id of that instant. `extra` is zero unless dynamic widening is
//! configured, in which case it follows the delivery lag observed on the live
//! stream: the larger of a moving average and a decaying running maximum,
//! capped at the configured maximum.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::{DynamicSafeWindowConfig, MultiProjectionConfig};
use crate::types::SortableUniqueId;

/// Observed stream delivery lag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LagTracker {
    ema_ms: f64,
    ema_updated_at: Option<DateTime<Utc>>,
    max_ms: f64,
    max_updated_at: Option<DateTime<Utc>>,
}

fn decayed(
    value: f64,
    since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    decay_per_second: f64,
) -> f64 {
    let Some(since) = since else {
        return value.max(0.0);
    };
    if value <= 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let seconds = ((now - since).num_milliseconds().max(0) as f64) / 1_000.0;
    (value * decay_per_second.powf(seconds)).max(0.0)
}

impl LagTracker {
    /// A tracker with no observations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the lag of a batch delivered at `now`.
    ///
    /// The representative lag is the largest `now - timestamp` of the batch,
    /// clamped to `[0, max_extra]`.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe<'a>(
        &mut self,
        event_ids: impl IntoIterator<Item = &'a SortableUniqueId>,
        now: DateTime<Utc>,
        config: &DynamicSafeWindowConfig,
    ) {
        let max_extra = u64::from(config.max_extra) as f64;
        let batch_max = event_ids
            .into_iter()
            .map(|id| (now - id.timestamp()).num_milliseconds() as f64)
            .fold(0.0_f64, f64::max)
            .clamp(0.0, max_extra);

        let alpha: f64 = config.lag_ema_alpha.into();
        let decay: f64 = config.lag_decay_per_second.into();

        let ema = decayed(self.ema_ms, self.ema_updated_at, now, decay);
        self.ema_ms = alpha.mul_add(batch_max, (1.0 - alpha) * ema);
        self.ema_updated_at = Some(now);

        let max = decayed(self.max_ms, self.max_updated_at, now, decay);
        self.max_ms = max.max(batch_max);
        self.max_updated_at = Some(now);
    }

    /// Extra window at `now`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn extra_window(&self, now: DateTime<Utc>, config: &DynamicSafeWindowConfig) -> Duration {
        let decay: f64 = config.lag_decay_per_second.into();
        let ema = decayed(self.ema_ms, self.ema_updated_at, now, decay);
        let max = decayed(self.max_ms, self.max_updated_at, now, decay);
        let extra = ema.max(max).min(u64::from(config.max_extra) as f64);
        Duration::from_millis(extra.max(0.0) as u64)
    }

    /// Moving average of the observed lag, without decay.
    pub const fn average_lag_ms(&self) -> f64 {
        self.ema_ms
    }

    /// Running maximum of the observed lag, without decay.
    pub const fn max_lag_ms(&self) -> f64 {
        self.max_ms
    }
}

/// The safe-window threshold at `now`.
///
/// Every event whose sortable id compares at or before the returned id is
/// treated as final.
pub fn safe_window_threshold(
    now: DateTime<Utc>,
    config: &MultiProjectionConfig,
    lag: &LagTracker,
) -> SortableUniqueId {
    let extra = config
        .dynamic
        .as_ref()
        .map_or(Duration::ZERO, |dynamic| lag.extra_window(now, dynamic));
    let window = config.safe_window.as_duration() + extra;
    let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
    let at = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
    SortableUniqueId::min_for(at)
}
