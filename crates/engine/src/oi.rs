//! Open-interest swing detection.
//!
//! Compares the current open interest against the oldest baseline sample in
//! the 5-minute lookback ring. A swing must clear both a percent threshold
//! and an absolute contract delta, and each (symbol, direction) pair is
//! subject to a cooldown so a sustained move produces one alert.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use volspike_core::{OiAlertEvent, OiDirection};

/// Open-interest detector thresholds.
#[derive(Debug, Clone)]
pub struct OiConfig {
    /// Fractional change vs baseline required to alert (0.03 = 3%).
    pub threshold_pct: f64,
    /// Minimum absolute change in contracts.
    pub min_delta: Decimal,
    /// Cooldown between alerts for the same symbol and direction.
    pub cooldown: Duration,
}

impl Default for OiConfig {
    fn default() -> Self {
        Self {
            threshold_pct: 0.03,
            min_delta: Decimal::from(5_000),
            cooldown: Duration::seconds(900),
        }
    }
}

/// Stateful open-interest swing detector.
#[derive(Debug, Default)]
pub struct OiDetector {
    config: OiConfig,
    last_alert_at: HashMap<(String, OiDirection), DateTime<Utc>>,
}

impl OiDetector {
    #[must_use]
    pub fn new(config: OiConfig) -> Self {
        Self {
            config,
            last_alert_at: HashMap::new(),
        }
    }

    /// Evaluates the baseline vs current pair for one symbol.
    ///
    /// Returns `None` when no baseline exists yet (cold start), when the
    /// change is below either threshold, or when the direction is still in
    /// cooldown.
    pub fn evaluate(
        &mut self,
        symbol: &str,
        baseline: Option<Decimal>,
        current: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Option<OiAlertEvent> {
        let baseline = baseline?;
        let current = current?;
        if baseline <= Decimal::ZERO {
            tracing::debug!(symbol, "no usable OI baseline, detection suppressed");
            return None;
        }

        let abs_change = current - baseline;
        let pct_change = (abs_change / baseline).to_f64()?;

        let direction = if pct_change >= self.config.threshold_pct
            && abs_change >= self.config.min_delta
        {
            OiDirection::Up
        } else if pct_change <= -self.config.threshold_pct && abs_change <= -self.config.min_delta {
            OiDirection::Down
        } else {
            return None;
        };

        let key = (symbol.to_string(), direction);
        if let Some(last) = self.last_alert_at.get(&key) {
            if now - *last < self.config.cooldown {
                return None;
            }
        }
        self.last_alert_at.insert(key, now);

        tracing::info!(
            symbol,
            ?direction,
            pct = pct_change * 100.0,
            "open-interest swing detected"
        );

        Some(OiAlertEvent {
            symbol: symbol.to_string(),
            direction,
            baseline: Some(baseline),
            current: Some(current),
            pct_change,
            abs_change: Some(abs_change),
            timestamp: now,
        })
    }
}
