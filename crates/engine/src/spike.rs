//! Hourly volume spike detection.
//!
//! A spike fires once per symbol and hour, when the current-hour volume
//! first reaches the configured multiple of the previous hour (and a
//! minimum notional floor). While the spike stays live, the detector emits
//! at most one HALF_UPDATE at the half-hour mark and one FULL_UPDATE when
//! the hour closes, instead of re-alerting on every tick.

use crate::window::WindowState;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use volspike_core::{CandleDirection, MetricSnapshot, SpikeEvent, SpikeKind};

/// Spike detector thresholds.
#[derive(Debug, Clone)]
pub struct SpikeConfig {
    /// Current-hour volume must reach this multiple of the previous hour.
    pub volume_multiple: f64,
    /// Minimum current-hour quote volume before a spike may fire.
    pub min_quote_volume: Decimal,
    /// Relative price change below which the candle counts as neutral.
    pub neutral_band: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            volume_multiple: 3.0,
            min_quote_volume: Decimal::from(3_000_000),
            neutral_band: 0.0005,
        }
    }
}

/// Per-symbol alert bookkeeping for the hour in flight.
#[derive(Debug, Clone)]
struct SpikeState {
    alerted_hour: DateTime<Utc>,
    initial_minute: u32,
    half_sent: bool,
}

/// Stateful spike detector, owned by a single shard worker.
#[derive(Debug, Default)]
pub struct SpikeDetector {
    config: SpikeConfig,
    state: HashMap<String, SpikeState>,
}

impl SpikeDetector {
    #[must_use]
    pub fn new(config: SpikeConfig) -> Self {
        Self {
            config,
            state: HashMap::new(),
        }
    }

    /// Evaluates one window update, emitting at most one spike event.
    ///
    /// Cold start (no previous-hour bucket) suppresses detection entirely;
    /// that is expected behavior, not a fault.
    pub fn evaluate(
        &mut self,
        snapshot: &MetricSnapshot,
        window: &WindowState,
    ) -> Option<SpikeEvent> {
        if let Some(event) = self.full_update_on_rollover(snapshot, window) {
            return Some(event);
        }

        let Some(previous) = window.previous_volume else {
            tracing::debug!(symbol = %snapshot.symbol, "no previous-hour bucket, spike detection suppressed");
            return None;
        };
        if previous <= Decimal::ZERO {
            tracing::debug!(symbol = %snapshot.symbol, "previous-hour volume is zero, spike detection suppressed");
            return None;
        }

        let ratio = volume_ratio(window.current_volume, previous)?;
        let already_alerted = self
            .state
            .get(&snapshot.symbol)
            .is_some_and(|s| s.alerted_hour == window.hour_start);

        if !already_alerted {
            if ratio < self.config.volume_multiple {
                return None;
            }
            if window.current_volume < self.config.min_quote_volume {
                tracing::debug!(
                    symbol = %snapshot.symbol,
                    ratio,
                    "ratio hit but volume below notional floor"
                );
                return None;
            }

            self.state.insert(
                snapshot.symbol.clone(),
                SpikeState {
                    alerted_hour: window.hour_start,
                    initial_minute: window.minute,
                    half_sent: false,
                },
            );
            return Some(self.build_event(snapshot, window, ratio, SpikeKind::Spike, previous));
        }

        // Spike already alerted this hour: consider the half-hour refresh.
        let due_for_half = {
            let state = self.state.get(&snapshot.symbol)?;
            window.minute >= 30 && !state.half_sent && state.initial_minute <= 20
        };
        if due_for_half && ratio >= self.config.volume_multiple {
            if let Some(state) = self.state.get_mut(&snapshot.symbol) {
                state.half_sent = true;
            }
            return Some(self.build_event(
                snapshot,
                window,
                ratio,
                SpikeKind::HalfUpdate,
                previous,
            ));
        }

        None
    }

    /// Emits the end-of-hour refresh for a spike whose hour just closed,
    /// then retires the bookkeeping for that hour.
    fn full_update_on_rollover(
        &mut self,
        snapshot: &MetricSnapshot,
        window: &WindowState,
    ) -> Option<SpikeEvent> {
        let closed = window.rolled_over.as_ref()?;
        let (alerted_hour, initial_minute) = {
            let state = self.state.get(&snapshot.symbol)?;
            (state.alerted_hour, state.initial_minute)
        };

        // The hour is over either way; the bookkeeping retires with it.
        self.state.remove(&snapshot.symbol);
        if alerted_hour != closed.hour_start {
            return None;
        }

        // An alert raised in the final minutes already reflects the full
        // hour; refreshing it would duplicate the initial alert.
        if initial_minute == 55 {
            return None;
        }

        let prev = closed.prev_volume?;
        if prev <= Decimal::ZERO {
            return None;
        }
        let ratio = volume_ratio(closed.volume, prev)?;
        if ratio < self.config.volume_multiple {
            return None;
        }

        Some(SpikeEvent {
            symbol: snapshot.symbol.clone(),
            asset: asset_name(&snapshot.symbol),
            alert_type: SpikeKind::FullUpdate,
            current_volume: closed.volume,
            previous_volume: prev,
            volume_ratio: ratio,
            price: closed.close_price,
            funding_rate: snapshot.funding_rate,
            candle_direction: candle_direction(
                closed.open_price,
                closed.close_price,
                self.config.neutral_band,
            ),
            is_update: true,
            hour_timestamp: closed.hour_start,
            timestamp: snapshot.timestamp,
        })
    }

    fn build_event(
        &self,
        snapshot: &MetricSnapshot,
        window: &WindowState,
        ratio: f64,
        kind: SpikeKind,
        previous: Decimal,
    ) -> SpikeEvent {
        SpikeEvent {
            symbol: snapshot.symbol.clone(),
            asset: asset_name(&snapshot.symbol),
            alert_type: kind,
            current_volume: window.current_volume,
            previous_volume: previous,
            volume_ratio: ratio,
            price: window.last_price,
            funding_rate: snapshot.funding_rate,
            candle_direction: candle_direction(
                window.open_price,
                window.last_price,
                self.config.neutral_band,
            ),
            is_update: !matches!(kind, SpikeKind::Spike),
            hour_timestamp: window.hour_start,
            timestamp: snapshot.timestamp,
        }
    }
}

/// `current / previous` as a float, `None` when it cannot be represented.
fn volume_ratio(current: Decimal, previous: Decimal) -> Option<f64> {
    if previous <= Decimal::ZERO {
        return None;
    }
    (current / previous).to_f64()
}

/// Candle direction from the hour's open vs the latest price.
fn candle_direction(open: Decimal, last: Decimal, neutral_band: f64) -> CandleDirection {
    if open <= Decimal::ZERO {
        return CandleDirection::Neutral;
    }
    let change = ((last - open) / open).to_f64().unwrap_or(0.0);
    if change.abs() < neutral_band {
        CandleDirection::Neutral
    } else if change > 0.0 {
        CandleDirection::Bullish
    } else {
        CandleDirection::Bearish
    }
}

/// Display name for a symbol: the quote suffix stripped ("BTCUSDT" → "BTC").
fn asset_name(symbol: &str) -> String {
    symbol
        .strip_suffix("USDT")
        .unwrap_or(symbol)
        .to_string()
}
