//! Per-symbol rolling windows.
//!
//! Each symbol owns exactly one [`RollingWindow`], mutated serially by the
//! shard worker that owns the symbol. The window keeps at most one hour of
//! volume history (current + previous bucket) and a short open-interest ring
//! bounded by the baseline lookback; older samples are evicted on rollover,
//! never accumulated.

use chrono::{DateTime, Duration, Timelike, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use volspike_core::MetricSnapshot;

/// Floors a timestamp to the start of its hour.
#[must_use]
pub fn hour_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Summary of an hour that just closed, produced on rollover so detectors
/// can still evaluate the finished hour after the buckets shift.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedHour {
    pub hour_start: DateTime<Utc>,
    pub volume: Decimal,
    /// Volume of the hour before the closed one, if it was observed.
    pub prev_volume: Option<Decimal>,
    pub open_price: Decimal,
    pub close_price: Decimal,
}

/// Observable window state after applying one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    pub hour_start: DateTime<Utc>,
    pub minute: u32,
    pub current_volume: Decimal,
    pub previous_volume: Option<Decimal>,
    pub open_price: Decimal,
    pub last_price: Decimal,
    /// Present exactly when this snapshot crossed an hour boundary.
    pub rolled_over: Option<ClosedHour>,
    /// Oldest open-interest sample still inside the lookback window.
    pub oi_baseline: Option<Decimal>,
    pub oi_current: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// Rolling volume buckets plus the open-interest baseline ring for one
/// symbol.
#[derive(Debug)]
pub struct RollingWindow {
    hour_start: Option<DateTime<Utc>>,
    current_volume: Decimal,
    previous_volume: Option<Decimal>,
    open_price: Decimal,
    last_price: Decimal,
    oi_ring: VecDeque<(DateTime<Utc>, Decimal)>,
    oi_lookback: Duration,
}

impl RollingWindow {
    /// Creates an empty window with the given open-interest lookback.
    #[must_use]
    pub fn new(oi_lookback: Duration) -> Self {
        Self {
            hour_start: None,
            current_volume: Decimal::ZERO,
            previous_volume: None,
            open_price: Decimal::ZERO,
            last_price: Decimal::ZERO,
            oi_ring: VecDeque::new(),
            oi_lookback,
        }
    }

    /// Applies one snapshot and returns the resulting window state.
    ///
    /// Rollover: crossing into the next adjacent hour shifts current into
    /// previous and emits a [`ClosedHour`]. A gap of more than one hour
    /// discards the previous bucket entirely (cold start again) because the
    /// buckets would no longer be adjacent.
    pub fn apply(&mut self, snapshot: &MetricSnapshot) -> WindowState {
        let hour = hour_floor(snapshot.timestamp);
        let mut rolled_over = None;

        match self.hour_start {
            None => {
                self.hour_start = Some(hour);
                self.current_volume = snapshot.volume;
                self.open_price = snapshot.price;
                self.last_price = snapshot.price;
            }
            Some(start) if hour == start => {
                self.current_volume += snapshot.volume;
                self.last_price = snapshot.price;
            }
            Some(start) if hour == start + Duration::hours(1) => {
                rolled_over = Some(ClosedHour {
                    hour_start: start,
                    volume: self.current_volume,
                    prev_volume: self.previous_volume,
                    open_price: self.open_price,
                    close_price: self.last_price,
                });
                self.previous_volume = Some(self.current_volume);
                self.hour_start = Some(hour);
                self.current_volume = snapshot.volume;
                self.open_price = snapshot.price;
                self.last_price = snapshot.price;
            }
            Some(start) if hour > start => {
                // Upstream gap longer than an hour: the old buckets are no
                // longer adjacent to the new hour.
                tracing::debug!(
                    gap_hours = (hour - start).num_hours(),
                    "window gap, discarding stale buckets"
                );
                self.previous_volume = None;
                self.hour_start = Some(hour);
                self.current_volume = snapshot.volume;
                self.open_price = snapshot.price;
                self.last_price = snapshot.price;
            }
            Some(_) => {
                // Out-of-order timestamp; fold into the current bucket.
                self.current_volume += snapshot.volume;
                self.last_price = snapshot.price;
            }
        }

        if let Some(oi) = snapshot.open_interest {
            self.oi_ring.push_back((snapshot.timestamp, oi));
            let horizon = snapshot.timestamp - self.oi_lookback;
            while self
                .oi_ring
                .front()
                .is_some_and(|(ts, _)| *ts < horizon)
            {
                self.oi_ring.pop_front();
            }
        }

        WindowState {
            hour_start: self.hour_start.unwrap_or(hour),
            minute: snapshot.timestamp.minute(),
            current_volume: self.current_volume,
            previous_volume: self.previous_volume,
            open_price: self.open_price,
            last_price: self.last_price,
            rolled_over,
            oi_baseline: self.oi_ring.front().map(|(_, oi)| *oi),
            oi_current: self.oi_ring.back().map(|(_, oi)| *oi),
            timestamp: snapshot.timestamp,
        }
    }

    /// Number of samples currently held in the open-interest ring.
    #[must_use]
    pub fn oi_samples(&self) -> usize {
        self.oi_ring.len()
    }
}
