//! Wire events exchanged between the pipeline stages and pushed to clients.
//!
//! Everything that travels over one channel is a tagged variant of
//! [`PushEvent`]; the `event` discriminant values are part of the public
//! wire contract and must not change.

use crate::tier::{AlertKind, DeliveryMethod, Tier};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One normalized observation of a symbol's telemetry.
///
/// `volume` is the traded quote notional since the previous snapshot, not a
/// cumulative total; the aggregator adds it to the current-hour bucket.
/// Funding rate and open interest update on their own cadence and carry the
/// latest known value, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub symbol: String,
    pub price: Decimal,
    pub volume: Decimal,
    pub funding_rate: Option<f64>,
    pub open_interest: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// Direction of the hourly candle at alert time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleDirection {
    Bullish,
    Bearish,
    Neutral,
}

/// Volume spike alert class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpikeKind {
    /// First crossing of the volume multiple within the hour.
    Spike,
    /// Mid-hour refresh for a spike still above the multiple.
    HalfUpdate,
    /// End-of-hour refresh for the just-closed spiking hour.
    FullUpdate,
}

/// A detected hourly volume spike (or an update for one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpikeEvent {
    pub symbol: String,
    /// Symbol with the quote suffix stripped, for display ("BTC").
    pub asset: String,
    pub alert_type: SpikeKind,
    pub current_volume: Decimal,
    pub previous_volume: Decimal,
    pub volume_ratio: f64,
    pub price: Decimal,
    pub funding_rate: Option<f64>,
    pub candle_direction: CandleDirection,
    pub is_update: bool,
    /// Start of the hour the spike belongs to.
    pub hour_timestamp: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Direction of an open-interest swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OiDirection {
    Up,
    Down,
}

/// A 5-minute open-interest swing beyond the configured threshold.
///
/// Open-interest amounts are optional only because the free tier receives
/// them redacted; the detector always emits them populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OiAlertEvent {
    pub symbol: String,
    pub direction: OiDirection,
    pub baseline: Option<Decimal>,
    pub current: Option<Decimal>,
    /// Fractional change vs the baseline (0.035 = +3.5%).
    pub pct_change: f64,
    pub abs_change: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// A fired user threshold alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredAlert {
    pub alert_id: String,
    pub user_id: String,
    pub symbol: String,
    pub alert_type: AlertKind,
    pub threshold: Decimal,
    pub value: Decimal,
    pub previous_value: Option<Decimal>,
    pub crossed_up: bool,
    pub delivery_method: DeliveryMethod,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time open interest for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterestSample {
    pub symbol: String,
    pub open_interest: Option<Decimal>,
    pub open_interest_usd: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// Inner payload of an `alert-triggered` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum TriggeredPayload {
    /// System-detected volume spike.
    Spike(SpikeEvent),
    /// User-registered threshold alert.
    User(TriggeredAlert),
}

/// Everything pushed to clients, tagged with the wire event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PushEvent {
    MarketUpdate(MetricSnapshot),
    OpenInterestUpdate(OpenInterestSample),
    OpenInterestAlert(OiAlertEvent),
    AlertTriggered(TriggeredPayload),
}

impl PushEvent {
    /// Symbol the event concerns, for subscription filtering.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::MarketUpdate(s) => &s.symbol,
            Self::OpenInterestUpdate(s) => &s.symbol,
            Self::OpenInterestAlert(a) => &a.symbol,
            Self::AlertTriggered(TriggeredPayload::Spike(s)) => &s.symbol,
            Self::AlertTriggered(TriggeredPayload::User(u)) => &u.symbol,
        }
    }

    /// Returns a copy rendered for the given tier, with open-interest
    /// fields replaced by a placeholder where the tier requires it.
    #[must_use]
    pub fn redacted_for(&self, tier: Tier) -> Self {
        if !tier.redacts_open_interest() {
            return self.clone();
        }

        match self {
            Self::MarketUpdate(snapshot) => {
                let mut snapshot = snapshot.clone();
                snapshot.open_interest = None;
                Self::MarketUpdate(snapshot)
            }
            Self::OpenInterestUpdate(sample) => {
                let mut sample = sample.clone();
                sample.open_interest = None;
                sample.open_interest_usd = None;
                Self::OpenInterestUpdate(sample)
            }
            Self::OpenInterestAlert(alert) => {
                let mut alert = alert.clone();
                alert.baseline = None;
                alert.current = None;
                alert.abs_change = None;
                Self::OpenInterestAlert(alert)
            }
            Self::AlertTriggered(_) => self.clone(),
        }
    }
}

/// A push event stamped with the tier it was rendered for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbound {
    pub tier: Tier,
    #[serde(flatten)]
    pub event: PushEvent,
}

impl Outbound {
    /// Renders `event` for `tier`, applying redaction.
    #[must_use]
    pub fn render(tier: Tier, event: &PushEvent) -> Self {
        Self {
            tier,
            event: event.redacted_for(tier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> MetricSnapshot {
        MetricSnapshot {
            symbol: "BTCUSDT".to_string(),
            price: dec!(45000),
            volume: dec!(125000),
            funding_rate: Some(0.0001),
            open_interest: Some(dec!(90000)),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn push_event_uses_wire_event_names() {
        let json = serde_json::to_value(PushEvent::MarketUpdate(snapshot())).unwrap();
        assert_eq!(json["event"], "market-update");
        assert_eq!(json["fundingRate"], 0.0001);

        let alert = PushEvent::OpenInterestAlert(OiAlertEvent {
            symbol: "BTCUSDT".to_string(),
            direction: OiDirection::Up,
            baseline: Some(dec!(100000)),
            current: Some(dec!(103500)),
            pct_change: 0.035,
            abs_change: Some(dec!(3500)),
            timestamp: Utc::now(),
        });
        let json = serde_json::to_value(alert).unwrap();
        assert_eq!(json["event"], "open-interest-alert");
        assert_eq!(json["direction"], "UP");
    }

    #[test]
    fn alert_triggered_tags_its_source() {
        let triggered = PushEvent::AlertTriggered(TriggeredPayload::User(TriggeredAlert {
            alert_id: "a-1".to_string(),
            user_id: "u-1".to_string(),
            symbol: "ETHUSDT".to_string(),
            alert_type: AlertKind::PriceCross,
            threshold: dec!(2500),
            value: dec!(2510),
            previous_value: Some(dec!(2490)),
            crossed_up: true,
            delivery_method: DeliveryMethod::Dashboard,
            timestamp: Utc::now(),
        }));
        let json = serde_json::to_value(triggered).unwrap();
        assert_eq!(json["event"], "alert-triggered");
        assert_eq!(json["source"], "user");
        assert_eq!(json["alertType"], "PRICE_CROSS");
    }

    #[test]
    fn free_tier_redacts_open_interest_fields() {
        let event = PushEvent::MarketUpdate(snapshot());
        let redacted = event.redacted_for(Tier::Free);
        match redacted {
            PushEvent::MarketUpdate(s) => assert!(s.open_interest.is_none()),
            other => panic!("unexpected event: {other:?}"),
        }

        // Price and funding stay visible.
        let json = serde_json::to_value(event.redacted_for(Tier::Free)).unwrap();
        assert_eq!(json["openInterest"], serde_json::Value::Null);
        assert_eq!(json["price"], serde_json::json!("45000"));
    }

    #[test]
    fn pro_and_elite_payloads_are_untouched() {
        let event = PushEvent::MarketUpdate(snapshot());
        assert_eq!(event.redacted_for(Tier::Pro), event);
        assert_eq!(event.redacted_for(Tier::Elite), event);
    }

    #[test]
    fn outbound_envelope_carries_tier_and_flattened_event() {
        let outbound = Outbound::render(Tier::Free, &PushEvent::MarketUpdate(snapshot()));
        let json = serde_json::to_value(&outbound).unwrap();
        assert_eq!(json["tier"], "free");
        assert_eq!(json["event"], "market-update");
        assert_eq!(json["openInterest"], serde_json::Value::Null);
    }

    #[test]
    fn spike_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&SpikeKind::HalfUpdate).unwrap(),
            "\"HALF_UPDATE\""
        );
        assert_eq!(
            serde_json::to_string(&SpikeKind::FullUpdate).unwrap(),
            "\"FULL_UPDATE\""
        );
    }
}
