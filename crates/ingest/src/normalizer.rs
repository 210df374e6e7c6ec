//! Folds heterogeneous feed messages into per-symbol metric snapshots.
//!
//! Trades contribute traded notional (the snapshot's volume delta); mark
//! price ticks contribute price and funding rate; open-interest samples
//! contribute OI. Each snapshot carries the latest known value of every
//! other field, so downstream consumers see one uniform shape.

use crate::feed::FeedMessage;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::mpsc;
use volspike_core::MetricSnapshot;

#[derive(Debug, Default, Clone)]
struct SymbolState {
    price: Option<Decimal>,
    funding_rate: Option<f64>,
    open_interest: Option<Decimal>,
}

/// Stateful normalizer, one per ingest pipeline.
#[derive(Debug, Default)]
pub struct Normalizer {
    state: HashMap<String, SymbolState>,
}

impl Normalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one raw message, producing a snapshot when enough is known.
    ///
    /// Unparseable numeric fields drop the message with a warning; an
    /// open-interest sample for a symbol with no price yet is retained in
    /// state but produces no snapshot.
    pub fn apply(&mut self, message: &FeedMessage) -> Option<MetricSnapshot> {
        match message {
            FeedMessage::AggTrade(tick) => {
                let price = parse_decimal(&tick.price, tick.symbol.as_str(), "price")?;
                let quantity = parse_decimal(&tick.quantity, tick.symbol.as_str(), "quantity")?;
                let state = self.state.entry(tick.symbol.clone()).or_default();
                state.price = Some(price);

                Some(MetricSnapshot {
                    symbol: tick.symbol.clone(),
                    price,
                    volume: price * quantity,
                    funding_rate: state.funding_rate,
                    open_interest: state.open_interest,
                    timestamp: millis_to_utc(tick.event_time),
                })
            }
            FeedMessage::MarkPrice(tick) => {
                let mark_price =
                    parse_decimal(&tick.mark_price, tick.symbol.as_str(), "mark price")?;
                let funding_rate = match tick.funding_rate.parse::<f64>() {
                    Ok(rate) => Some(rate),
                    Err(e) => {
                        tracing::warn!(symbol = %tick.symbol, error = %e, "unparseable funding rate");
                        None
                    }
                };

                let state = self.state.entry(tick.symbol.clone()).or_default();
                state.price = Some(mark_price);
                if funding_rate.is_some() {
                    state.funding_rate = funding_rate;
                }

                Some(MetricSnapshot {
                    symbol: tick.symbol.clone(),
                    price: mark_price,
                    volume: Decimal::ZERO,
                    funding_rate: state.funding_rate,
                    open_interest: state.open_interest,
                    timestamp: millis_to_utc(tick.event_time),
                })
            }
            FeedMessage::OpenInterest {
                symbol,
                open_interest,
                timestamp,
            } => {
                let state = self.state.entry(symbol.clone()).or_default();
                state.open_interest = Some(*open_interest);

                let price = state.price?;
                Some(MetricSnapshot {
                    symbol: symbol.clone(),
                    price,
                    volume: Decimal::ZERO,
                    funding_rate: state.funding_rate,
                    open_interest: Some(*open_interest),
                    timestamp: *timestamp,
                })
            }
        }
    }
}

/// Drives a [`Normalizer`] between the raw feed channel and the snapshot
/// channel until either side closes.
pub async fn run_normalizer(
    mut rx: mpsc::Receiver<FeedMessage>,
    tx: mpsc::Sender<MetricSnapshot>,
) {
    let mut normalizer = Normalizer::new();
    while let Some(message) = rx.recv().await {
        if let Some(snapshot) = normalizer.apply(&message) {
            if tx.send(snapshot).await.is_err() {
                tracing::info!("snapshot channel closed, normalizer stopping");
                return;
            }
        }
    }
    tracing::info!("feed channel closed, normalizer stopping");
}

fn parse_decimal(raw: &str, symbol: &str, field: &str) -> Option<Decimal> {
    match Decimal::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(symbol, field, error = %e, "unparseable feed value");
            None
        }
    }
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{AggTradeTick, MarkPriceTick};
    use rust_decimal_macros::dec;

    fn trade(symbol: &str, price: &str, quantity: &str) -> FeedMessage {
        FeedMessage::AggTrade(AggTradeTick {
            event_time: 1_700_000_000_000,
            symbol: symbol.to_string(),
            price: price.to_string(),
            quantity: quantity.to_string(),
        })
    }

    fn mark(symbol: &str, price: &str, rate: &str) -> FeedMessage {
        FeedMessage::MarkPrice(MarkPriceTick {
            event_time: 1_700_000_000_000,
            symbol: symbol.to_string(),
            mark_price: price.to_string(),
            funding_rate: rate.to_string(),
            next_funding_time: 0,
        })
    }

    #[test]
    fn trade_produces_notional_volume() {
        let mut normalizer = Normalizer::new();
        let snapshot = normalizer.apply(&trade("BTCUSDT", "50000", "0.5")).unwrap();

        assert_eq!(snapshot.price, dec!(50000));
        assert_eq!(snapshot.volume, dec!(25000));
        assert!(snapshot.funding_rate.is_none());
    }

    #[test]
    fn mark_price_carries_funding_into_later_snapshots() {
        let mut normalizer = Normalizer::new();

        let snapshot = normalizer.apply(&mark("BTCUSDT", "50000", "0.0004")).unwrap();
        assert_eq!(snapshot.volume, Decimal::ZERO);
        assert_eq!(snapshot.funding_rate, Some(0.0004));

        // The next trade still knows the funding rate.
        let snapshot = normalizer.apply(&trade("BTCUSDT", "50100", "1")).unwrap();
        assert_eq!(snapshot.funding_rate, Some(0.0004));
    }

    #[test]
    fn open_interest_needs_a_known_price() {
        let mut normalizer = Normalizer::new();
        let oi = FeedMessage::OpenInterest {
            symbol: "BTCUSDT".to_string(),
            open_interest: dec!(90000),
            timestamp: Utc::now(),
        };

        // No price yet: retained, no snapshot.
        assert!(normalizer.apply(&oi).is_none());

        // After a trade the stored OI flows into snapshots.
        let snapshot = normalizer.apply(&trade("BTCUSDT", "50000", "1")).unwrap();
        assert_eq!(snapshot.open_interest, Some(dec!(90000)));

        // And a fresh OI sample now yields its own snapshot.
        let snapshot = normalizer.apply(&oi).unwrap();
        assert_eq!(snapshot.open_interest, Some(dec!(90000)));
        assert_eq!(snapshot.price, dec!(50000));
        assert_eq!(snapshot.volume, Decimal::ZERO);
    }

    #[test]
    fn symbols_are_tracked_independently() {
        let mut normalizer = Normalizer::new();
        normalizer.apply(&mark("BTCUSDT", "50000", "0.0004"));

        let snapshot = normalizer.apply(&trade("ETHUSDT", "2500", "2")).unwrap();
        assert!(snapshot.funding_rate.is_none());
        assert_eq!(snapshot.volume, dec!(5000));
    }

    #[test]
    fn unparseable_price_drops_the_message() {
        let mut normalizer = Normalizer::new();
        assert!(normalizer.apply(&trade("BTCUSDT", "garbage", "1")).is_none());
    }

    #[tokio::test]
    async fn run_normalizer_forwards_snapshots() {
        let (feed_tx, feed_rx) = mpsc::channel(8);
        let (snap_tx, mut snap_rx) = mpsc::channel(8);
        tokio::spawn(run_normalizer(feed_rx, snap_tx));

        feed_tx.send(trade("BTCUSDT", "50000", "0.1")).await.unwrap();
        drop(feed_tx);

        let snapshot = snap_rx.recv().await.unwrap();
        assert_eq!(snapshot.symbol, "BTCUSDT");
        assert!(snap_rx.recv().await.is_none());
    }
}
