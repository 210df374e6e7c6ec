//! Serde models for the upstream feed's raw tick messages.
//!
//! The feed multiplexes several stream types over one socket; every frame
//! carries an `e` discriminant. Numeric fields arrive as strings and are
//! parsed by the normalizer, not here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Mark price update carrying the current funding rate.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkPriceTick {
    /// Event time (ms since epoch)
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,
    /// Mark price
    #[serde(rename = "p")]
    pub mark_price: String,
    /// Funding rate
    #[serde(rename = "r")]
    pub funding_rate: String,
    /// Next funding time
    #[serde(rename = "T", default)]
    pub next_funding_time: i64,
}

/// Aggregated trade tick.
#[derive(Debug, Clone, Deserialize)]
pub struct AggTradeTick {
    /// Event time (ms since epoch)
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,
    /// Trade price
    #[serde(rename = "p")]
    pub price: String,
    /// Trade quantity (base asset)
    #[serde(rename = "q")]
    pub quantity: String,
}

/// One raw upstream message, discriminated by the feed's `e` field.
///
/// `OpenInterest` never arrives over the socket; the REST poller constructs
/// it so that every input funnels through the same normalizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "e")]
pub enum FeedMessage {
    #[serde(rename = "markPriceUpdate")]
    MarkPrice(MarkPriceTick),
    #[serde(rename = "aggTrade")]
    AggTrade(AggTradeTick),
    #[serde(skip)]
    OpenInterest {
        symbol: String,
        open_interest: Decimal,
        timestamp: DateTime<Utc>,
    },
}

impl FeedMessage {
    /// Parses one WebSocket text frame, unwrapping the combined-stream
    /// envelope when present.
    ///
    /// # Errors
    /// Returns the underlying serde error when the frame matches no known
    /// stream type.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct CombinedFrame {
            data: FeedMessage,
        }

        serde_json::from_str::<CombinedFrame>(text)
            .map(|frame| frame.data)
            .or_else(|_| serde_json::from_str::<Self>(text))
    }

    /// Symbol the message concerns.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::MarkPrice(t) => &t.symbol,
            Self::AggTrade(t) => &t.symbol,
            Self::OpenInterest { symbol, .. } => symbol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mark_price_update() {
        let json = r#"{
            "e": "markPriceUpdate",
            "E": 1699999999999,
            "s": "BTCUSDT",
            "p": "42750.00",
            "i": "42749.50",
            "P": "42750.25",
            "r": "0.00010000",
            "T": 1700000000000
        }"#;

        let message = FeedMessage::parse(json).unwrap();
        match message {
            FeedMessage::MarkPrice(tick) => {
                assert_eq!(tick.symbol, "BTCUSDT");
                assert_eq!(tick.mark_price, "42750.00");
                assert_eq!(tick.funding_rate, "0.00010000");
                assert_eq!(tick.event_time, 1699999999999);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_agg_trade() {
        let json = r#"{
            "e": "aggTrade",
            "E": 1699999999999,
            "s": "ETHUSDT",
            "a": 12345,
            "p": "2500.50",
            "q": "1.25",
            "f": 100,
            "l": 105,
            "T": 1699999999990,
            "m": true
        }"#;

        let message = FeedMessage::parse(json).unwrap();
        match message {
            FeedMessage::AggTrade(tick) => {
                assert_eq!(tick.symbol, "ETHUSDT");
                assert_eq!(tick.price, "2500.50");
                assert_eq!(tick.quantity, "1.25");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_combined_stream_envelope() {
        let json = r#"{
            "stream": "btcusdt@aggTrade",
            "data": {
                "e": "aggTrade",
                "E": 1699999999999,
                "s": "BTCUSDT",
                "p": "42750.00",
                "q": "0.10"
            }
        }"#;

        let message = FeedMessage::parse(json).unwrap();
        assert_eq!(message.symbol(), "BTCUSDT");
    }

    #[test]
    fn unknown_stream_type_is_an_error() {
        let json = r#"{"e": "depthUpdate", "s": "BTCUSDT"}"#;
        assert!(FeedMessage::parse(json).is_err());
    }

    #[test]
    fn negative_funding_rate_survives_parsing() {
        let json = r#"{
            "e": "markPriceUpdate",
            "E": 1699999999999,
            "s": "BTCUSDT",
            "p": "42750.00",
            "r": "-0.00050000",
            "T": 1700000000000
        }"#;

        let message = FeedMessage::parse(json).unwrap();
        match message {
            FeedMessage::MarkPrice(tick) => assert_eq!(tick.funding_rate, "-0.00050000"),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
