//! Routes snapshots to shard workers by symbol hash.
//!
//! A symbol always lands on the same shard, so exactly one worker ever
//! mutates that symbol's rolling window.

use anyhow::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::mpsc;
use volspike_core::MetricSnapshot;

#[derive(Clone)]
pub struct SymbolRouter {
    shards: Vec<mpsc::Sender<MetricSnapshot>>,
}

impl SymbolRouter {
    /// Creates a router over the given shard channels.
    #[must_use]
    pub fn new(shards: Vec<mpsc::Sender<MetricSnapshot>>) -> Self {
        assert!(!shards.is_empty(), "router needs at least one shard");
        Self { shards }
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard index a symbol maps to.
    #[must_use]
    pub fn shard_index(&self, symbol: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        symbol.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Delivers a snapshot to its owning shard, awaiting channel capacity.
    ///
    /// # Errors
    /// Returns an error if the shard worker has shut down.
    pub async fn route(&self, snapshot: MetricSnapshot) -> Result<()> {
        let index = self.shard_index(&snapshot.symbol);
        self.shards[index]
            .send(snapshot)
            .await
            .map_err(|_| anyhow::anyhow!("shard {index} is no longer running"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn snapshot(symbol: &str) -> MetricSnapshot {
        MetricSnapshot {
            symbol: symbol.to_string(),
            price: Decimal::ONE,
            volume: Decimal::ZERO,
            funding_rate: None,
            open_interest: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn symbol_always_maps_to_the_same_shard() {
        let (tx, _rx) = mpsc::channel(8);
        let router = SymbolRouter::new(vec![tx.clone(), tx.clone(), tx]);

        let first = router.shard_index("BTCUSDT");
        for _ in 0..10 {
            assert_eq!(router.shard_index("BTCUSDT"), first);
        }
    }

    #[tokio::test]
    async fn route_delivers_to_the_owning_shard() {
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let router = SymbolRouter::new(vec![tx_a, tx_b]);

        router.route(snapshot("BTCUSDT")).await.unwrap();

        let index = router.shard_index("BTCUSDT");
        let received = if index == 0 {
            rx_a.try_recv()
        } else {
            rx_b.try_recv()
        };
        assert_eq!(received.unwrap().symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn route_fails_when_shard_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let router = SymbolRouter::new(vec![tx]);
        drop(rx);

        assert!(router.route(snapshot("BTCUSDT")).await.is_err());
    }
}
