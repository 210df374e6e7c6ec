//! Shard workers: one long-lived task per symbol shard.
//!
//! A worker owns the rolling windows and detector state for its symbols and
//! processes snapshots strictly in arrival order, so no lock is ever needed
//! on window state. Everything it detects is emitted downstream as
//! [`PushEvent`]s in the same order.

use crate::alerts::AlertBook;
use crate::oi::{OiConfig, OiDetector};
use crate::spike::{SpikeConfig, SpikeDetector};
use crate::store::AlertStore;
use crate::window::RollingWindow;
use anyhow::Result;
use chrono::Duration;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;
use volspike_core::{
    DetectionConfig, MetricSnapshot, OpenInterestSample, PushEvent, TriggeredPayload,
};

pub struct ShardWorker {
    shard_id: usize,
    rx: mpsc::Receiver<MetricSnapshot>,
    event_tx: mpsc::Sender<PushEvent>,
    windows: HashMap<String, RollingWindow>,
    oi_lookback: Duration,
    spike: SpikeDetector,
    oi: OiDetector,
    alerts: Arc<AlertBook>,
    store: Option<Arc<AlertStore>>,
}

impl ShardWorker {
    /// Creates a worker for one shard.
    #[must_use]
    pub fn new(
        shard_id: usize,
        config: &DetectionConfig,
        rx: mpsc::Receiver<MetricSnapshot>,
        event_tx: mpsc::Sender<PushEvent>,
        alerts: Arc<AlertBook>,
    ) -> Self {
        let spike = SpikeDetector::new(SpikeConfig {
            volume_multiple: config.volume_multiple,
            min_quote_volume: Decimal::from_f64(config.min_quote_volume)
                .unwrap_or_else(|| Decimal::from(3_000_000)),
            neutral_band: 0.0005,
        });
        let oi = OiDetector::new(OiConfig {
            threshold_pct: config.oi_threshold_pct,
            min_delta: Decimal::from_f64(config.oi_min_delta)
                .unwrap_or_else(|| Decimal::from(5_000)),
            cooldown: Duration::seconds(i64::try_from(config.oi_cooldown_secs).unwrap_or(900)),
        });

        Self {
            shard_id,
            rx,
            event_tx,
            windows: HashMap::new(),
            oi_lookback: Duration::seconds(
                i64::try_from(config.oi_baseline_secs).unwrap_or(300),
            ),
            spike,
            oi,
            alerts,
            store: None,
        }
    }

    /// Attaches the durable store so alert state transitions are written
    /// through.
    #[must_use]
    pub fn with_store(mut self, store: Arc<AlertStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Runs the worker until its snapshot channel closes.
    ///
    /// # Errors
    /// Returns an error only on unrecoverable channel failures; per-symbol
    /// faults are logged and skipped.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(shard = self.shard_id, "shard worker starting");

        while let Some(snapshot) = self.rx.recv().await {
            if !self.process(snapshot).await {
                break;
            }
        }

        tracing::info!(shard = self.shard_id, "shard worker stopped");
        Ok(())
    }

    /// Processes one snapshot; returns false once downstream is gone.
    async fn process(&mut self, snapshot: MetricSnapshot) -> bool {
        let window = self
            .windows
            .entry(snapshot.symbol.clone())
            .or_insert_with(|| RollingWindow::new(self.oi_lookback));
        let state = window.apply(&snapshot);

        if !self.emit(PushEvent::MarketUpdate(snapshot.clone())).await {
            return false;
        }

        if let Some(oi) = snapshot.open_interest {
            let sample = OpenInterestSample {
                symbol: snapshot.symbol.clone(),
                open_interest: Some(oi),
                open_interest_usd: Some(oi * snapshot.price),
                mark_price: Some(snapshot.price),
                timestamp: snapshot.timestamp,
            };
            if !self.emit(PushEvent::OpenInterestUpdate(sample)).await {
                return false;
            }

            if let Some(alert) = self.oi.evaluate(
                &snapshot.symbol,
                state.oi_baseline,
                state.oi_current,
                snapshot.timestamp,
            ) {
                if !self.emit(PushEvent::OpenInterestAlert(alert)).await {
                    return false;
                }
            }
        }

        if let Some(spike) = self.spike.evaluate(&snapshot, &state) {
            let event = PushEvent::AlertTriggered(TriggeredPayload::Spike(spike));
            if !self.emit(event).await {
                return false;
            }
        }

        for triggered in self.alerts.evaluate(&snapshot).await {
            self.persist_transition(&triggered.alert_id).await;
            let event = PushEvent::AlertTriggered(TriggeredPayload::User(triggered));
            if !self.emit(event).await {
                return false;
            }
        }

        true
    }

    /// Writes a fired alert's new state through to the store. Store faults
    /// are local: logged, never propagated into the processing loop.
    async fn persist_transition(&self, alert_id: &str) {
        let Some(store) = &self.store else { return };
        let Ok(id) = Uuid::parse_str(alert_id) else {
            return;
        };
        match self.alerts.get(id).await {
            Ok(alert) => {
                if let Err(e) = store.upsert(&alert).await {
                    tracing::warn!(%alert_id, error = %e, "failed to persist alert transition");
                }
            }
            Err(e) => {
                tracing::warn!(%alert_id, error = %e, "fired alert vanished before persisting");
            }
        }
    }

    async fn emit(&self, event: PushEvent) -> bool {
        if self.event_tx.send(event).await.is_err() {
            tracing::info!(shard = self.shard_id, "event channel closed");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::NewAlert;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use volspike_core::{AlertKind, CrossDirection, DeliveryMethod, SpikeKind, Tier};

    fn snapshot(
        symbol: &str,
        price: Decimal,
        volume: Decimal,
        h: u32,
        m: u32,
    ) -> MetricSnapshot {
        MetricSnapshot {
            symbol: symbol.to_string(),
            price,
            volume,
            funding_rate: None,
            open_interest: None,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap(),
        }
    }

    fn spawn_worker(
        alerts: Arc<AlertBook>,
    ) -> (mpsc::Sender<MetricSnapshot>, mpsc::Receiver<PushEvent>) {
        let (snap_tx, snap_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let worker = ShardWorker::new(0, &DetectionConfig::default(), snap_rx, event_tx, alerts);
        tokio::spawn(worker.run());
        (snap_tx, event_rx)
    }

    async fn drain(rx: &mut mpsc::Receiver<PushEvent>) -> Vec<PushEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn every_snapshot_produces_a_market_update_in_order() {
        let (tx, mut rx) = spawn_worker(Arc::new(AlertBook::new()));

        tx.send(snapshot("BTCUSDT", dec!(100), dec!(10), 10, 0))
            .await
            .unwrap();
        tx.send(snapshot("BTCUSDT", dec!(101), dec!(20), 10, 1))
            .await
            .unwrap();
        drop(tx);

        let events = drain(&mut rx).await;
        let prices: Vec<Decimal> = events
            .iter()
            .filter_map(|e| match e {
                PushEvent::MarketUpdate(s) => Some(s.price),
                _ => None,
            })
            .collect();
        assert_eq!(prices, vec![dec!(100), dec!(101)]);
    }

    #[tokio::test]
    async fn spike_flows_through_as_alert_triggered() {
        let (tx, mut rx) = spawn_worker(Arc::new(AlertBook::new()));

        tx.send(snapshot("BTCUSDT", dec!(100), dec!(5_000_000), 9, 10))
            .await
            .unwrap();
        tx.send(snapshot("BTCUSDT", dec!(102), dec!(20_000_000), 10, 5))
            .await
            .unwrap();
        drop(tx);

        let events = drain(&mut rx).await;
        let spike = events.iter().find_map(|e| match e {
            PushEvent::AlertTriggered(TriggeredPayload::Spike(s)) => Some(s),
            _ => None,
        });
        let spike = spike.expect("spike event");
        assert_eq!(spike.alert_type, SpikeKind::Spike);
        assert_eq!(spike.symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn user_alert_fires_and_is_emitted() {
        let book = Arc::new(AlertBook::new());
        book.create(NewAlert {
            user_id: "user-1".to_string(),
            symbol: "ETHUSDT".to_string(),
            alert_type: AlertKind::PriceCross,
            threshold: "2500".to_string(),
            threshold_unit: crate::alerts::ThresholdUnit::Native,
            direction: CrossDirection::Any,
            delivery_method: DeliveryMethod::Dashboard,
        })
        .await
        .unwrap();

        let (tx, mut rx) = spawn_worker(book);

        tx.send(snapshot("ETHUSDT", dec!(2400), dec!(10), 10, 0))
            .await
            .unwrap();
        tx.send(snapshot("ETHUSDT", dec!(2550), dec!(10), 10, 1))
            .await
            .unwrap();
        drop(tx);

        let events = drain(&mut rx).await;
        let fired = events.iter().find_map(|e| match e {
            PushEvent::AlertTriggered(TriggeredPayload::User(u)) => Some(u),
            _ => None,
        });
        let fired = fired.expect("triggered alert");
        assert!(fired.crossed_up);
        assert_eq!(fired.value, dec!(2550));
    }

    #[tokio::test]
    async fn oi_snapshot_emits_sample_with_usd_notional() {
        let (tx, mut rx) = spawn_worker(Arc::new(AlertBook::new()));

        let mut snap = snapshot("BTCUSDT", dec!(50000), Decimal::ZERO, 10, 0);
        snap.open_interest = Some(dec!(90000));
        tx.send(snap).await.unwrap();
        drop(tx);

        let events = drain(&mut rx).await;
        let sample = events.iter().find_map(|e| match e {
            PushEvent::OpenInterestUpdate(s) => Some(s),
            _ => None,
        });
        let sample = sample.expect("oi sample");
        assert_eq!(sample.open_interest, Some(dec!(90000)));
        assert_eq!(sample.open_interest_usd, Some(dec!(4_500_000_000)));

        // Redaction downstream hides the numbers from the free tier.
        let event = PushEvent::OpenInterestUpdate(sample.clone());
        match event.redacted_for(Tier::Free) {
            PushEvent::OpenInterestUpdate(s) => assert!(s.open_interest.is_none()),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
