//! Connection registry and tier-gated fan-out.
//!
//! The broadcaster keeps one bounded queue per live connection. Elite
//! connections receive every event as it happens; free and pro events are
//! staged per tier (latest state per key, not an append log) and flushed
//! when that tier's wall-clock gate releases, together with the latest
//! snapshot for every symbol the connection watches. Redaction is applied
//! at enqueue time, so a queue only ever holds payloads its tier may see.

use crate::queue::{ConnectionQueue, PushOutcome};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use volspike_core::{DeliveryConfig, MetricSnapshot, Outbound, PushEvent, Tier, TriggeredPayload};

pub type ConnectionId = u64;

struct Connection {
    tier: Tier,
    /// `None` subscribes to every symbol.
    symbols: Option<HashSet<String>>,
    queue: Arc<ConnectionQueue>,
}

impl Connection {
    fn wants(&self, symbol: &str) -> bool {
        self.symbols
            .as_ref()
            .map_or(true, |set| set.contains(symbol))
    }
}

/// Fans engine events out to live connections.
pub struct Broadcaster {
    config: DeliveryConfig,
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    latest: RwLock<HashMap<String, MetricSnapshot>>,
    /// Events staged for the gated tiers, keyed for latest-state overwrite.
    pending: Mutex<HashMap<Tier, HashMap<String, PushEvent>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    #[must_use]
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
            latest: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a connection and returns its id and queue.
    ///
    /// The caller owns the delivery loop: it pops the queue and writes to
    /// the transport until the queue closes.
    pub async fn subscribe(
        &self,
        tier: Tier,
        symbols: Option<HashSet<String>>,
    ) -> (ConnectionId, Arc<ConnectionQueue>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(ConnectionQueue::new(
            self.config.queue_capacity,
            self.config.max_consecutive_drops,
        ));
        self.connections.write().await.insert(
            id,
            Connection {
                tier,
                symbols,
                queue: queue.clone(),
            },
        );
        tracing::info!(connection = id, tier = tier.as_str(), "subscriber registered");
        (id, queue)
    }

    /// Deregisters a connection and closes its queue. Synchronous with
    /// respect to fan-out: once this returns, no further event is
    /// delivered to the connection.
    pub async fn unsubscribe(&self, id: ConnectionId) {
        if let Some(connection) = self.connections.write().await.remove(&id) {
            connection.queue.close();
            tracing::info!(connection = id, "subscriber deregistered");
        }
    }

    /// Number of live connections on a tier.
    pub async fn subscriber_count(&self, tier: Tier) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.tier == tier)
            .count()
    }

    /// Total live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Ingests one engine event: updates the latest-snapshot cache, streams
    /// it to elite immediately, and stages it for the gated tiers.
    pub async fn on_event(&self, event: &PushEvent) {
        if let PushEvent::MarketUpdate(snapshot) = event {
            self.latest
                .write()
                .await
                .insert(snapshot.symbol.clone(), snapshot.clone());
        }

        self.publish(event, Tier::Elite).await;

        // Market updates are re-materialized from the latest cache at
        // release time; everything else is staged per tier.
        if !matches!(event, PushEvent::MarketUpdate(_)) {
            let key = pending_key(event);
            let mut pending = self.pending.lock().await;
            for tier in [Tier::Free, Tier::Pro] {
                pending
                    .entry(tier)
                    .or_default()
                    .insert(key.clone(), event.clone());
            }
        }
    }

    /// Flushes a gated tier at its release boundary: the latest snapshot of
    /// every symbol plus the staged events. Returns the number of
    /// connections on the tier.
    pub async fn on_release(&self, tier: Tier) -> usize {
        let mut events: Vec<PushEvent> = {
            let latest = self.latest.read().await;
            let mut snapshots: Vec<&MetricSnapshot> = latest.values().collect();
            snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            snapshots
                .into_iter()
                .map(|s| PushEvent::MarketUpdate(s.clone()))
                .collect()
        };

        if let Some(staged) = self.pending.lock().await.remove(&tier) {
            events.extend(staged.into_values());
        }

        for event in &events {
            self.publish(event, tier).await;
        }

        let count = self.subscriber_count(tier).await;
        tracing::debug!(tier = tier.as_str(), events = events.len(), subscribers = count, "tier released");
        count
    }

    /// Pushes one event to every connection of a tier whose symbol filter
    /// matches, applying redaction. Never blocks on a slow connection;
    /// connections whose queue closed are dropped from the registry.
    /// Returns the number of queues the event reached.
    pub async fn publish(&self, event: &PushEvent, tier: Tier) -> usize {
        let outbound = Outbound::render(tier, event);
        let symbol = event.symbol().to_string();

        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let connections = self.connections.read().await;
            for (id, connection) in connections.iter() {
                if connection.tier != tier || !connection.wants(&symbol) {
                    continue;
                }
                match connection.queue.push(outbound.clone()) {
                    PushOutcome::Enqueued | PushOutcome::DroppedOldest => delivered += 1,
                    PushOutcome::Closed => dead.push(*id),
                }
            }
        }

        for id in dead {
            tracing::warn!(connection = id, "dropping unhealthy subscriber");
            self.unsubscribe(id).await;
        }

        delivered
    }
}

/// Staging key: one slot per kind of state, so a newer event overwrites an
/// older one instead of queueing behind it.
fn pending_key(event: &PushEvent) -> String {
    match event {
        PushEvent::MarketUpdate(s) => format!("market:{}", s.symbol),
        PushEvent::OpenInterestUpdate(s) => format!("oi:{}", s.symbol),
        PushEvent::OpenInterestAlert(a) => format!("oi-alert:{}:{:?}", a.symbol, a.direction),
        PushEvent::AlertTriggered(TriggeredPayload::Spike(s)) => {
            format!("spike:{}:{:?}", s.symbol, s.alert_type)
        }
        PushEvent::AlertTriggered(TriggeredPayload::User(u)) => {
            format!("user:{}", u.alert_id)
        }
    }
}
