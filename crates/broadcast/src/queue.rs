//! Bounded per-connection outbound queue.
//!
//! Alerts are latest-state oriented, not an append-only log, so a full
//! queue evicts its oldest entry instead of blocking the publisher. A
//! connection that keeps evicting is unhealthy and gets closed after a
//! configured streak; a successful enqueue resets the streak.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use volspike_core::Outbound;

/// Result of a push onto a connection queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued without eviction.
    Enqueued,
    /// Enqueued, but the oldest entry was dropped to make room.
    DroppedOldest,
    /// The queue is closed (already, or by this push crossing the
    /// consecutive-eviction limit).
    Closed,
}

#[derive(Debug)]
struct Inner {
    buf: VecDeque<Outbound>,
    consecutive_drops: u32,
    total_drops: u64,
    closed: bool,
}

/// A bounded queue feeding one connection's delivery loop.
///
/// Publishers never block on it: `push` is synchronous and at worst evicts.
/// Only the owning delivery loop waits, in `pop`.
#[derive(Debug)]
pub struct ConnectionQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    max_consecutive_drops: u32,
}

impl ConnectionQueue {
    #[must_use]
    pub fn new(capacity: usize, max_consecutive_drops: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity.max(1)),
                consecutive_drops: 0,
                total_drops: 0,
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
            max_consecutive_drops: max_consecutive_drops.max(1),
        }
    }

    /// Enqueues an item, evicting the oldest entry when full.
    pub fn push(&self, item: Outbound) -> PushOutcome {
        let outcome = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.closed {
                return PushOutcome::Closed;
            }

            if inner.buf.len() >= self.capacity {
                inner.buf.pop_front();
                inner.buf.push_back(item);
                inner.consecutive_drops += 1;
                inner.total_drops += 1;
                if inner.consecutive_drops >= self.max_consecutive_drops {
                    inner.closed = true;
                    tracing::warn!(
                        drops = inner.consecutive_drops,
                        "connection queue overflowing persistently, closing as unhealthy"
                    );
                    PushOutcome::Closed
                } else {
                    PushOutcome::DroppedOldest
                }
            } else {
                inner.consecutive_drops = 0;
                inner.buf.push_back(item);
                PushOutcome::Enqueued
            }
        };

        match outcome {
            PushOutcome::Closed => self.notify.notify_waiters(),
            _ => self.notify.notify_one(),
        }
        outcome
    }

    /// Waits for the next item. Returns `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<Outbound> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(item) = inner.buf.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Closes the queue; pending items remain poppable, new pushes fail.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.closed = true;
        }
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .buf
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total evictions over the queue's lifetime.
    #[must_use]
    pub fn total_drops(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_drops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use volspike_core::{MetricSnapshot, PushEvent, Tier};

    fn item(price: i64) -> Outbound {
        Outbound {
            tier: Tier::Elite,
            event: PushEvent::MarketUpdate(MetricSnapshot {
                symbol: "BTCUSDT".to_string(),
                price: price.into(),
                volume: dec!(0),
                funding_rate: None,
                open_interest: None,
                timestamp: Utc::now(),
            }),
        }
    }

    fn price_of(out: &Outbound) -> i64 {
        match &out.event {
            PushEvent::MarketUpdate(s) => s.price.try_into().unwrap(),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn pop_returns_items_in_order() {
        let queue = ConnectionQueue::new(4, 8);
        queue.push(item(1));
        queue.push(item(2));

        assert_eq!(price_of(&queue.pop().await.unwrap()), 1);
        assert_eq!(price_of(&queue.pop().await.unwrap()), 2);
    }

    #[tokio::test]
    async fn overflow_drops_the_oldest_entry() {
        let queue = ConnectionQueue::new(2, 8);
        assert_eq!(queue.push(item(1)), PushOutcome::Enqueued);
        assert_eq!(queue.push(item(2)), PushOutcome::Enqueued);
        assert_eq!(queue.push(item(3)), PushOutcome::DroppedOldest);

        // 1 was evicted; 2 and 3 remain.
        assert_eq!(price_of(&queue.pop().await.unwrap()), 2);
        assert_eq!(price_of(&queue.pop().await.unwrap()), 3);
        assert_eq!(queue.total_drops(), 1);
    }

    #[test]
    fn consecutive_evictions_close_the_queue() {
        let queue = ConnectionQueue::new(1, 3);
        queue.push(item(0));

        assert_eq!(queue.push(item(1)), PushOutcome::DroppedOldest);
        assert_eq!(queue.push(item(2)), PushOutcome::DroppedOldest);
        assert_eq!(queue.push(item(3)), PushOutcome::Closed);
        assert!(queue.is_closed());
        assert_eq!(queue.push(item(4)), PushOutcome::Closed);
    }

    #[tokio::test]
    async fn successful_enqueue_resets_the_eviction_streak() {
        let queue = ConnectionQueue::new(1, 3);
        queue.push(item(0));
        queue.push(item(1)); // evicts
        queue.push(item(2)); // evicts

        // The consumer catches up.
        queue.pop().await.unwrap();
        assert_eq!(queue.push(item(3)), PushOutcome::Enqueued);

        // The streak restarted; two more evictions do not close it.
        queue.push(item(4));
        assert_eq!(queue.push(item(5)), PushOutcome::DroppedOldest);
        assert!(!queue.is_closed());
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = ConnectionQueue::new(4, 8);
        queue.push(item(1));
        queue.close();

        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
        assert_eq!(queue.push(item(2)), PushOutcome::Closed);
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = std::sync::Arc::new(ConnectionQueue::new(4, 8));
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::task::yield_now().await;
        queue.push(item(7));

        let item = popper.await.unwrap().unwrap();
        assert_eq!(price_of(&item), 7);
    }
}
