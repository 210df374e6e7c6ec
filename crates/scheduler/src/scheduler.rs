//! Wall-clock release gate per subscription tier.
//!
//! Updates are released at fixed clock boundaries (:00/:15/:30/:45 for
//! free, every 5 minutes for pro) rather than on per-connection timers, so
//! two clients of the same tier always see the same values at the same
//! instant no matter when they connected. Elite is ungated.
//!
//! After a pause the gate re-arms for the next *future* boundary; missed
//! boundaries are never replayed, so stale state is not delivered late.

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use volspike_core::Tier;

/// How late a release may fire and still count for its armed boundary.
fn release_grace() -> Duration {
    Duration::seconds(30)
}

/// Next wall-clock release instant for a tier, strictly after `now` for
/// gated tiers. Elite streams continuously, so its next release is `now`.
#[must_use]
pub fn next_release_time(tier: Tier, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(period) = tier.release_period() else {
        return now;
    };
    let period = i64::try_from(period.as_secs()).unwrap_or(300);

    let ts = now.timestamp();
    let next = ts - ts.rem_euclid(period) + period;
    Utc.timestamp_opt(next, 0).single().unwrap_or(now)
}

/// Gate lifecycle: armed at the previous boundary, released at the
/// computed one, then immediately re-armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    Armed,
    Released,
}

/// Per-tier release state machine.
#[derive(Debug)]
pub struct TierGate {
    tier: Tier,
    phase: GatePhase,
    next_release: Option<DateTime<Utc>>,
}

impl TierGate {
    #[must_use]
    pub const fn new(tier: Tier) -> Self {
        Self {
            tier,
            phase: GatePhase::Idle,
            next_release: None,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> GatePhase {
        self.phase
    }

    /// Arms the gate for the next boundary after `now`. Returns the armed
    /// instant, or `None` for an ungated tier.
    pub fn arm(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.tier.release_period()?;
        let target = next_release_time(self.tier, now);
        self.phase = GatePhase::Armed;
        self.next_release = Some(target);
        Some(target)
    }

    /// Attempts to release at `now`.
    ///
    /// Returns the boundary being released when `now` has reached it within
    /// the grace window. A wake-up far past the boundary (process pause)
    /// skips the missed boundary and re-arms for the next future one.
    pub fn try_release(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.phase != GatePhase::Armed {
            return None;
        }
        let target = self.next_release?;
        if now < target {
            return None;
        }

        if now - target > release_grace() {
            let rearmed = next_release_time(self.tier, now);
            tracing::warn!(
                tier = self.tier.as_str(),
                missed = %target,
                rearmed = %rearmed,
                "missed release boundary, skipping ahead"
            );
            self.next_release = Some(rearmed);
            return None;
        }

        self.phase = GatePhase::Released;
        self.next_release = None;
        Some(target)
    }
}

/// Signal that a tier's gate has opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseTick {
    pub tier: Tier,
    pub scheduled_for: DateTime<Utc>,
}

/// Spawns one gate task per gated tier, signalling releases on a channel.
///
/// The tasks only decide *when*; they never touch window or alert state.
pub struct TierScheduler {
    tx: mpsc::Sender<ReleaseTick>,
}

impl TierScheduler {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<ReleaseTick>) -> Self {
        Self { tx }
    }

    /// Spawns the gate tasks and returns their handles.
    #[must_use]
    pub fn spawn(self) -> Vec<JoinHandle<Result<()>>> {
        Tier::ALL
            .iter()
            .filter(|tier| tier.release_period().is_some())
            .map(|tier| {
                let tx = self.tx.clone();
                let tier = *tier;
                tokio::spawn(run_gate(tier, tx))
            })
            .collect()
    }
}

async fn run_gate(tier: Tier, tx: mpsc::Sender<ReleaseTick>) -> Result<()> {
    let mut gate = TierGate::new(tier);
    tracing::info!(tier = tier.as_str(), "tier gate starting");

    loop {
        let Some(target) = gate.arm(Utc::now()) else {
            return Ok(());
        };

        let wait = (target - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        tokio::time::sleep(wait).await;

        if let Some(scheduled_for) = gate.try_release(Utc::now()) {
            tracing::debug!(tier = tier.as_str(), boundary = %scheduled_for, "gate released");
            if tx.send(ReleaseTick { tier, scheduled_for }).await.is_err() {
                tracing::info!(tier = tier.as_str(), "release channel closed, gate stopping");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn free_tier_aligns_to_quarter_hours() {
        // Two subscribers connecting at :07 and :13 share the :15 release.
        assert_eq!(next_release_time(Tier::Free, at(10, 7, 0)), at(10, 15, 0));
        assert_eq!(next_release_time(Tier::Free, at(10, 13, 0)), at(10, 15, 0));
        assert_eq!(next_release_time(Tier::Free, at(10, 46, 30)), at(11, 0, 0));
    }

    #[test]
    fn pro_tier_aligns_to_five_minutes() {
        assert_eq!(next_release_time(Tier::Pro, at(10, 7, 0)), at(10, 10, 0));
        assert_eq!(next_release_time(Tier::Pro, at(10, 59, 59)), at(11, 0, 0));
    }

    #[test]
    fn boundary_itself_maps_to_the_next_boundary() {
        // A release at :15 re-arms for :30, not :15 again.
        assert_eq!(next_release_time(Tier::Free, at(10, 15, 0)), at(10, 30, 0));
        assert_eq!(next_release_time(Tier::Pro, at(10, 5, 0)), at(10, 10, 0));
    }

    #[test]
    fn elite_is_ungated() {
        let now = at(10, 7, 33);
        assert_eq!(next_release_time(Tier::Elite, now), now);
    }

    #[test]
    fn gate_cycles_idle_armed_released() {
        let mut gate = TierGate::new(Tier::Free);
        assert_eq!(gate.phase(), GatePhase::Idle);

        let target = gate.arm(at(10, 7, 0)).unwrap();
        assert_eq!(target, at(10, 15, 0));
        assert_eq!(gate.phase(), GatePhase::Armed);

        // Not yet due.
        assert!(gate.try_release(at(10, 14, 59)).is_none());
        assert_eq!(gate.phase(), GatePhase::Armed);

        // Due: releases the armed boundary.
        assert_eq!(gate.try_release(at(10, 15, 1)), Some(at(10, 15, 0)));
        assert_eq!(gate.phase(), GatePhase::Released);

        // Immediately re-armed for the next boundary.
        assert_eq!(gate.arm(at(10, 15, 1)), Some(at(10, 30, 0)));
    }

    #[test]
    fn missed_boundaries_are_skipped_not_replayed() {
        let mut gate = TierGate::new(Tier::Free);
        gate.arm(at(10, 7, 0));

        // The process slept through 10:15, 10:30 and 10:45.
        assert!(gate.try_release(at(10, 47, 0)).is_none());
        assert_eq!(gate.phase(), GatePhase::Armed);

        // It is now armed for the next future boundary only.
        assert_eq!(gate.try_release(at(11, 0, 2)), Some(at(11, 0, 0)));
    }

    #[test]
    fn elite_gate_never_arms() {
        let mut gate = TierGate::new(Tier::Elite);
        assert!(gate.arm(at(10, 7, 0)).is_none());
        assert_eq!(gate.phase(), GatePhase::Idle);
    }

    #[tokio::test]
    async fn scheduler_spawns_one_task_per_gated_tier() {
        let (tx, _rx) = mpsc::channel(8);
        let handles = TierScheduler::new(tx).spawn();
        assert_eq!(handles.len(), 2);
        for handle in handles {
            handle.abort();
        }
    }
}
