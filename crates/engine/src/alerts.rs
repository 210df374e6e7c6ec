//! User threshold alerts: the book of registered alerts and the crossing
//! evaluation that fires each of them at most once.
//!
//! The book is sharded by symbol: an outer read-mostly map hands out a
//! per-symbol mutex, so snapshot evaluation and a concurrent
//! create/reactivate for the same symbol serialize on a narrow critical
//! section instead of a global lock.

use crate::error::{AlertError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;
use volspike_core::{AlertKind, CrossDirection, DeliveryMethod, MetricSnapshot, TriggeredAlert};

/// Unit a submitted threshold is expressed in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdUnit {
    /// Already in the metric's native unit (USD price, contracts, or a
    /// funding-rate fraction).
    #[default]
    Native,
    /// Percent display form; only meaningful for funding-rate alerts,
    /// where it is normalized to the raw fraction (0.05% → 0.0005).
    Percent,
}

/// A user-registered threshold alert.
///
/// Fires at most once per crossing: triggering flips `is_active` off and
/// only an explicit reactivation makes it evaluable again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAlert {
    pub id: Uuid,
    pub user_id: String,
    pub symbol: String,
    pub alert_type: AlertKind,
    /// Threshold in the metric's native unit (normalized at creation).
    pub threshold: Decimal,
    #[serde(default)]
    pub direction: CrossDirection,
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
    pub is_active: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub triggered_value: Option<Decimal>,
    /// Previous observation used by the crossing rule.
    pub last_checked_value: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Request to register a new alert.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub user_id: String,
    pub symbol: String,
    pub alert_type: AlertKind,
    /// Raw threshold as submitted; parsed and normalized, never coerced.
    pub threshold: String,
    #[serde(default)]
    pub threshold_unit: ThresholdUnit,
    #[serde(default)]
    pub direction: CrossDirection,
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
}

/// Partial update for an existing alert.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAlert {
    pub threshold: Option<String>,
    #[serde(default)]
    pub threshold_unit: ThresholdUnit,
    pub direction: Option<CrossDirection>,
    pub delivery_method: Option<DeliveryMethod>,
}

/// Filter for listing alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Active,
    Inactive,
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown status filter: {other}")),
        }
    }
}

/// Parses and normalizes a submitted threshold into the metric's native
/// unit.
///
/// # Errors
/// Returns [`AlertError::InvalidThreshold`] for unparseable or
/// out-of-range values and [`AlertError::UnitMismatch`] when a percent
/// threshold is submitted for a non-funding alert.
pub fn normalize_threshold(
    kind: AlertKind,
    raw: &str,
    unit: ThresholdUnit,
) -> Result<Decimal> {
    let value = Decimal::from_str(raw.trim())
        .map_err(|e| AlertError::invalid_threshold(raw, e.to_string()))?;

    let normalized = match (unit, kind) {
        (ThresholdUnit::Percent, AlertKind::FundingCross) => value / Decimal::from(100),
        (ThresholdUnit::Percent, kind) => {
            return Err(AlertError::UnitMismatch {
                unit: "percent".to_string(),
                kind,
            })
        }
        (ThresholdUnit::Native, _) => value,
    };

    match kind {
        AlertKind::PriceCross | AlertKind::OiCross if normalized <= Decimal::ZERO => Err(
            AlertError::invalid_threshold(raw, "threshold must be positive"),
        ),
        _ => Ok(normalized),
    }
}

type SymbolShard = Arc<Mutex<Vec<UserAlert>>>;

/// Sharded book of user alerts, keyed by symbol.
#[derive(Default)]
pub struct AlertBook {
    by_symbol: RwLock<HashMap<String, SymbolShard>>,
    index: RwLock<HashMap<Uuid, String>>,
}

impl AlertBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new alert from a request, normalizing its threshold.
    ///
    /// # Errors
    /// Returns a rejection when the threshold is unparseable or its unit
    /// does not apply to the alert kind.
    pub async fn create(&self, request: NewAlert) -> Result<UserAlert> {
        let threshold =
            normalize_threshold(request.alert_type, &request.threshold, request.threshold_unit)?;

        let alert = UserAlert {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            symbol: request.symbol.to_uppercase(),
            alert_type: request.alert_type,
            threshold,
            direction: request.direction,
            delivery_method: request.delivery_method,
            is_active: true,
            triggered_at: None,
            triggered_value: None,
            last_checked_value: None,
            created_at: Utc::now(),
        };

        self.insert(alert.clone()).await;
        Ok(alert)
    }

    /// Inserts a fully formed alert (used when restoring from the store).
    pub async fn insert(&self, alert: UserAlert) {
        let shard = self.shard_for(&alert.symbol).await;
        self.index
            .write()
            .await
            .insert(alert.id, alert.symbol.clone());
        let mut alerts = shard.lock().await;
        alerts.retain(|a| a.id != alert.id);
        alerts.push(alert);
    }

    /// Applies a partial update to an alert.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids and a rejection for invalid
    /// threshold updates.
    pub async fn update(&self, id: Uuid, update: UpdateAlert) -> Result<UserAlert> {
        let shard = self.shard_by_id(id).await?;
        let mut alerts = shard.lock().await;
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(AlertError::NotFound(id))?;

        if let Some(raw) = update.threshold {
            alert.threshold =
                normalize_threshold(alert.alert_type, &raw, update.threshold_unit)?;
            // The crossing rule restarts against the new threshold.
            alert.last_checked_value = None;
        }
        if let Some(direction) = update.direction {
            alert.direction = direction;
        }
        if let Some(delivery) = update.delivery_method {
            alert.delivery_method = delivery;
        }

        Ok(alert.clone())
    }

    /// Removes an alert entirely (an external operation; the engine itself
    /// never deletes).
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids.
    pub async fn remove(&self, id: Uuid) -> Result<UserAlert> {
        let symbol = self
            .index
            .write()
            .await
            .remove(&id)
            .ok_or(AlertError::NotFound(id))?;

        let shard = self.shard_for(&symbol).await;
        let mut alerts = shard.lock().await;
        let position = alerts
            .iter()
            .position(|a| a.id == id)
            .ok_or(AlertError::NotFound(id))?;
        Ok(alerts.remove(position))
    }

    /// Reactivates a triggered alert, clearing its triggered fields.
    /// Reactivating an already-active alert is a no-op.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids.
    pub async fn reactivate(&self, id: Uuid) -> Result<UserAlert> {
        let shard = self.shard_by_id(id).await?;
        let mut alerts = shard.lock().await;
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(AlertError::NotFound(id))?;

        if !alert.is_active {
            alert.is_active = true;
            alert.triggered_at = None;
            alert.triggered_value = None;
            // Re-seed the crossing rule so a stale observation cannot fire
            // the alert on the next tick.
            alert.last_checked_value = None;
        }

        Ok(alert.clone())
    }

    /// Fetches a single alert by id.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids.
    pub async fn get(&self, id: Uuid) -> Result<UserAlert> {
        let shard = self.shard_by_id(id).await?;
        let alerts = shard.lock().await;
        alerts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(AlertError::NotFound(id))
    }

    /// Lists alerts, optionally filtered by active status.
    pub async fn list(&self, status: Option<AlertStatus>) -> Vec<UserAlert> {
        let shards: Vec<SymbolShard> = self.by_symbol.read().await.values().cloned().collect();
        let mut out = Vec::new();
        for shard in shards {
            let alerts = shard.lock().await;
            out.extend(alerts.iter().filter(|a| match status {
                Some(AlertStatus::Active) => a.is_active,
                Some(AlertStatus::Inactive) => !a.is_active,
                None => true,
            }).cloned());
        }
        out.sort_by_key(|a| a.created_at);
        out
    }

    /// Evaluates every active alert for the snapshot's symbol, firing each
    /// crossed alert exactly once and deactivating it.
    pub async fn evaluate(&self, snapshot: &MetricSnapshot) -> Vec<TriggeredAlert> {
        let Some(shard) = self.by_symbol.read().await.get(&snapshot.symbol).cloned() else {
            return Vec::new();
        };

        let mut triggered = Vec::new();
        let mut alerts = shard.lock().await;
        for alert in alerts.iter_mut() {
            if !alert.is_active {
                continue;
            }
            let Some(metric) = metric_for(alert.alert_type, snapshot) else {
                continue;
            };

            let previous = alert.last_checked_value;
            alert.last_checked_value = Some(metric);

            let Some(crossed_up) = crossed(previous, metric, alert.threshold) else {
                continue;
            };
            let allowed = match alert.direction {
                CrossDirection::Any => true,
                CrossDirection::Up => crossed_up,
                CrossDirection::Down => !crossed_up,
            };
            if !allowed {
                continue;
            }

            alert.is_active = false;
            alert.triggered_at = Some(snapshot.timestamp);
            alert.triggered_value = Some(metric);

            tracing::info!(
                alert_id = %alert.id,
                symbol = %alert.symbol,
                kind = alert.alert_type.as_str(),
                crossed_up,
                "user alert triggered"
            );

            triggered.push(TriggeredAlert {
                alert_id: alert.id.to_string(),
                user_id: alert.user_id.clone(),
                symbol: alert.symbol.clone(),
                alert_type: alert.alert_type,
                threshold: alert.threshold,
                value: metric,
                previous_value: previous,
                crossed_up,
                delivery_method: alert.delivery_method,
                timestamp: snapshot.timestamp,
            });
        }

        triggered
    }

    /// Total number of registered alerts.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// True when no alerts are registered.
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    async fn shard_for(&self, symbol: &str) -> SymbolShard {
        if let Some(shard) = self.by_symbol.read().await.get(symbol) {
            return shard.clone();
        }
        self.by_symbol
            .write()
            .await
            .entry(symbol.to_string())
            .or_default()
            .clone()
    }

    async fn shard_by_id(&self, id: Uuid) -> Result<SymbolShard> {
        let symbol = self
            .index
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AlertError::NotFound(id))?;
        Ok(self.shard_for(&symbol).await)
    }
}

/// The live metric an alert kind compares against.
fn metric_for(kind: AlertKind, snapshot: &MetricSnapshot) -> Option<Decimal> {
    match kind {
        AlertKind::PriceCross => Some(snapshot.price),
        AlertKind::FundingCross => snapshot.funding_rate.and_then(Decimal::from_f64),
        AlertKind::OiCross => snapshot.open_interest,
    }
}

/// Crossing rule: `Some(true)` for an upward crossing, `Some(false)` for a
/// downward one, `None` when nothing crossed. The first observation only
/// seeds the rule.
fn crossed(previous: Option<Decimal>, current: Decimal, threshold: Decimal) -> Option<bool> {
    let previous = previous?;
    if previous < threshold && current >= threshold {
        Some(true)
    } else if previous > threshold && current <= threshold {
        Some(false)
    } else {
        None
    }
}
