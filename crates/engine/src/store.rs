//! Durable store adapter for user alerts.
//!
//! The engine treats the store as the source of truth for which alerts are
//! active at startup; at runtime every state transition (create, update,
//! trigger, reactivate, delete) is written through. Alerts are persisted as
//! JSON documents keyed by id, with the symbol and active flag broken out
//! for querying.

use crate::alerts::UserAlert;
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use uuid::Uuid;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS user_alerts (
    id TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    alert_json TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
";

/// SQLite-backed persistence for user alerts.
#[derive(Clone)]
pub struct AlertStore {
    pool: SqlitePool,
}

impl AlertStore {
    /// Opens (creating if missing) the alert database and ensures the
    /// schema exists.
    ///
    /// # Errors
    /// Returns an error if the connection or schema statement fails.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Inserts or updates an alert record.
    ///
    /// # Errors
    /// Returns an error if serialization or the database operation fails.
    pub async fn upsert(&self, alert: &UserAlert) -> Result<()> {
        let alert_json = serde_json::to_string(alert)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r"
            INSERT INTO user_alerts (id, symbol, is_active, alert_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(id) DO UPDATE SET
                symbol = excluded.symbol,
                is_active = excluded.is_active,
                alert_json = excluded.alert_json,
                updated_at = excluded.updated_at
            ",
        )
        .bind(alert.id.to_string())
        .bind(&alert.symbol)
        .bind(i64::from(alert.is_active))
        .bind(alert_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Loads the alerts that were active when last persisted.
    ///
    /// # Errors
    /// Returns an error if the query or document decoding fails.
    pub async fn load_active(&self) -> Result<Vec<UserAlert>> {
        self.load_where("SELECT alert_json FROM user_alerts WHERE is_active = 1 ORDER BY created_at")
            .await
    }

    /// Loads every persisted alert, active or not.
    ///
    /// # Errors
    /// Returns an error if the query or document decoding fails.
    pub async fn load_all(&self) -> Result<Vec<UserAlert>> {
        self.load_where("SELECT alert_json FROM user_alerts ORDER BY created_at")
            .await
    }

    /// Deletes an alert record.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM user_alerts WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_where(&self, query: &str) -> Result<Vec<UserAlert>> {
        let rows = sqlx::query_as::<_, (String,)>(query)
            .fetch_all(&self.pool)
            .await?;

        let mut alerts = Vec::with_capacity(rows.len());
        for (alert_json,) in rows {
            alerts.push(serde_json::from_str(&alert_json)?);
        }
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use volspike_core::{AlertKind, CrossDirection, DeliveryMethod};

    fn alert(symbol: &str) -> UserAlert {
        UserAlert {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            symbol: symbol.to_string(),
            alert_type: AlertKind::PriceCross,
            threshold: dec!(45000),
            direction: CrossDirection::Any,
            delivery_method: DeliveryMethod::Dashboard,
            is_active: true,
            triggered_at: None,
            triggered_value: None,
            last_checked_value: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_and_load_round_trip() {
        let store = AlertStore::new_in_memory().await.unwrap();
        let alert = alert("BTCUSDT");

        store.upsert(&alert).await.unwrap();
        let loaded = store.load_active().await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], alert);
    }

    #[tokio::test]
    async fn triggered_transition_leaves_active_set() {
        let store = AlertStore::new_in_memory().await.unwrap();
        let mut alert = alert("BTCUSDT");
        store.upsert(&alert).await.unwrap();

        alert.is_active = false;
        alert.triggered_at = Some(Utc::now());
        alert.triggered_value = Some(dec!(46000));
        store.upsert(&alert).await.unwrap();

        assert!(store.load_active().await.unwrap().is_empty());
        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].triggered_value, Some(dec!(46000)));
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = AlertStore::new_in_memory().await.unwrap();
        let alert = alert("ETHUSDT");
        store.upsert(&alert).await.unwrap();

        store.delete(alert.id).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
