//! # Event Outbox Repository
//!
//! Durable queue of domain events awaiting delivery.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  CATALOG WRITE (e.g., adjust_quantity)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE stocks SET quantity = ?, status = ? WHERE id = ?    │   │
//! │  │                                                                 │   │
//! │  │  2. INSERT INTO event_outbox (event_type, aggregate_id, payload)│   │
//! │  │     VALUES ('variant_stock_changed', ?, <event JSON>)          │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            NOTIFICATION WORKER (outside this crate)             │   │
//! │  │                                                                 │   │
//! │  │  pending(n) → deliver → mark_delivered / mark_failed            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use vitrine_core::DomainEvent;

use crate::error::DbResult;
use crate::repository::{new_id, now};

/// One queued event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OutboxEntry {
    pub id: String,
    pub tenant_id: Option<String>,
    pub event_type: String,
    pub aggregate_id: String,
    /// JSON of the [`DomainEvent`].
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn event(&self) -> DbResult<DomainEvent> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Queues `events` on the caller's transaction.
pub(crate) async fn enqueue(conn: &mut SqliteConnection, events: &[DomainEvent]) -> DbResult<()> {
    let created_at = now();
    for event in events {
        let payload = serde_json::to_string(event)?;
        debug!(event_type = event.event_type(), aggregate_id = event.aggregate_id(), "Queuing event");

        sqlx::query(
            r#"
            INSERT INTO event_outbox (
                id, tenant_id, event_type, aggregate_id, payload, attempts, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            "#,
        )
        .bind(new_id())
        .bind(event.tenant_id())
        .bind(event.event_type())
        .bind(event.aggregate_id())
        .bind(payload)
        .bind(created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

const OUTBOX_COLUMNS: &str = "id, tenant_id, event_type, aggregate_id, payload, attempts, \
                              last_error, created_at, attempted_at, delivered_at";

/// Repository for event outbox operations.
#[derive(Debug, Clone)]
pub struct EventOutboxRepository {
    pool: SqlitePool,
}

impl EventOutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        EventOutboxRepository { pool }
    }

    /// Undelivered entries, oldest first.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let sql = format!(
            "SELECT {} FROM event_outbox WHERE delivered_at IS NULL \
             ORDER BY created_at ASC, rowid ASC LIMIT ?1",
            OUTBOX_COLUMNS
        );
        let entries = sqlx::query_as::<_, OutboxEntry>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Undelivered entries for one tenant, oldest first.
    pub async fn pending_for_tenant(&self, tenant_id: &str, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let sql = format!(
            "SELECT {} FROM event_outbox WHERE delivered_at IS NULL AND tenant_id = ?1 \
             ORDER BY created_at ASC, rowid ASC LIMIT ?2",
            OUTBOX_COLUMNS
        );
        let entries = sqlx::query_as::<_, OutboxEntry>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    pub async fn mark_delivered(&self, id: &str) -> DbResult<()> {
        let now = now();
        sqlx::query(
            "UPDATE event_outbox SET delivered_at = ?2, attempted_at = ?2, \
             attempts = attempts + 1 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE event_outbox SET attempts = attempts + 1, last_error = ?2, \
             attempted_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(error)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM event_outbox WHERE delivered_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Deletes entries delivered more than `days_old` days ago.
    pub async fn cleanup_delivered(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = now() - chrono::Duration::days(i64::from(days_old));
        let result = sqlx::query(
            "DELETE FROM event_outbox WHERE delivered_at IS NOT NULL AND delivered_at < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_enqueue_and_deliver() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let events = vec![
            DomainEvent::ItemDeleted {
                tenant_id: "t1".into(),
                item_id: "i1".into(),
            },
            DomainEvent::ProfileUpdated {
                user_id: "u1".into(),
                tenant_id: None,
            },
        ];
        {
            let mut conn = db.pool().acquire().await.unwrap();
            enqueue(&mut conn, &events).await.unwrap();
        }

        let outbox = db.outbox();
        assert_eq!(outbox.count_pending().await.unwrap(), 2);

        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending[0].event_type, "item_deleted");
        assert_eq!(pending[0].tenant_id.as_deref(), Some("t1"));
        assert_eq!(pending[0].event().unwrap(), events[0]);
        assert_eq!(outbox.pending_for_tenant("t1", 10).await.unwrap().len(), 1);

        outbox.mark_failed(&pending[1].id, "smtp down").await.unwrap();
        outbox.mark_delivered(&pending[0].id).await.unwrap();

        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("smtp down"));
        assert_eq!(outbox.cleanup_delivered(1).await.unwrap(), 0);
    }
}
