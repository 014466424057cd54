//! # Cascade Deletes
//!
//! Soft-delete fan-out over the fixed ownership graph.
//!
//! ## Graph
//! ```text
//! Tenant ──► subscriptions, domains, user_details, users
//!        ──► every live Item (item cascade below)
//!        ──► categories, brands, units
//!        ──► tenant row
//!
//! Item ──► item attributes
//!      ├─► Product ──► stocks (variant + product)
//!      │            ──► variant attributes, variant media
//!      │            ──► variants
//!      │            ──► product attributes, product media
//!      │            ──► product row
//!      ├─► Combo   ──► combo lines, combo media, combo row
//!      └─► item row
//!
//! Variant  ──► stock, variant attributes, variant media, variant row
//! Brand    ──► products.brand_id = NULL, brand row
//! Unit     ──► products.unit_id / variants.unit_id = NULL, unit row
//! Category ──► children.parent_id = NULL,
//!              products.{category,subcategory,sub_subcategory}_id = NULL,
//!              combos.category_id = NULL, category row
//! ```
//!
//! Every step runs on the caller's transaction and touches live rows only,
//! so cascading into an existing tombstone is a no-op. A failing step turns
//! into [`DbError::CascadeFailure`]; the caller drops the transaction and
//! nothing is persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info};
use vitrine_core::EntityKind;

use crate::error::{DbError, DbResult};
use crate::repository::now;

// =============================================================================
// CascadeReport
// =============================================================================

/// What a successful cascade changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Human-readable root, e.g. `item 9f1c…`.
    pub root: String,
    /// Rows tombstoned per table.
    pub tombstoned: BTreeMap<String, u64>,
    /// References set to NULL per `table.column`.
    pub detached: BTreeMap<String, u64>,
}

impl CascadeReport {
    pub fn new(root: impl Into<String>) -> Self {
        CascadeReport {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn tombstoned(&self, table: &str) -> u64 {
        self.tombstoned.get(table).copied().unwrap_or(0)
    }

    pub fn detached(&self, column: &str) -> u64 {
        self.detached.get(column).copied().unwrap_or(0)
    }

    pub fn total_tombstoned(&self) -> u64 {
        self.tombstoned.values().sum()
    }
}

// =============================================================================
// Cascade
// =============================================================================

/// One cascade run inside a transaction.
pub(crate) struct Cascade {
    tenant_id: String,
    at: DateTime<Utc>,
    report: CascadeReport,
}

impl Cascade {
    pub(crate) fn new(tenant_id: &str, root: impl Into<String>) -> Self {
        Cascade {
            tenant_id: tenant_id.to_string(),
            at: now(),
            report: CascadeReport::new(root),
        }
    }

    pub(crate) fn finish(self) -> CascadeReport {
        info!(
            root = %self.report.root,
            tombstoned = self.report.total_tombstoned(),
            "Cascade complete"
        );
        self.report
    }

    /// Runs one statement. `?1` is the cascade timestamp, `binds` follow.
    async fn exec(
        &self,
        conn: &mut SqliteConnection,
        step: &str,
        sql: &str,
        binds: &[&str],
    ) -> DbResult<u64> {
        let mut query = sqlx::query(sql).bind(self.at);
        for value in binds {
            query = query.bind(value.to_string());
        }
        let result = query
            .execute(&mut *conn)
            .await
            .map_err(|e| DbError::cascade(self.report.root.clone(), step, e))?;

        debug!(root = %self.report.root, step, rows = result.rows_affected(), "Cascade step");
        Ok(result.rows_affected())
    }

    /// Tombstones live tenant rows of `table` matching `filter`.
    ///
    /// `filter` binds `?3` onward from `binds`.
    async fn tombstone(
        &mut self,
        conn: &mut SqliteConnection,
        table: &'static str,
        filter: &str,
        binds: &[&str],
    ) -> DbResult<u64> {
        let sql = format!(
            "UPDATE {} SET deleted_at = ?1, updated_at = ?1 \
             WHERE tenant_id = ?2 AND deleted_at IS NULL AND ({})",
            table, filter
        );
        let mut all = Vec::with_capacity(binds.len() + 1);
        all.push(self.tenant_id.as_str());
        all.extend_from_slice(binds);

        let rows = self.exec(conn, table, &sql, &all).await?;
        *self.report.tombstoned.entry(table.to_string()).or_insert(0) += rows;
        Ok(rows)
    }

    /// Sets `table.column` to NULL on live tenant rows pointing at `id`.
    async fn detach(
        &mut self,
        conn: &mut SqliteConnection,
        table: &'static str,
        column: &'static str,
        id: &str,
    ) -> DbResult<u64> {
        let step = format!("{}.{}", table, column);
        let sql = format!(
            "UPDATE {table} SET {column} = NULL, updated_at = ?1 \
             WHERE tenant_id = ?2 AND deleted_at IS NULL AND {column} = ?3"
        );
        let rows = self
            .exec(conn, &step, &sql, &[self.tenant_id.as_str(), id])
            .await?;
        *self.report.detached.entry(step).or_insert(0) += rows;
        Ok(rows)
    }

    // =========================================================================
    // Roots
    // =========================================================================

    /// Item → attributes → specialization → item row.
    pub(crate) async fn item(&mut self, conn: &mut SqliteConnection, item_id: &str) -> DbResult<()> {
        let itemable: Option<(String, EntityKind)> = sqlx::query_as(
            "SELECT itemable_id, itemable_type FROM items \
             WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        )
        .bind(item_id)
        .bind(self.tenant_id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| DbError::cascade(self.report.root.clone(), "items", e))?;

        let Some((itemable_id, itemable_kind)) = itemable else {
            return Ok(());
        };

        self.tombstone(
            conn,
            "attributes",
            "attributable_type = 'item' AND attributable_id = ?3",
            &[item_id],
        )
        .await?;

        match itemable_kind {
            EntityKind::Product => self.product(conn, &itemable_id).await?,
            EntityKind::Combo => self.combo(conn, &itemable_id).await?,
            other => {
                return Err(DbError::cascade(
                    self.report.root.clone(),
                    "items",
                    format!("item {} has unexpected specialization kind {}", item_id, other),
                ))
            }
        }

        self.tombstone(conn, "items", "id = ?3", &[item_id]).await?;
        Ok(())
    }

    async fn product(&mut self, conn: &mut SqliteConnection, product_id: &str) -> DbResult<()> {
        const LIVE_VARIANTS: &str =
            "SELECT id FROM variants WHERE product_id = ?3 AND deleted_at IS NULL";

        // variant-owned rows go first, while the variants are still live
        self.tombstone(conn, "stocks", "product_id = ?3", &[product_id]).await?;
        self.tombstone(
            conn,
            "attributes",
            &format!("attributable_type = 'variant' AND attributable_id IN ({LIVE_VARIANTS})"),
            &[product_id],
        )
        .await?;
        self.tombstone(
            conn,
            "media",
            &format!("mediable_type = 'variant' AND mediable_id IN ({LIVE_VARIANTS})"),
            &[product_id],
        )
        .await?;
        self.tombstone(conn, "variants", "product_id = ?3", &[product_id]).await?;

        self.tombstone(
            conn,
            "attributes",
            "attributable_type = 'product' AND attributable_id = ?3",
            &[product_id],
        )
        .await?;
        self.tombstone(
            conn,
            "media",
            "mediable_type = 'product' AND mediable_id = ?3",
            &[product_id],
        )
        .await?;
        self.tombstone(conn, "products", "id = ?3", &[product_id]).await?;
        Ok(())
    }

    async fn combo(&mut self, conn: &mut SqliteConnection, combo_id: &str) -> DbResult<()> {
        self.tombstone(conn, "combo_products", "combo_id = ?3", &[combo_id]).await?;
        self.tombstone(
            conn,
            "media",
            "mediable_type = 'combo' AND mediable_id = ?3",
            &[combo_id],
        )
        .await?;
        self.tombstone(conn, "combos", "id = ?3", &[combo_id]).await?;
        Ok(())
    }

    /// Direct variant delete: stock, attributes, media, variant row.
    pub(crate) async fn variant(&mut self, conn: &mut SqliteConnection, variant_id: &str) -> DbResult<()> {
        self.tombstone(conn, "stocks", "variant_id = ?3", &[variant_id]).await?;
        self.tombstone(
            conn,
            "attributes",
            "attributable_type = 'variant' AND attributable_id = ?3",
            &[variant_id],
        )
        .await?;
        self.tombstone(
            conn,
            "media",
            "mediable_type = 'variant' AND mediable_id = ?3",
            &[variant_id],
        )
        .await?;
        self.tombstone(conn, "variants", "id = ?3", &[variant_id]).await?;
        Ok(())
    }

    pub(crate) async fn brand(&mut self, conn: &mut SqliteConnection, brand_id: &str) -> DbResult<()> {
        self.detach(conn, "products", "brand_id", brand_id).await?;
        self.tombstone(conn, "brands", "id = ?3", &[brand_id]).await?;
        Ok(())
    }

    pub(crate) async fn unit(&mut self, conn: &mut SqliteConnection, unit_id: &str) -> DbResult<()> {
        self.detach(conn, "products", "unit_id", unit_id).await?;
        self.detach(conn, "variants", "unit_id", unit_id).await?;
        self.tombstone(conn, "units", "id = ?3", &[unit_id]).await?;
        Ok(())
    }

    pub(crate) async fn category(&mut self, conn: &mut SqliteConnection, category_id: &str) -> DbResult<()> {
        self.detach(conn, "categories", "parent_id", category_id).await?;
        self.detach(conn, "products", "category_id", category_id).await?;
        self.detach(conn, "products", "subcategory_id", category_id).await?;
        self.detach(conn, "products", "sub_subcategory_id", category_id).await?;
        self.detach(conn, "combos", "category_id", category_id).await?;
        self.tombstone(conn, "categories", "id = ?3", &[category_id]).await?;
        Ok(())
    }

    /// Whole-tenant teardown.
    pub(crate) async fn tenant(&mut self, conn: &mut SqliteConnection) -> DbResult<()> {
        for table in ["subscriptions", "domains", "user_details", "users"] {
            self.tombstone(conn, table, "1 = 1", &[]).await?;
        }

        let item_ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM items WHERE tenant_id = ?1 AND deleted_at IS NULL",
        )
        .bind(self.tenant_id.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DbError::cascade(self.report.root.clone(), "items", e))?;

        for item_id in &item_ids {
            self.item(conn, item_id).await?;
        }

        for table in ["categories", "brands", "units"] {
            self.tombstone(conn, table, "1 = 1", &[]).await?;
        }

        let tenant_id = self.tenant_id.clone();
        let rows = self
            .exec(
                conn,
                "tenants",
                "UPDATE tenants SET deleted_at = ?1, updated_at = ?1 \
                 WHERE id = ?2 AND deleted_at IS NULL",
                &[tenant_id.as_str()],
            )
            .await?;
        *self.report.tombstoned.entry("tenants".to_string()).or_insert(0) += rows;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let mut report = CascadeReport::new("item i1");
        report.tombstoned.insert("variants".into(), 2);
        report.tombstoned.insert("stocks".into(), 2);
        report.detached.insert("products.brand_id".into(), 3);

        assert_eq!(report.tombstoned("variants"), 2);
        assert_eq!(report.tombstoned("media"), 0);
        assert_eq!(report.total_tombstoned(), 4);
        assert_eq!(report.detached("products.brand_id"), 3);
    }
}
