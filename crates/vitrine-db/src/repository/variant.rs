//! # Variant Repository
//!
//! Variants and their single stock row.
//!
//! ## Stock Mutation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  set_quantity / adjust_quantity / set_low_stock_threshold              │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    ├── read live stock row             (quantity, threshold, status)   │
//! │    ├── derive StockStatus              (vitrine-core::stock)           │
//! │    ├── UPDATE stocks SET quantity, threshold, status   (one statement) │
//! │    └── outbox: VariantStockChanged     (only if quantity/status moved) │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Combo availability is not pushed from here. Callers that care react to
//! `VariantStockChanged` and call [`VariantRepository::recompute_combo_status`].

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use vitrine_core::events::stock_change_events;
use vitrine_core::input::{NewVariant, VariantUpdate};
use vitrine_core::stock::{aggregate_combo_status, ComboLineStock};
use vitrine_core::validation::validate_non_negative;
use vitrine_core::{
    Combo, Committed, DomainEvent, Stock, StockStatus, TenantContext, ValidationError, Variant,
};

use crate::cascade::{Cascade, CascadeReport};
use crate::error::{DbError, DbResult};
use crate::identifier::{next_free_sku, should_retry, SkuScope};
use crate::pool::CatalogPolicy;
use crate::repository::item::fetch_combo;
use crate::repository::outbox::enqueue;
use crate::repository::{begin, commit, ensure_live, ensure_live_opt, new_id, now};

const VARIANT_COLUMNS: &str = "id, tenant_id, product_id, variant_name, sku, regular_price_cents, \
                               sale_price_cents, barcode, unit_id, weight, image_path, is_active, \
                               expire_date, manufacture_date, created_at, updated_at, deleted_at";

const STOCK_COLUMNS: &str = "id, tenant_id, variant_id, product_id, quantity, low_stock_threshold, \
                             status, created_at, updated_at, deleted_at";

/// A variant together with its stock row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockedVariant {
    pub variant: Variant,
    pub stock: Stock,
}

async fn fetch_variant(conn: &mut SqliteConnection, tenant_id: &str, id: &str) -> DbResult<Variant> {
    let sql = format!(
        "SELECT {} FROM variants WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        VARIANT_COLUMNS
    );
    sqlx::query_as::<_, Variant>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", id))
}

async fn fetch_stock(conn: &mut SqliteConnection, tenant_id: &str, variant_id: &str) -> DbResult<Stock> {
    let sql = format!(
        "SELECT {} FROM stocks WHERE variant_id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        STOCK_COLUMNS
    );
    sqlx::query_as::<_, Stock>(&sql)
        .bind(variant_id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Stock", variant_id))
}

/// Repository for variants, stock and combo availability.
#[derive(Debug, Clone)]
pub struct VariantRepository {
    pool: SqlitePool,
    policy: CatalogPolicy,
}

impl VariantRepository {
    pub fn new(pool: SqlitePool, policy: CatalogPolicy) -> Self {
        VariantRepository { pool, policy }
    }

    /// Creates a variant and its stock row in one transaction.
    pub async fn add_variant(
        &self,
        ctx: &TenantContext,
        product_id: &str,
        input: NewVariant,
    ) -> DbResult<Committed<StockedVariant>> {
        input.validate()?;
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        ensure_live(&mut tx, "products", "Product", tenant_id, product_id).await?;
        ensure_live_opt(&mut tx, "units", "Unit", tenant_id, input.unit_id.as_deref()).await?;

        let now = now();
        let mut variant = Variant {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            product_id: product_id.to_string(),
            variant_name: input.variant_name.trim().to_string(),
            sku: input.sku.clone().unwrap_or_default(),
            regular_price_cents: input.regular_price_cents,
            sale_price_cents: input.sale_price_cents,
            barcode: input.barcode,
            unit_id: input.unit_id,
            weight: input.weight,
            image_path: input.image_path,
            is_active: input.is_active,
            expire_date: input.expire_date,
            manufacture_date: input.manufacture_date,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let generated = input.sku.is_none();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if generated {
                variant.sku = next_free_sku(&mut tx, SkuScope::Variants, &variant.variant_name).await?;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO variants (
                    id, tenant_id, product_id, variant_name, sku, regular_price_cents,
                    sale_price_cents, barcode, unit_id, weight, image_path, is_active,
                    expire_date, manufacture_date, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
                "#,
            )
            .bind(&variant.id)
            .bind(&variant.tenant_id)
            .bind(&variant.product_id)
            .bind(&variant.variant_name)
            .bind(&variant.sku)
            .bind(variant.regular_price_cents)
            .bind(variant.sale_price_cents)
            .bind(&variant.barcode)
            .bind(&variant.unit_id)
            .bind(variant.weight)
            .bind(&variant.image_path)
            .bind(variant.is_active)
            .bind(variant.expire_date)
            .bind(variant.manufacture_date)
            .bind(now)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => break,
                Err(e) => {
                    let err = DbError::from(e);
                    if !generated || !should_retry(&err, "sku", attempt, self.policy.id_max_attempts) {
                        return Err(err);
                    }
                }
            }
        }

        let threshold = input
            .low_stock_threshold
            .unwrap_or(self.policy.default_low_stock_threshold);
        let stock = Stock {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            variant_id: variant.id.clone(),
            product_id: product_id.to_string(),
            quantity: input.initial_quantity,
            low_stock_threshold: threshold,
            status: StockStatus::derive(input.initial_quantity, threshold),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO stocks (
                id, tenant_id, variant_id, product_id, quantity, low_stock_threshold, status,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&stock.id)
        .bind(&stock.tenant_id)
        .bind(&stock.variant_id)
        .bind(&stock.product_id)
        .bind(stock.quantity)
        .bind(stock.low_stock_threshold)
        .bind(stock.status)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // a fresh row counts as moving from an empty shelf
        let events = stock_change_events(
            tenant_id,
            &variant.id,
            (0, StockStatus::StockOut),
            (stock.quantity, stock.status),
        );
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        debug!(
            tenant_id = %tenant_id,
            variant_id = %variant.id,
            sku = %variant.sku,
            quantity = stock.quantity,
            "Variant created"
        );
        Ok(Committed::new(StockedVariant { variant, stock }, events))
    }

    pub async fn update_variant(
        &self,
        ctx: &TenantContext,
        id: &str,
        input: VariantUpdate,
    ) -> DbResult<Variant> {
        input.validate()?;
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        let mut variant = fetch_variant(&mut tx, tenant_id, id).await?;

        if let Some(Some(unit_id)) = &input.unit_id {
            ensure_live(&mut tx, "units", "Unit", tenant_id, unit_id).await?;
        }

        if let Some(name) = input.variant_name {
            variant.variant_name = name.trim().to_string();
        }
        if let Some(sku) = input.sku {
            variant.sku = sku;
        }
        if let Some(price) = input.regular_price_cents {
            variant.regular_price_cents = price;
        }
        if let Some(price) = input.sale_price_cents {
            variant.sale_price_cents = price;
        }
        if let Some(barcode) = input.barcode {
            variant.barcode = barcode;
        }
        if let Some(unit_id) = input.unit_id {
            variant.unit_id = unit_id;
        }
        if let Some(weight) = input.weight {
            variant.weight = weight;
        }
        if let Some(image_path) = input.image_path {
            variant.image_path = image_path;
        }
        if let Some(is_active) = input.is_active {
            variant.is_active = is_active;
        }
        if let Some(expire_date) = input.expire_date {
            variant.expire_date = expire_date;
        }
        if let Some(manufacture_date) = input.manufacture_date {
            variant.manufacture_date = manufacture_date;
        }
        if let (Some(made), Some(expires)) = (variant.manufacture_date, variant.expire_date) {
            if made > expires {
                return Err(ValidationError::InvalidRange {
                    start: "manufacture_date".to_string(),
                    end: "expire_date".to_string(),
                }
                .into());
            }
        }
        variant.updated_at = now();

        sqlx::query(
            r#"
            UPDATE variants
            SET variant_name = ?3, sku = ?4, regular_price_cents = ?5, sale_price_cents = ?6,
                barcode = ?7, unit_id = ?8, weight = ?9, image_path = ?10, is_active = ?11,
                expire_date = ?12, manufacture_date = ?13, updated_at = ?14
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(&variant.variant_name)
        .bind(&variant.sku)
        .bind(variant.regular_price_cents)
        .bind(variant.sale_price_cents)
        .bind(&variant.barcode)
        .bind(&variant.unit_id)
        .bind(variant.weight)
        .bind(&variant.image_path)
        .bind(variant.is_active)
        .bind(variant.expire_date)
        .bind(variant.manufacture_date)
        .bind(variant.updated_at)
        .execute(&mut *tx)
        .await?;
        commit(tx).await?;

        Ok(variant)
    }

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> DbResult<Variant> {
        let mut conn = self.pool.acquire().await?;
        fetch_variant(&mut conn, ctx.tenant_id(), id).await
    }

    pub async fn list_for_product(&self, ctx: &TenantContext, product_id: &str) -> DbResult<Vec<Variant>> {
        let sql = format!(
            "SELECT {} FROM variants WHERE product_id = ?1 AND tenant_id = ?2 \
             AND deleted_at IS NULL ORDER BY created_at, rowid",
            VARIANT_COLUMNS
        );
        let variants = sqlx::query_as::<_, Variant>(&sql)
            .bind(product_id)
            .bind(ctx.tenant_id())
            .fetch_all(&self.pool)
            .await?;
        Ok(variants)
    }

    pub async fn stock_for(&self, ctx: &TenantContext, variant_id: &str) -> DbResult<Stock> {
        let mut conn = self.pool.acquire().await?;
        fetch_stock(&mut conn, ctx.tenant_id(), variant_id).await
    }

    // =========================================================================
    // Stock Mutations
    // =========================================================================

    /// Rewrites quantity and threshold together with the derived status.
    async fn write_stock(
        &self,
        ctx: &TenantContext,
        variant_id: &str,
        next: impl FnOnce(&Stock) -> DbResult<(i64, i64)>,
    ) -> DbResult<Committed<Stock>> {
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        let before = fetch_stock(&mut tx, tenant_id, variant_id).await?;

        let (quantity, threshold) = next(&before)?;
        let mut stock = before.clone();
        stock.quantity = quantity;
        stock.low_stock_threshold = threshold;
        stock.status = StockStatus::derive(quantity, threshold);
        stock.updated_at = now();

        sqlx::query(
            "UPDATE stocks SET quantity = ?3, low_stock_threshold = ?4, status = ?5, updated_at = ?6 \
             WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(&stock.id)
        .bind(tenant_id)
        .bind(stock.quantity)
        .bind(stock.low_stock_threshold)
        .bind(stock.status)
        .bind(stock.updated_at)
        .execute(&mut *tx)
        .await?;

        let events = stock_change_events(
            tenant_id,
            variant_id,
            (before.quantity, before.status),
            (stock.quantity, stock.status),
        );
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        debug!(
            tenant_id = %tenant_id,
            variant_id = %variant_id,
            quantity = stock.quantity,
            status = %stock.status,
            "Stock written"
        );
        Ok(Committed::new(stock, events))
    }

    pub async fn set_quantity(
        &self,
        ctx: &TenantContext,
        variant_id: &str,
        quantity: i64,
    ) -> DbResult<Committed<Stock>> {
        validate_non_negative("quantity", quantity)?;
        self.write_stock(ctx, variant_id, |stock| Ok((quantity, stock.low_stock_threshold)))
            .await
    }

    /// Applies a signed delta. The result must stay non-negative.
    pub async fn adjust_quantity(
        &self,
        ctx: &TenantContext,
        variant_id: &str,
        delta: i64,
    ) -> DbResult<Committed<Stock>> {
        self.write_stock(ctx, variant_id, |stock| {
            let quantity = stock.quantity.saturating_add(delta);
            if quantity < 0 {
                return Err(ValidationError::Negative {
                    field: "quantity".to_string(),
                }
                .into());
            }
            Ok((quantity, stock.low_stock_threshold))
        })
        .await
    }

    pub async fn set_low_stock_threshold(
        &self,
        ctx: &TenantContext,
        variant_id: &str,
        threshold: i64,
    ) -> DbResult<Committed<Stock>> {
        validate_non_negative("low_stock_threshold", threshold)?;
        self.write_stock(ctx, variant_id, |stock| Ok((stock.quantity, threshold)))
            .await
    }

    /// Tombstones the variant with its stock, attributes and media.
    pub async fn delete_variant(&self, ctx: &TenantContext, id: &str) -> DbResult<CascadeReport> {
        let mut tx = begin(&self.pool).await?;
        ensure_live(&mut tx, "variants", "Variant", ctx.tenant_id(), id).await?;

        let mut cascade = Cascade::new(ctx.tenant_id(), format!("variant {}", id));
        cascade.variant(&mut tx, id).await?;
        let report = cascade.finish();
        commit(tx).await?;

        info!(tenant_id = %ctx.tenant_id(), variant_id = %id, "Variant deleted");
        Ok(report)
    }

    // =========================================================================
    // Combo Availability
    // =========================================================================

    /// Recomputes and stores a combo's aggregate stock status.
    ///
    /// Every live line counts, whether or not it is flagged active. A line
    /// whose variant has no live stock row is treated as out of stock.
    pub async fn recompute_combo_status(
        &self,
        ctx: &TenantContext,
        combo_id: &str,
    ) -> DbResult<Committed<Combo>> {
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        let mut combo = fetch_combo(&mut tx, tenant_id, combo_id).await?;

        let rows: Vec<(i64, Option<i64>, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT cp.quantity, s.quantity, s.low_stock_threshold
            FROM combo_products cp
            LEFT JOIN stocks s
                ON s.variant_id = cp.variant_id
               AND s.tenant_id = cp.tenant_id
               AND s.deleted_at IS NULL
            WHERE cp.combo_id = ?1 AND cp.tenant_id = ?2
              AND cp.deleted_at IS NULL
            ORDER BY cp.created_at, cp.rowid
            "#,
        )
        .bind(combo_id)
        .bind(tenant_id)
        .fetch_all(&mut *tx)
        .await?;

        let lines: Vec<ComboLineStock> = rows
            .into_iter()
            .map(|(required, quantity, threshold)| {
                ComboLineStock::new(required, quantity.zip(threshold))
            })
            .collect();
        let status = aggregate_combo_status(&lines);

        if status == combo.stock_status {
            commit(tx).await?;
            return Ok(Committed::quiet(combo));
        }

        let from = combo.stock_status;
        combo.stock_status = status;
        combo.updated_at = now();
        sqlx::query("UPDATE combos SET stock_status = ?3, updated_at = ?4 WHERE id = ?1 AND tenant_id = ?2")
            .bind(combo_id)
            .bind(tenant_id)
            .bind(status)
            .bind(combo.updated_at)
            .execute(&mut *tx)
            .await?;

        let events = vec![DomainEvent::ComboStockStatusChanged {
            tenant_id: tenant_id.to_string(),
            combo_id: combo_id.to_string(),
            from,
            to: status,
        }];
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        info!(combo_id = %combo_id, from = %from, to = %status, "Combo stock status changed");
        Ok(Committed::new(combo, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::NaiveDate;
    use vitrine_core::input::{ItemFields, NewCombo, NewComboLine, NewProduct, NewTenant};
    use vitrine_core::{ComboStockStatus, CoreError};

    async fn setup() -> (Database, TenantContext, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create(NewTenant {
                name: "Acme".into(),
                owner_name: "Owner".into(),
                owner_email: "owner@acme.io".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .value;
        let ctx = db.tenants().context_for(&tenant.id).await.unwrap();
        let product = db
            .items()
            .create_product(&ctx, NewProduct::named("Mug"))
            .await
            .unwrap()
            .value;
        let product_id = product.specialization.id().to_string();
        (db, ctx, product_id)
    }

    async fn combo_of(db: &Database, ctx: &TenantContext, lines: &[(&str, &str, i64)]) -> String {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let combo = db
            .items()
            .create_combo(
                ctx,
                NewCombo {
                    item: ItemFields::named("Bundle"),
                    category_id: None,
                    regular_price_cents: None,
                    offered_price_cents: 1000,
                    start_date: d,
                    end_date: d,
                },
            )
            .await
            .unwrap()
            .value;
        let combo_id = combo.specialization.id().to_string();
        for (product_id, variant_id, qty) in lines {
            db.items()
                .add_combo_line(ctx, &combo_id, NewComboLine::new(*product_id, *variant_id, *qty))
                .await
                .unwrap();
        }
        combo_id
    }

    #[tokio::test]
    async fn test_add_variant_creates_stock() {
        let (db, ctx, product_id) = setup().await;
        let created = db
            .variants()
            .add_variant(&ctx, &product_id, NewVariant::new("Blue", 900, 3))
            .await
            .unwrap();
        let stocked = created.value;
        assert!(stocked.variant.sku.starts_with("BLU-"));
        assert_eq!(stocked.stock.low_stock_threshold, 5);
        assert_eq!(stocked.stock.status, StockStatus::LowStock);
        assert_eq!(created.events.len(), 1);

        let stored = db.variants().stock_for(&ctx, &stocked.variant.id).await.unwrap();
        assert_eq!(stored.quantity, 3);
    }

    #[tokio::test]
    async fn test_stock_status_follows_quantity() {
        let (db, ctx, product_id) = setup().await;
        let variant = db
            .variants()
            .add_variant(&ctx, &product_id, NewVariant::new("Blue", 900, 10))
            .await
            .unwrap()
            .value
            .variant;

        for (quantity, expected) in [
            (0, StockStatus::StockOut),
            (3, StockStatus::LowStock),
            (10, StockStatus::Available),
        ] {
            let stock = db
                .variants()
                .set_quantity(&ctx, &variant.id, quantity)
                .await
                .unwrap()
                .value;
            assert_eq!(stock.status, expected);
        }

        let unchanged = db.variants().set_quantity(&ctx, &variant.id, 10).await.unwrap();
        assert!(unchanged.events.is_empty());

        let raised = db
            .variants()
            .set_low_stock_threshold(&ctx, &variant.id, 10)
            .await
            .unwrap();
        assert_eq!(raised.value.status, StockStatus::LowStock);
        assert!(matches!(
            raised.events[0],
            DomainEvent::VariantStockChanged { status: StockStatus::LowStock, .. }
        ));
    }

    #[tokio::test]
    async fn test_adjust_below_zero_rejected() {
        let (db, ctx, product_id) = setup().await;
        let variant = db
            .variants()
            .add_variant(&ctx, &product_id, NewVariant::new("Blue", 900, 2))
            .await
            .unwrap()
            .value
            .variant;

        let err = db.variants().adjust_quantity(&ctx, &variant.id, -3).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::Validation(ValidationError::Negative { .. }))
        ));
        let stock = db.variants().adjust_quantity(&ctx, &variant.id, -2).await.unwrap().value;
        assert_eq!(stock.quantity, 0);
        assert_eq!(stock.status, StockStatus::StockOut);
    }

    #[tokio::test]
    async fn test_combo_status_aggregation() {
        let (db, ctx, product_id) = setup().await;
        let add = |name: &'static str, qty: i64| {
            let db = db.clone();
            let ctx = ctx.clone();
            let product_id = product_id.clone();
            async move {
                db.variants()
                    .add_variant(&ctx, &product_id, NewVariant::new(name, 100, qty))
                    .await
                    .unwrap()
                    .value
                    .variant
                    .id
            }
        };
        let one = add("One", 1).await;
        let two = add("Two", 2).await;
        let twenty = add("Twenty", 20).await;

        let short = combo_of(&db, &ctx, &[(product_id.as_str(), one.as_str(), 2)]).await;
        let low = combo_of(&db, &ctx, &[(product_id.as_str(), two.as_str(), 1)]).await;
        let plenty = combo_of(&db, &ctx, &[(product_id.as_str(), twenty.as_str(), 1)]).await;
        let empty = combo_of(&db, &ctx, &[]).await;

        let recompute = |id: String| {
            let db = db.clone();
            let ctx = ctx.clone();
            async move { db.variants().recompute_combo_status(&ctx, &id).await.unwrap() }
        };

        let changed = recompute(short).await;
        assert_eq!(changed.value.stock_status, ComboStockStatus::OutOfStock);
        assert!(matches!(
            changed.events[0],
            DomainEvent::ComboStockStatusChanged { to: ComboStockStatus::OutOfStock, .. }
        ));
        assert_eq!(recompute(low).await.value.stock_status, ComboStockStatus::LowStock);

        let unchanged = recompute(plenty).await;
        assert_eq!(unchanged.value.stock_status, ComboStockStatus::Available);
        assert!(unchanged.events.is_empty());
        assert_eq!(recompute(empty).await.value.stock_status, ComboStockStatus::Available);
    }

    #[tokio::test]
    async fn test_deleted_variant_makes_combo_out_of_stock() {
        let (db, ctx, product_id) = setup().await;
        let variant = db
            .variants()
            .add_variant(&ctx, &product_id, NewVariant::new("Blue", 900, 50))
            .await
            .unwrap()
            .value
            .variant;
        let combo_id = combo_of(&db, &ctx, &[(product_id.as_str(), variant.id.as_str(), 1)]).await;

        let report = db.variants().delete_variant(&ctx, &variant.id).await.unwrap();
        assert_eq!(report.tombstoned("stocks"), 1);

        let combo = db.variants().recompute_combo_status(&ctx, &combo_id).await.unwrap().value;
        assert_eq!(combo.stock_status, ComboStockStatus::OutOfStock);
    }

    #[tokio::test]
    async fn test_inactive_line_still_counts_toward_combo_status() {
        let (db, ctx, product_id) = setup().await;
        let variants = db.variants();
        let plenty = variants
            .add_variant(&ctx, &product_id, NewVariant::new("Plenty", 100, 50))
            .await
            .unwrap()
            .value
            .variant;
        let empty = variants
            .add_variant(&ctx, &product_id, NewVariant::new("Empty", 100, 0))
            .await
            .unwrap()
            .value
            .variant;
        let combo_id = combo_of(&db, &ctx, &[(product_id.as_str(), plenty.id.as_str(), 1)]).await;

        let mut inactive = NewComboLine::new(product_id.as_str(), empty.id.as_str(), 2);
        inactive.is_active = false;
        let line = db.items().add_combo_line(&ctx, &combo_id, inactive).await.unwrap();
        assert!(!line.is_active);

        let combo = variants.recompute_combo_status(&ctx, &combo_id).await.unwrap().value;
        assert_eq!(combo.stock_status, ComboStockStatus::OutOfStock);
    }

    #[tokio::test]
    async fn test_update_variant_checks_dates() {
        let (db, ctx, product_id) = setup().await;
        let variant = db
            .variants()
            .add_variant(&ctx, &product_id, NewVariant::new("Blue", 900, 1))
            .await
            .unwrap()
            .value
            .variant;

        let updated = db
            .variants()
            .update_variant(
                &ctx,
                &variant.id,
                VariantUpdate {
                    sale_price_cents: Some(Some(700)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.effective_price().cents(), 700);

        let err = db
            .variants()
            .update_variant(
                &ctx,
                &variant.id,
                VariantUpdate {
                    manufacture_date: Some(NaiveDate::from_ymd_opt(2025, 1, 1)),
                    expire_date: Some(NaiveDate::from_ymd_opt(2024, 1, 1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }
}
