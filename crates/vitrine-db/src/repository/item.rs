//! # Item Repository
//!
//! Items are the sellable root. Every item has exactly one specialization,
//! a product or a combo, created and tombstoned together with it.
//!
//! ## Create Product Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_product(&ctx, NewProduct)                                       │
//! │                                                                         │
//! │  validate ──► BEGIN                                                     │
//! │                 ├── category / brand / unit must be live in tenant     │
//! │                 ├── INSERT items   (slug probe, retry on UNIQUE slug)   │
//! │                 ├── INSERT products (SKU probe, retry on UNIQUE sku)    │
//! │                 └── outbox: ItemCreated                                 │
//! │               COMMIT ──► Committed<ItemAggregate>                       │
//! │                                                                         │
//! │  any failure ──► transaction dropped ──► neither row exists            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use vitrine_core::input::{ItemFields, ItemUpdate, NewCombo, NewComboLine, NewProduct};
use vitrine_core::validation::validate_date_window;
use vitrine_core::{
    Combo, ComboProduct, ComboStockStatus, Committed, CoreError, DomainEvent, EntityKind, Item,
    ItemAggregate, ItemType, Product, Specialization, TenantContext,
};

use crate::cascade::{Cascade, CascadeReport};
use crate::error::{DbError, DbResult};
use crate::identifier::{next_free_sku, next_free_slug, should_retry, SkuScope, SlugScope};
use crate::pool::CatalogPolicy;
use crate::repository::outbox::enqueue;
use crate::repository::{begin, commit, ensure_live, ensure_live_opt, new_id, now};

const ITEM_COLUMNS: &str = "id, tenant_id, item_type, itemable_id, itemable_type, name, slug, \
                            description, sort_order, is_active, meta_title, meta_description, \
                            meta_keywords, created_by, created_at, updated_at, deleted_at";

pub(crate) const PRODUCT_COLUMNS: &str = "id, tenant_id, item_id, category_id, subcategory_id, \
                                          sub_subcategory_id, brand_id, unit_id, sku, \
                                          shipping_charge, created_at, updated_at, deleted_at";

pub(crate) const COMBO_COLUMNS: &str = "id, tenant_id, item_id, category_id, regular_price_cents, \
                                        offered_price_cents, start_date, end_date, stock_status, \
                                        created_at, updated_at, deleted_at";

pub(crate) const LINE_COLUMNS: &str = "id, tenant_id, combo_id, product_id, variant_id, quantity, \
                                       price_cents, discount_bps, is_active, created_at, \
                                       updated_at, deleted_at";

// =============================================================================
// Row Helpers
// =============================================================================

async fn fetch_item(conn: &mut SqliteConnection, tenant_id: &str, id: &str) -> DbResult<Item> {
    let sql = format!(
        "SELECT {} FROM items WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        ITEM_COLUMNS
    );
    sqlx::query_as::<_, Item>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Item", id))
}

pub(crate) async fn fetch_product(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Product> {
    let sql = format!(
        "SELECT {} FROM products WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        PRODUCT_COLUMNS
    );
    sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
}

pub(crate) async fn fetch_combo(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Combo> {
    let sql = format!(
        "SELECT {} FROM combos WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        COMBO_COLUMNS
    );
    sqlx::query_as::<_, Combo>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Combo", id))
}

async fn load_aggregate(conn: &mut SqliteConnection, item: Item) -> DbResult<ItemAggregate> {
    let specialization = match item.itemable_type {
        EntityKind::Product => {
            Specialization::Product(fetch_product(conn, &item.tenant_id, &item.itemable_id).await?)
        }
        EntityKind::Combo => {
            Specialization::Combo(fetch_combo(conn, &item.tenant_id, &item.itemable_id).await?)
        }
        other => {
            return Err(DbError::Internal(format!(
                "item {} has specialization kind {}",
                item.id, other
            )))
        }
    };
    Ok(ItemAggregate {
        item,
        specialization,
    })
}

/// Inserts the item row, allocating its slug.
async fn insert_item(
    conn: &mut SqliteConnection,
    item: &mut Item,
    max_attempts: u32,
) -> DbResult<()> {
    let mut collided = HashSet::new();
    let mut attempt = 0;
    loop {
        attempt += 1;
        item.slug =
            next_free_slug(conn, SlugScope::Items, &item.tenant_id, &item.name, None, &collided)
                .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO items (
                id, tenant_id, item_type, itemable_id, itemable_type, name, slug, description,
                sort_order, is_active, meta_title, meta_description, meta_keywords, created_by,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
            "#,
        )
        .bind(&item.id)
        .bind(&item.tenant_id)
        .bind(item.item_type)
        .bind(&item.itemable_id)
        .bind(item.itemable_type)
        .bind(&item.name)
        .bind(&item.slug)
        .bind(&item.description)
        .bind(item.sort_order)
        .bind(item.is_active)
        .bind(&item.meta_title)
        .bind(&item.meta_description)
        .bind(&item.meta_keywords)
        .bind(&item.created_by)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await;

        match inserted {
            Ok(_) => return Ok(()),
            Err(e) => {
                let err = DbError::from(e);
                if !should_retry(&err, "slug", attempt, max_attempts) {
                    return Err(err);
                }
                collided.insert(item.slug.clone());
            }
        }
    }
}

fn new_item(ctx: &TenantContext, item_type: ItemType, itemable_id: &str, fields: ItemFields) -> Item {
    let now = now();
    Item {
        id: new_id(),
        tenant_id: ctx.tenant_id().to_string(),
        item_type,
        itemable_id: itemable_id.to_string(),
        itemable_type: item_type.specialization_kind(),
        name: fields.name.trim().to_string(),
        slug: String::new(),
        description: fields.description,
        sort_order: fields.sort_order,
        is_active: fields.is_active,
        meta_title: fields.meta_title,
        meta_description: fields.meta_description,
        meta_keywords: fields.meta_keywords,
        created_by: fields.created_by,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for items, their specializations and combo lines.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
    policy: CatalogPolicy,
}

impl ItemRepository {
    pub fn new(pool: SqlitePool, policy: CatalogPolicy) -> Self {
        ItemRepository { pool, policy }
    }

    /// Creates an item and its product in one transaction.
    pub async fn create_product(
        &self,
        ctx: &TenantContext,
        input: NewProduct,
    ) -> DbResult<Committed<ItemAggregate>> {
        input.validate()?;
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;

        for category in [
            &input.category_id,
            &input.subcategory_id,
            &input.sub_subcategory_id,
        ] {
            ensure_live_opt(&mut tx, "categories", "Category", tenant_id, category.as_deref())
                .await?;
        }
        ensure_live_opt(&mut tx, "brands", "Brand", tenant_id, input.brand_id.as_deref()).await?;
        ensure_live_opt(&mut tx, "units", "Unit", tenant_id, input.unit_id.as_deref()).await?;

        let product_id = new_id();
        let mut item = new_item(ctx, ItemType::Product, &product_id, input.item);
        insert_item(&mut tx, &mut item, self.policy.id_max_attempts).await?;

        let mut product = Product {
            id: product_id,
            tenant_id: tenant_id.to_string(),
            item_id: item.id.clone(),
            category_id: input.category_id,
            subcategory_id: input.subcategory_id,
            sub_subcategory_id: input.sub_subcategory_id,
            brand_id: input.brand_id,
            unit_id: input.unit_id,
            sku: input.sku.clone().unwrap_or_default(),
            shipping_charge: input.shipping_charge,
            created_at: item.created_at,
            updated_at: item.created_at,
            deleted_at: None,
        };

        let generated = input.sku.is_none();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if generated {
                product.sku = next_free_sku(&mut tx, SkuScope::Products, &item.name).await?;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO products (
                    id, tenant_id, item_id, category_id, subcategory_id, sub_subcategory_id,
                    brand_id, unit_id, sku, shipping_charge, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                "#,
            )
            .bind(&product.id)
            .bind(&product.tenant_id)
            .bind(&product.item_id)
            .bind(&product.category_id)
            .bind(&product.subcategory_id)
            .bind(&product.sub_subcategory_id)
            .bind(&product.brand_id)
            .bind(&product.unit_id)
            .bind(&product.sku)
            .bind(product.shipping_charge)
            .bind(product.created_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => break,
                Err(e) => {
                    let err = DbError::from(e);
                    if !generated
                        || !should_retry(&err, "sku", attempt, self.policy.id_max_attempts)
                    {
                        return Err(err);
                    }
                }
            }
        }

        let events = vec![DomainEvent::ItemCreated {
            tenant_id: tenant_id.to_string(),
            item_id: item.id.clone(),
            item_type: ItemType::Product,
        }];
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        info!(tenant_id = %tenant_id, item_id = %item.id, sku = %product.sku, "Product created");
        Ok(Committed::new(
            ItemAggregate {
                item,
                specialization: Specialization::Product(product),
            },
            events,
        ))
    }

    /// Creates an item and its combo. A new combo has no lines, so it
    /// starts `available`.
    pub async fn create_combo(
        &self,
        ctx: &TenantContext,
        input: NewCombo,
    ) -> DbResult<Committed<ItemAggregate>> {
        input.validate()?;
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        ensure_live_opt(&mut tx, "categories", "Category", tenant_id, input.category_id.as_deref())
            .await?;

        let combo_id = new_id();
        let mut item = new_item(ctx, ItemType::Combo, &combo_id, input.item);
        insert_item(&mut tx, &mut item, self.policy.id_max_attempts).await?;

        let combo = Combo {
            id: combo_id,
            tenant_id: tenant_id.to_string(),
            item_id: item.id.clone(),
            category_id: input.category_id,
            regular_price_cents: input.regular_price_cents,
            offered_price_cents: input.offered_price_cents,
            start_date: input.start_date,
            end_date: input.end_date,
            stock_status: ComboStockStatus::Available,
            created_at: item.created_at,
            updated_at: item.created_at,
            deleted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO combos (
                id, tenant_id, item_id, category_id, regular_price_cents, offered_price_cents,
                start_date, end_date, stock_status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
        )
        .bind(&combo.id)
        .bind(&combo.tenant_id)
        .bind(&combo.item_id)
        .bind(&combo.category_id)
        .bind(combo.regular_price_cents)
        .bind(combo.offered_price_cents)
        .bind(combo.start_date)
        .bind(combo.end_date)
        .bind(combo.stock_status)
        .bind(combo.created_at)
        .execute(&mut *tx)
        .await?;

        let events = vec![DomainEvent::ItemCreated {
            tenant_id: tenant_id.to_string(),
            item_id: item.id.clone(),
            item_type: ItemType::Combo,
        }];
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        info!(tenant_id = %tenant_id, item_id = %item.id, "Combo created");
        Ok(Committed::new(
            ItemAggregate {
                item,
                specialization: Specialization::Combo(combo),
            },
            events,
        ))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> DbResult<ItemAggregate> {
        let mut conn = self.pool.acquire().await?;
        let item = fetch_item(&mut conn, ctx.tenant_id(), id).await?;
        load_aggregate(&mut conn, item).await
    }

    pub async fn get_by_slug(&self, ctx: &TenantContext, slug: &str) -> DbResult<Option<ItemAggregate>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM items WHERE slug = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
            ITEM_COLUMNS
        );
        let item = sqlx::query_as::<_, Item>(&sql)
            .bind(slug)
            .bind(ctx.tenant_id())
            .fetch_optional(&mut *conn)
            .await?;

        match item {
            Some(item) => Ok(Some(load_aggregate(&mut conn, item).await?)),
            None => Ok(None),
        }
    }

    /// Live items, optionally of one type, in display order.
    pub async fn list(&self, ctx: &TenantContext, item_type: Option<ItemType>) -> DbResult<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM items WHERE tenant_id = ?1 AND deleted_at IS NULL \
             AND (?2 IS NULL OR item_type = ?2) ORDER BY sort_order, name",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, Item>(&sql)
            .bind(ctx.tenant_id())
            .bind(item_type)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    pub async fn product(&self, ctx: &TenantContext, product_id: &str) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, ctx.tenant_id(), product_id).await
    }

    pub async fn combo(&self, ctx: &TenantContext, combo_id: &str) -> DbResult<Combo> {
        let mut conn = self.pool.acquire().await?;
        fetch_combo(&mut conn, ctx.tenant_id(), combo_id).await
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Updates an item and its specialization. Re-typing is rejected.
    pub async fn update(
        &self,
        ctx: &TenantContext,
        id: &str,
        input: ItemUpdate,
    ) -> DbResult<ItemAggregate> {
        input.validate()?;
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        let before = fetch_item(&mut tx, tenant_id, id).await?;

        if let Some(requested) = input.item_type {
            if requested != before.item_type {
                return Err(CoreError::invalid_transition(
                    "item",
                    format!(
                        "{} cannot change type from {} to {}",
                        id,
                        before.item_type.as_str(),
                        requested.as_str()
                    ),
                )
                .into());
            }
        }
        let mismatched = match before.item_type {
            ItemType::Product => input.combo.is_some(),
            ItemType::Combo => input.product.is_some(),
        };
        if mismatched {
            return Err(CoreError::invalid_transition(
                "item",
                format!("{} is a {}", id, before.item_type.as_str()),
            )
            .into());
        }

        let now = now();
        let mut item = before.clone();
        if let Some(name) = input.name {
            item.name = name.trim().to_string();
        }
        if let Some(description) = input.description {
            item.description = description;
        }
        if let Some(sort_order) = input.sort_order {
            item.sort_order = sort_order;
        }
        if let Some(is_active) = input.is_active {
            item.is_active = is_active;
        }
        if let Some(meta_title) = input.meta_title {
            item.meta_title = meta_title;
        }
        if let Some(meta_description) = input.meta_description {
            item.meta_description = meta_description;
        }
        if let Some(meta_keywords) = input.meta_keywords {
            item.meta_keywords = meta_keywords;
        }
        item.updated_at = now;

        let renamed = item.name != before.name;
        let mut collided = HashSet::new();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if renamed {
                item.slug = next_free_slug(
                    &mut tx,
                    SlugScope::Items,
                    tenant_id,
                    &item.name,
                    Some(id),
                    &collided,
                )
                .await?;
            }

            let updated = sqlx::query(
                r#"
                UPDATE items
                SET name = ?3, slug = ?4, description = ?5, sort_order = ?6, is_active = ?7,
                    meta_title = ?8, meta_description = ?9, meta_keywords = ?10, updated_at = ?11
                WHERE id = ?1 AND tenant_id = ?2
                "#,
            )
            .bind(id)
            .bind(tenant_id)
            .bind(&item.name)
            .bind(&item.slug)
            .bind(&item.description)
            .bind(item.sort_order)
            .bind(item.is_active)
            .bind(&item.meta_title)
            .bind(&item.meta_description)
            .bind(&item.meta_keywords)
            .bind(now)
            .execute(&mut *tx)
            .await;

            match updated {
                Ok(_) => break,
                Err(e) => {
                    let err = DbError::from(e);
                    if !renamed || !should_retry(&err, "slug", attempt, self.policy.id_max_attempts) {
                        return Err(err);
                    }
                    collided.insert(item.slug.clone());
                }
            }
        }

        let specialization = match before.item_type {
            ItemType::Product => {
                let mut product = fetch_product(&mut tx, tenant_id, &before.itemable_id).await?;
                if let Some(update) = input.product {
                    for category in [
                        &update.category_id,
                        &update.subcategory_id,
                        &update.sub_subcategory_id,
                    ]
                    .into_iter()
                    .flatten()
                    {
                        ensure_live_opt(&mut tx, "categories", "Category", tenant_id, category.as_deref())
                            .await?;
                    }
                    if let Some(Some(brand_id)) = &update.brand_id {
                        ensure_live(&mut tx, "brands", "Brand", tenant_id, brand_id).await?;
                    }
                    if let Some(Some(unit_id)) = &update.unit_id {
                        ensure_live(&mut tx, "units", "Unit", tenant_id, unit_id).await?;
                    }

                    if let Some(v) = update.category_id {
                        product.category_id = v;
                    }
                    if let Some(v) = update.subcategory_id {
                        product.subcategory_id = v;
                    }
                    if let Some(v) = update.sub_subcategory_id {
                        product.sub_subcategory_id = v;
                    }
                    if let Some(v) = update.brand_id {
                        product.brand_id = v;
                    }
                    if let Some(v) = update.unit_id {
                        product.unit_id = v;
                    }
                    if let Some(sku) = update.sku {
                        product.sku = sku;
                    }
                    if let Some(charge) = update.shipping_charge {
                        product.shipping_charge = charge;
                    }
                    product.updated_at = now;

                    sqlx::query(
                        r#"
                        UPDATE products
                        SET category_id = ?3, subcategory_id = ?4, sub_subcategory_id = ?5,
                            brand_id = ?6, unit_id = ?7, sku = ?8, shipping_charge = ?9,
                            updated_at = ?10
                        WHERE id = ?1 AND tenant_id = ?2
                        "#,
                    )
                    .bind(&product.id)
                    .bind(tenant_id)
                    .bind(&product.category_id)
                    .bind(&product.subcategory_id)
                    .bind(&product.sub_subcategory_id)
                    .bind(&product.brand_id)
                    .bind(&product.unit_id)
                    .bind(&product.sku)
                    .bind(product.shipping_charge)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                Specialization::Product(product)
            }
            ItemType::Combo => {
                let mut combo = fetch_combo(&mut tx, tenant_id, &before.itemable_id).await?;
                if let Some(update) = input.combo {
                    if let Some(Some(category_id)) = &update.category_id {
                        ensure_live(&mut tx, "categories", "Category", tenant_id, category_id)
                            .await?;
                    }
                    if let Some(v) = update.category_id {
                        combo.category_id = v;
                    }
                    if let Some(v) = update.regular_price_cents {
                        combo.regular_price_cents = v;
                    }
                    if let Some(v) = update.offered_price_cents {
                        combo.offered_price_cents = v;
                    }
                    if let Some(v) = update.start_date {
                        combo.start_date = v;
                    }
                    if let Some(v) = update.end_date {
                        combo.end_date = v;
                    }
                    validate_date_window(combo.start_date, combo.end_date)?;
                    combo.updated_at = now;

                    sqlx::query(
                        r#"
                        UPDATE combos
                        SET category_id = ?3, regular_price_cents = ?4, offered_price_cents = ?5,
                            start_date = ?6, end_date = ?7, updated_at = ?8
                        WHERE id = ?1 AND tenant_id = ?2
                        "#,
                    )
                    .bind(&combo.id)
                    .bind(tenant_id)
                    .bind(&combo.category_id)
                    .bind(combo.regular_price_cents)
                    .bind(combo.offered_price_cents)
                    .bind(combo.start_date)
                    .bind(combo.end_date)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                Specialization::Combo(combo)
            }
        };
        commit(tx).await?;

        debug!(tenant_id = %tenant_id, item_id = %id, "Item updated");
        Ok(ItemAggregate {
            item,
            specialization,
        })
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Tombstones the item and everything under it.
    pub async fn delete(&self, ctx: &TenantContext, id: &str) -> DbResult<Committed<CascadeReport>> {
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        ensure_live(&mut tx, "items", "Item", tenant_id, id).await?;

        let mut cascade = Cascade::new(tenant_id, format!("item {}", id));
        cascade.item(&mut tx, id).await?;
        let report = cascade.finish();

        let events = vec![DomainEvent::ItemDeleted {
            tenant_id: tenant_id.to_string(),
            item_id: id.to_string(),
        }];
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;
        Ok(Committed::new(report, events))
    }

    // =========================================================================
    // Combo Lines
    // =========================================================================

    /// Adds a variant line to a combo.
    ///
    /// The variant must be live and belong to the named product.
    pub async fn add_combo_line(
        &self,
        ctx: &TenantContext,
        combo_id: &str,
        input: NewComboLine,
    ) -> DbResult<ComboProduct> {
        input.validate()?;
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        ensure_live(&mut tx, "combos", "Combo", tenant_id, combo_id).await?;
        ensure_live(&mut tx, "products", "Product", tenant_id, &input.product_id).await?;

        let matches: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM variants WHERE id = ?1 AND product_id = ?2 \
             AND tenant_id = ?3 AND deleted_at IS NULL",
        )
        .bind(&input.variant_id)
        .bind(&input.product_id)
        .bind(tenant_id)
        .fetch_one(&mut *tx)
        .await?;
        if matches == 0 {
            return Err(DbError::not_found("Variant", input.variant_id.as_str()));
        }

        let now = now();
        let line = ComboProduct {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            combo_id: combo_id.to_string(),
            product_id: input.product_id,
            variant_id: input.variant_id,
            quantity: input.quantity,
            price_cents: input.price_cents,
            discount_bps: input.discount_bps,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO combo_products (
                id, tenant_id, combo_id, product_id, variant_id, quantity, price_cents,
                discount_bps, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
        )
        .bind(&line.id)
        .bind(&line.tenant_id)
        .bind(&line.combo_id)
        .bind(&line.product_id)
        .bind(&line.variant_id)
        .bind(line.quantity)
        .bind(line.price_cents)
        .bind(line.discount_bps)
        .bind(line.is_active)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        commit(tx).await?;

        debug!(combo_id = %combo_id, variant_id = %line.variant_id, "Combo line added");
        Ok(line)
    }

    pub async fn remove_combo_line(&self, ctx: &TenantContext, line_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE combo_products SET deleted_at = ?3, updated_at = ?3 \
             WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        )
        .bind(line_id)
        .bind(ctx.tenant_id())
        .bind(now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ComboProduct", line_id));
        }
        Ok(())
    }

    /// Live lines of a combo in insertion order.
    pub async fn combo_lines(&self, ctx: &TenantContext, combo_id: &str) -> DbResult<Vec<ComboProduct>> {
        let mut conn = self.pool.acquire().await?;
        combo_lines(&mut conn, ctx.tenant_id(), combo_id).await
    }
}

pub(crate) async fn combo_lines(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    combo_id: &str,
) -> DbResult<Vec<ComboProduct>> {
    let sql = format!(
        "SELECT {} FROM combo_products WHERE combo_id = ?1 AND tenant_id = ?2 \
         AND deleted_at IS NULL ORDER BY created_at, rowid",
        LINE_COLUMNS
    );
    let lines = sqlx::query_as::<_, ComboProduct>(&sql)
        .bind(combo_id)
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::NaiveDate;
    use vitrine_core::input::{NewBrand, NewTenant, NewVariant, ProductUpdate};

    async fn setup() -> (Database, TenantContext) {
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
        (db, ctx)
    }

    fn combo(name: &str) -> NewCombo {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        NewCombo {
            item: ItemFields::named(name),
            category_id: None,
            regular_price_cents: Some(3000),
            offered_price_cents: 2500,
            start_date: d("2024-06-01"),
            end_date: d("2024-06-30"),
        }
    }

    #[tokio::test]
    async fn test_create_product_generates_slug_and_sku() {
        let (db, ctx) = setup().await;
        let created = db
            .items()
            .create_product(&ctx, NewProduct::named("Trail Shoe"))
            .await
            .unwrap();
        assert!(matches!(created.events[0], DomainEvent::ItemCreated { .. }));

        let aggregate = created.value;
        assert_eq!(aggregate.item.slug, "trail-shoe");
        assert_eq!(aggregate.item.item_type, ItemType::Product);
        let product = aggregate.as_product().unwrap();
        assert!(product.sku.starts_with("TRA-"));
        assert_eq!(product.item_id, aggregate.item.id);

        let loaded = db.items().get(&ctx, &aggregate.item.id).await.unwrap();
        assert_eq!(loaded.item.slug, aggregate.item.slug);
        assert_eq!(loaded.specialization.id(), product.id);
    }

    #[tokio::test]
    async fn test_duplicate_explicit_sku_rolls_back_item() {
        let (db, ctx) = setup().await;
        let mut input = NewProduct::named("Shoe");
        input.sku = Some("SHOE-1".into());
        db.items().create_product(&ctx, input.clone()).await.unwrap();

        let err = db.items().create_product(&ctx, input).await.unwrap_err();
        assert!(err.is_unique_on("sku"));
        // the second item row was rolled back with its product
        assert_eq!(db.items().list(&ctx, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_brand_rejected() {
        let (db, ctx) = setup().await;
        let mut input = NewProduct::named("Shoe");
        input.brand_id = Some("ghost".into());
        let err = db.items().create_product(&ctx, input).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_rejects_retyping() {
        let (db, ctx) = setup().await;
        let item = db
            .items()
            .create_product(&ctx, NewProduct::named("Shoe"))
            .await
            .unwrap()
            .value
            .item;

        let err = db
            .items()
            .update(
                &ctx,
                &item.id,
                ItemUpdate {
                    item_type: Some(ItemType::Combo),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_update_renames_and_sets_brand() {
        let (db, ctx) = setup().await;
        let brand = db.brands().create(&ctx, NewBrand::new("Acme")).await.unwrap();
        let item = db
            .items()
            .create_product(&ctx, NewProduct::named("Shoe"))
            .await
            .unwrap()
            .value
            .item;

        let updated = db
            .items()
            .update(
                &ctx,
                &item.id,
                ItemUpdate {
                    name: Some("Trail Shoe".into()),
                    product: Some(ProductUpdate {
                        brand_id: Some(Some(brand.id.clone())),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.item.slug, "trail-shoe");
        assert_eq!(updated.as_product().unwrap().brand_id.as_deref(), Some(brand.id.as_str()));
    }

    #[tokio::test]
    async fn test_combo_lines() {
        let (db, ctx) = setup().await;
        let product = db
            .items()
            .create_product(&ctx, NewProduct::named("Mug"))
            .await
            .unwrap()
            .value;
        let product_id = product.as_product().unwrap().id.clone();
        let variant = db
            .variants()
            .add_variant(&ctx, &product_id, NewVariant::new("Blue", 900, 10))
            .await
            .unwrap()
            .value
            .variant;

        let bundle = db.items().create_combo(&ctx, combo("Breakfast")).await.unwrap().value;
        let combo_id = bundle.as_combo().unwrap().id.clone();
        assert_eq!(bundle.as_combo().unwrap().stock_status, ComboStockStatus::Available);

        let line = db
            .items()
            .add_combo_line(&ctx, &combo_id, NewComboLine::new(&product_id, &variant.id, 2))
            .await
            .unwrap();
        assert_eq!(db.items().combo_lines(&ctx, &combo_id).await.unwrap().len(), 1);

        let wrong_product = db
            .items()
            .add_combo_line(&ctx, &combo_id, NewComboLine::new(&combo_id, &variant.id, 1))
            .await;
        assert!(wrong_product.is_err());

        db.items().remove_combo_line(&ctx, &line.id).await.unwrap();
        assert!(db.items().combo_lines(&ctx, &combo_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_combo_window_checked_on_update() {
        let (db, ctx) = setup().await;
        let bundle = db.items().create_combo(&ctx, combo("Breakfast")).await.unwrap().value;
        let err = db
            .items()
            .update(
                &ctx,
                &bundle.item.id,
                ItemUpdate {
                    combo: Some(vitrine_core::input::ComboUpdate {
                        end_date: NaiveDate::from_ymd_opt(2024, 5, 1),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_emits_item_deleted() {
        let (db, ctx) = setup().await;
        let bundle = db.items().create_combo(&ctx, combo("Breakfast")).await.unwrap().value;
        let deleted = db.items().delete(&ctx, &bundle.item.id).await.unwrap();
        assert_eq!(deleted.value.tombstoned("combos"), 1);
        assert_eq!(deleted.value.tombstoned("items"), 1);
        assert!(matches!(deleted.events[0], DomainEvent::ItemDeleted { .. }));
        assert!(db.items().get(&ctx, &bundle.item.id).await.is_err());
    }
}
