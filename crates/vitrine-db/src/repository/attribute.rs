//! # Attribute Repository
//!
//! Name/value attributes on items, products and variants.
//!
//! "Under a category" means the category and every live descendant. A
//! product counts when any of its three category columns is in that set;
//! its item and its live variants count with it.

use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use vitrine_core::input::{AttributeUpdate, NewAttribute};
use vitrine_core::{group_facets, Attribute, FilterFacet, OwnerRef, TenantContext};

use crate::error::{DbError, DbResult};
use crate::repository::category::{forest_of, load_live_categories};
use crate::repository::{begin, commit, ensure_live, ensure_owner, new_id, now};

const ATTRIBUTE_COLUMNS: &str = "id, tenant_id, attributable_type, attributable_id, \
                                 attribute_category, attribute_name, attribute_value, \
                                 attribute_type, is_filterable, created_at, updated_at, deleted_at";

async fn fetch_attribute(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Attribute> {
    let sql = format!(
        "SELECT {} FROM attributes WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        ATTRIBUTE_COLUMNS
    );
    sqlx::query_as::<_, Attribute>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Attribute", id))
}

/// Repository for polymorphic attributes.
#[derive(Debug, Clone)]
pub struct AttributeRepository {
    pool: SqlitePool,
}

impl AttributeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AttributeRepository { pool }
    }

    pub async fn attach(
        &self,
        ctx: &TenantContext,
        owner: OwnerRef,
        input: NewAttribute,
    ) -> DbResult<Attribute> {
        owner.ensure_attributable()?;
        input.validate()?;

        let mut tx = begin(&self.pool).await?;
        ensure_owner(&mut tx, ctx, &owner).await?;

        let now = now();
        let attribute = Attribute {
            id: new_id(),
            tenant_id: ctx.tenant_id().to_string(),
            attributable_type: owner.kind,
            attributable_id: owner.id,
            attribute_category: input.attribute_category,
            attribute_name: input.attribute_name.trim().to_string(),
            attribute_value: input.attribute_value,
            attribute_type: input.attribute_type,
            is_filterable: input.is_filterable,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO attributes (
                id, tenant_id, attributable_type, attributable_id, attribute_category,
                attribute_name, attribute_value, attribute_type, is_filterable,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
        )
        .bind(&attribute.id)
        .bind(&attribute.tenant_id)
        .bind(attribute.attributable_type)
        .bind(&attribute.attributable_id)
        .bind(&attribute.attribute_category)
        .bind(&attribute.attribute_name)
        .bind(&attribute.attribute_value)
        .bind(attribute.attribute_type)
        .bind(attribute.is_filterable)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        commit(tx).await?;

        debug!(
            tenant_id = %attribute.tenant_id,
            owner = %attribute.attributable_type,
            owner_id = %attribute.attributable_id,
            name = %attribute.attribute_name,
            "Attribute attached"
        );
        Ok(attribute)
    }

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> DbResult<Attribute> {
        let mut conn = self.pool.acquire().await?;
        fetch_attribute(&mut conn, ctx.tenant_id(), id).await
    }

    pub async fn update(
        &self,
        ctx: &TenantContext,
        id: &str,
        input: AttributeUpdate,
    ) -> DbResult<Attribute> {
        input.validate()?;
        let mut tx = begin(&self.pool).await?;
        let mut attribute = fetch_attribute(&mut tx, ctx.tenant_id(), id).await?;

        if let Some(category) = input.attribute_category {
            attribute.attribute_category = category;
        }
        if let Some(name) = input.attribute_name {
            attribute.attribute_name = name.trim().to_string();
        }
        if let Some(value) = input.attribute_value {
            attribute.attribute_value = value;
        }
        if let Some(attribute_type) = input.attribute_type {
            attribute.attribute_type = attribute_type;
        }
        if let Some(is_filterable) = input.is_filterable {
            attribute.is_filterable = is_filterable;
        }
        attribute.updated_at = now();

        let result = sqlx::query(
            r#"
            UPDATE attributes
            SET attribute_category = ?3, attribute_name = ?4, attribute_value = ?5,
                attribute_type = ?6, is_filterable = ?7, updated_at = ?8
            WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(ctx.tenant_id())
        .bind(&attribute.attribute_category)
        .bind(&attribute.attribute_name)
        .bind(&attribute.attribute_value)
        .bind(attribute.attribute_type)
        .bind(attribute.is_filterable)
        .bind(attribute.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Attribute", id));
        }
        commit(tx).await?;

        debug!(attribute_id = %id, "Attribute updated");
        Ok(attribute)
    }

    /// Tombstones one attribute.
    pub async fn detach(&self, ctx: &TenantContext, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE attributes SET deleted_at = ?3, updated_at = ?3 \
             WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(ctx.tenant_id())
        .bind(now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Attribute", id));
        }
        Ok(())
    }

    /// Live attributes of one owner, optionally limited to one attribute
    /// category ("Specifications", "Product Details", ...).
    pub async fn list_for(
        &self,
        ctx: &TenantContext,
        owner: &OwnerRef,
        attribute_category: Option<&str>,
    ) -> DbResult<Vec<Attribute>> {
        let sql = format!(
            "SELECT {} FROM attributes \
             WHERE tenant_id = ?1 AND attributable_type = ?2 AND attributable_id = ?3 \
             AND deleted_at IS NULL AND (?4 IS NULL OR attribute_category = ?4) \
             ORDER BY attribute_category, attribute_name, created_at",
            ATTRIBUTE_COLUMNS
        );
        let attributes = sqlx::query_as::<_, Attribute>(&sql)
            .bind(ctx.tenant_id())
            .bind(owner.kind)
            .bind(&owner.id)
            .bind(attribute_category)
            .fetch_all(&self.pool)
            .await?;
        Ok(attributes)
    }

    /// Filterable attributes of everything under `category_id`.
    pub async fn filterable_for_category(
        &self,
        ctx: &TenantContext,
        category_id: &str,
    ) -> DbResult<Vec<Attribute>> {
        let tenant_id = ctx.tenant_id();
        let mut conn = self.pool.acquire().await?;
        ensure_live(&mut conn, "categories", "Category", tenant_id, category_id).await?;

        let subtree = forest_of(&load_live_categories(&mut conn, tenant_id).await?).subtree(category_id);

        let sql = format!(
            r#"
            WITH scope(id) AS (SELECT value FROM json_each(?2)),
            scoped_products AS (
                SELECT id, item_id FROM products
                WHERE tenant_id = ?1 AND deleted_at IS NULL
                  AND (category_id IN (SELECT id FROM scope)
                       OR subcategory_id IN (SELECT id FROM scope)
                       OR sub_subcategory_id IN (SELECT id FROM scope))
            )
            SELECT {} FROM attributes
            WHERE tenant_id = ?1 AND deleted_at IS NULL AND is_filterable = 1
              AND (
                (attributable_type = 'product'
                    AND attributable_id IN (SELECT id FROM scoped_products))
                OR (attributable_type = 'item'
                    AND attributable_id IN (SELECT item_id FROM scoped_products))
                OR (attributable_type = 'variant'
                    AND attributable_id IN (
                        SELECT id FROM variants
                        WHERE deleted_at IS NULL
                          AND product_id IN (SELECT id FROM scoped_products)))
              )
            ORDER BY attribute_name, attribute_value
            "#,
            ATTRIBUTE_COLUMNS
        );
        let attributes = sqlx::query_as::<_, Attribute>(&sql)
            .bind(tenant_id)
            .bind(Json(&subtree))
            .fetch_all(&mut *conn)
            .await?;

        debug!(
            tenant_id = %tenant_id,
            category_id = %category_id,
            categories = subtree.len(),
            attributes = attributes.len(),
            "Loaded filterable attributes"
        );
        Ok(attributes)
    }

    /// Filter facets (name → distinct values) under `category_id`.
    pub async fn filter_facets_for_category(
        &self,
        ctx: &TenantContext,
        category_id: &str,
    ) -> DbResult<Vec<FilterFacet>> {
        let attributes = self.filterable_for_category(ctx, category_id).await?;
        Ok(group_facets(&attributes))
    }
}
