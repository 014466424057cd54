//! # Category Repository
//!
//! Each tenant's categories form a forest through `parent_id`. Tree reads
//! load the tenant's live categories once and walk them with
//! [`CategoryForest`], so a corrupt cycle can never loop a query.
//!
//! ## Reparent Check
//! ```text
//! apparel ─┬─ shoes ── sneakers          update(apparel, parent = sneakers)
//!          └─ hats                          ancestors(sneakers) ∋ apparel
//!                                           ──► InvalidTransition
//! ```

use std::collections::{HashMap, HashSet};

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use vitrine_core::input::{CategoryUpdate, NewCategory};
use vitrine_core::tree::CategoryForest;
use vitrine_core::{Category, TenantContext};

use crate::cascade::{Cascade, CascadeReport};
use crate::error::{DbError, DbResult};
use crate::identifier::{next_free_slug, should_retry, SlugScope};
use crate::pool::CatalogPolicy;
use crate::repository::{begin, commit, ensure_live, ensure_live_opt, new_id, now};

const CATEGORY_COLUMNS: &str = "id, tenant_id, parent_id, name, slug, description, image_path, \
                                sort_order, is_active, created_at, updated_at, deleted_at";

async fn fetch_category(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Category> {
    let sql = format!(
        "SELECT {} FROM categories WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        CATEGORY_COLUMNS
    );
    sqlx::query_as::<_, Category>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Category", id))
}

/// Every live category of the tenant.
pub(crate) async fn load_live_categories(
    conn: &mut SqliteConnection,
    tenant_id: &str,
) -> DbResult<Vec<Category>> {
    let sql = format!(
        "SELECT {} FROM categories WHERE tenant_id = ?1 AND deleted_at IS NULL \
         ORDER BY sort_order, name",
        CATEGORY_COLUMNS
    );
    let categories = sqlx::query_as::<_, Category>(&sql)
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(categories)
}

pub(crate) fn forest_of(categories: &[Category]) -> CategoryForest {
    CategoryForest::new(
        categories
            .iter()
            .map(|c| (c.id.clone(), c.parent_id.clone())),
    )
}

/// Repository for the category forest.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
    policy: CatalogPolicy,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool, policy: CatalogPolicy) -> Self {
        CategoryRepository { pool, policy }
    }

    pub async fn create(&self, ctx: &TenantContext, input: NewCategory) -> DbResult<Category> {
        input.validate()?;
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        ensure_live_opt(&mut tx, "categories", "Category", tenant_id, input.parent_id.as_deref())
            .await?;

        let now = now();
        let mut category = Category {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            parent_id: input.parent_id,
            name: input.name.trim().to_string(),
            slug: String::new(),
            description: input.description,
            image_path: input.image_path,
            sort_order: input.sort_order,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let mut collided = HashSet::new();
        let mut attempt = 0;
        loop {
            attempt += 1;
            category.slug = next_free_slug(
                &mut tx,
                SlugScope::Categories,
                tenant_id,
                &category.name,
                None,
                &collided,
            )
            .await?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO categories (
                    id, tenant_id, parent_id, name, slug, description, image_path,
                    sort_order, is_active, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                "#,
            )
            .bind(&category.id)
            .bind(&category.tenant_id)
            .bind(&category.parent_id)
            .bind(&category.name)
            .bind(&category.slug)
            .bind(&category.description)
            .bind(&category.image_path)
            .bind(category.sort_order)
            .bind(category.is_active)
            .bind(now)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => break,
                Err(e) => {
                    let err = DbError::from(e);
                    if !should_retry(&err, "slug", attempt, self.policy.id_max_attempts) {
                        return Err(err);
                    }
                    collided.insert(category.slug.clone());
                }
            }
        }
        commit(tx).await?;

        debug!(tenant_id = %tenant_id, id = %category.id, slug = %category.slug, "Category created");
        Ok(category)
    }

    /// Updates fields, re-slugging on rename and checking reparents.
    pub async fn update(
        &self,
        ctx: &TenantContext,
        id: &str,
        input: CategoryUpdate,
    ) -> DbResult<Category> {
        input.validate()?;
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        let before = fetch_category(&mut tx, tenant_id, id).await?;
        let mut after = before.clone();

        if let Some(parent_id) = input.parent_id {
            if parent_id != before.parent_id {
                ensure_live_opt(&mut tx, "categories", "Category", tenant_id, parent_id.as_deref())
                    .await?;
                let forest = forest_of(&load_live_categories(&mut tx, tenant_id).await?);
                forest.validate_reparent(id, parent_id.as_deref())?;
            }
            after.parent_id = parent_id;
        }
        if let Some(name) = input.name {
            after.name = name.trim().to_string();
        }
        if let Some(description) = input.description {
            after.description = description;
        }
        if let Some(image_path) = input.image_path {
            after.image_path = image_path;
        }
        if let Some(sort_order) = input.sort_order {
            after.sort_order = sort_order;
        }
        if let Some(is_active) = input.is_active {
            after.is_active = is_active;
        }
        after.updated_at = now();

        let renamed = after.name != before.name;
        let mut collided = HashSet::new();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if renamed {
                after.slug = next_free_slug(
                    &mut tx,
                    SlugScope::Categories,
                    tenant_id,
                    &after.name,
                    Some(id),
                    &collided,
                )
                .await?;
            }

            let updated = sqlx::query(
                r#"
                UPDATE categories
                SET parent_id = ?3, name = ?4, slug = ?5, description = ?6, image_path = ?7,
                    sort_order = ?8, is_active = ?9, updated_at = ?10
                WHERE id = ?1 AND tenant_id = ?2
                "#,
            )
            .bind(id)
            .bind(tenant_id)
            .bind(&after.parent_id)
            .bind(&after.name)
            .bind(&after.slug)
            .bind(&after.description)
            .bind(&after.image_path)
            .bind(after.sort_order)
            .bind(after.is_active)
            .bind(after.updated_at)
            .execute(&mut *tx)
            .await;

            match updated {
                Ok(_) => break,
                Err(e) => {
                    let err = DbError::from(e);
                    if !renamed || !should_retry(&err, "slug", attempt, self.policy.id_max_attempts)
                    {
                        return Err(err);
                    }
                    collided.insert(after.slug.clone());
                }
            }
        }
        commit(tx).await?;

        debug!(tenant_id = %tenant_id, id = %id, "Category updated");
        Ok(after)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> DbResult<Category> {
        let mut conn = self.pool.acquire().await?;
        fetch_category(&mut conn, ctx.tenant_id(), id).await
    }

    pub async fn get_by_slug(&self, ctx: &TenantContext, slug: &str) -> DbResult<Option<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE slug = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
            CATEGORY_COLUMNS
        );
        let category = sqlx::query_as::<_, Category>(&sql)
            .bind(slug)
            .bind(ctx.tenant_id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    pub async fn list(&self, ctx: &TenantContext) -> DbResult<Vec<Category>> {
        let mut conn = self.pool.acquire().await?;
        load_live_categories(&mut conn, ctx.tenant_id()).await
    }

    pub async fn roots(&self, ctx: &TenantContext) -> DbResult<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE parent_id IS NULL AND tenant_id = ?1 \
             AND deleted_at IS NULL ORDER BY sort_order, name",
            CATEGORY_COLUMNS
        );
        let roots = sqlx::query_as::<_, Category>(&sql)
            .bind(ctx.tenant_id())
            .fetch_all(&self.pool)
            .await?;
        Ok(roots)
    }

    pub async fn children(&self, ctx: &TenantContext, id: &str) -> DbResult<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE parent_id = ?1 AND tenant_id = ?2 \
             AND deleted_at IS NULL ORDER BY sort_order, name",
            CATEGORY_COLUMNS
        );
        let children = sqlx::query_as::<_, Category>(&sql)
            .bind(id)
            .bind(ctx.tenant_id())
            .fetch_all(&self.pool)
            .await?;
        Ok(children)
    }

    /// Root → leaf chain ending at `id`.
    pub async fn ancestors(&self, ctx: &TenantContext, id: &str) -> DbResult<Vec<Category>> {
        let mut conn = self.pool.acquire().await?;
        let all = load_live_categories(&mut conn, ctx.tenant_id()).await?;
        let forest = forest_of(&all);
        if !forest.contains(id) {
            return Err(DbError::not_found("Category", id));
        }

        let mut by_id: HashMap<String, Category> =
            all.into_iter().map(|c| (c.id.clone(), c)).collect();
        Ok(forest
            .ancestors(id)
            .iter()
            .filter_map(|a| by_id.remove(a))
            .collect())
    }

    /// Category names root → leaf.
    pub async fn breadcrumb(&self, ctx: &TenantContext, id: &str) -> DbResult<Vec<String>> {
        Ok(self
            .ancestors(ctx, id)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    /// Ids of `id` and all of its live descendants.
    pub async fn subtree_ids(&self, ctx: &TenantContext, id: &str) -> DbResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        let forest = forest_of(&load_live_categories(&mut conn, ctx.tenant_id()).await?);
        Ok(forest.subtree(id))
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Tombstones the category; children become roots and product/combo
    /// references are cleared.
    pub async fn delete(&self, ctx: &TenantContext, id: &str) -> DbResult<CascadeReport> {
        let mut tx = begin(&self.pool).await?;
        ensure_live(&mut tx, "categories", "Category", ctx.tenant_id(), id).await?;

        let mut cascade = Cascade::new(ctx.tenant_id(), format!("category {}", id));
        cascade.category(&mut tx, id).await?;
        let report = cascade.finish();
        commit(tx).await?;

        info!(tenant_id = %ctx.tenant_id(), id = %id, "Category deleted");
        Ok(report)
    }
}
