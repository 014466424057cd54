//! # Identifier Allocation
//!
//! Picks free slugs and SKUs inside the caller's write transaction.
//!
//! ```text
//! name ──► slugify ──► base ──► SELECT live slugs = base OR LIKE 'base-%'
//!                                          │
//!                                          ▼
//!                               first_free(base, taken)
//!                                          │
//!                                          ▼
//!                         INSERT ... ──► UNIQUE violation?
//!                                          │ yes (attempt < max)
//!                                          └──► probe again, skipping
//!                                               the collided candidate
//! ```
//!
//! The probe is an optimization; the partial unique indexes on live rows are
//! the guarantee. Repositories loop on [`should_retry`] until the insert
//! lands or the configured attempt budget runs out.

use std::collections::HashSet;

use sqlx::SqliteConnection;
use tracing::{debug, warn};
use vitrine_core::identifier::{first_free, random_sku, slugify};

use crate::error::{DbError, DbResult};

/// Tables whose `slug` is unique per tenant among live rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugScope {
    Categories,
    Brands,
    Units,
    Items,
}

impl SlugScope {
    pub const fn table(self) -> &'static str {
        match self {
            SlugScope::Categories => "categories",
            SlugScope::Brands => "brands",
            SlugScope::Units => "units",
            SlugScope::Items => "items",
        }
    }

    /// Slug used when the name has no ASCII alphanumerics.
    pub const fn fallback(self) -> &'static str {
        match self {
            SlugScope::Categories => "category",
            SlugScope::Brands => "brand",
            SlugScope::Units => "unit",
            SlugScope::Items => "item",
        }
    }
}

/// Tables whose `sku` is unique across tenants among live rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkuScope {
    Products,
    Variants,
}

impl SkuScope {
    pub const fn table(self) -> &'static str {
        match self {
            SkuScope::Products => "products",
            SkuScope::Variants => "variants",
        }
    }
}

/// Live values of `column` equal to `base` or shaped like `base-…`.
async fn taken_values(
    conn: &mut SqliteConnection,
    sql: &str,
    base: &str,
    extra_binds: &[&str],
) -> DbResult<HashSet<String>> {
    // bases are [a-zA-Z0-9-] only, so no LIKE escaping is needed
    let mut query = sqlx::query_scalar::<_, String>(sql)
        .bind(base.to_string())
        .bind(format!("{}-%", base));
    for value in extra_binds {
        query = query.bind(value.to_string());
    }
    let rows = query.fetch_all(&mut *conn).await?;
    Ok(rows.into_iter().collect())
}

/// First free slug for `name` in the tenant.
///
/// `exclude_id` is the row being renamed, so keeping the current name keeps
/// the current slug. `collided` holds candidates an earlier attempt of the
/// same write already lost on; they are skipped even if the probe sees them
/// as free.
pub async fn next_free_slug(
    conn: &mut SqliteConnection,
    scope: SlugScope,
    tenant_id: &str,
    name: &str,
    exclude_id: Option<&str>,
    collided: &HashSet<String>,
) -> DbResult<String> {
    let base = slugify(name, scope.fallback());
    let sql = format!(
        "SELECT slug FROM {} \
         WHERE (slug = ?1 OR slug LIKE ?2) AND tenant_id = ?3 AND id <> ?4 \
         AND deleted_at IS NULL",
        scope.table()
    );
    let mut taken =
        taken_values(conn, &sql, &base, &[tenant_id, exclude_id.unwrap_or("")]).await?;
    taken.extend(collided.iter().cloned());
    let slug = first_free(&base, &taken);

    debug!(table = scope.table(), tenant_id = %tenant_id, slug = %slug, "Allocated slug");
    Ok(slug)
}

/// Generated SKU for `name`: `PREFIX-NNNN`, or `PREFIX-NNNN-k` when taken.
pub async fn next_free_sku(
    conn: &mut SqliteConnection,
    scope: SkuScope,
    name: &str,
) -> DbResult<String> {
    let base = random_sku(name);
    let sql = format!(
        "SELECT sku FROM {} WHERE (sku = ?1 OR sku LIKE ?2) AND deleted_at IS NULL",
        scope.table()
    );
    let taken = taken_values(conn, &sql, &base, &[]).await?;
    let sku = first_free(&base, &taken);

    debug!(table = scope.table(), sku = %sku, "Allocated SKU");
    Ok(sku)
}

/// Whether an insert/update should re-run allocation.
///
/// True for a unique violation on `column` while attempts remain.
pub fn should_retry(err: &DbError, column: &str, attempt: u32, max_attempts: u32) -> bool {
    if !err.is_unique_on(column) {
        return false;
    }
    if attempt >= max_attempts {
        warn!(column, attempt, "Identifier allocation exhausted its attempts");
        return false;
    }
    warn!(column, attempt, "Unique violation, retrying identifier allocation");
    true
}
