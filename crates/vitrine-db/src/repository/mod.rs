//! # Repository Module
//!
//! Tenant-scoped repositories over the catalog schema.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Call Shape                                │
//! │                                                                         │
//! │  caller                                                                 │
//! │    │  db.items().create_product(&ctx, NewProduct { .. })               │
//! │    ▼                                                                    │
//! │  ItemRepository                                                         │
//! │    ├── input.validate()              (vitrine-core, before any SQL)    │
//! │    ├── BEGIN IMMEDIATE                                                  │
//! │    │     ├── reference checks        (tenant_id = ? on every query)    │
//! │    │     ├── slug / SKU allocation   (crate::identifier, with retry)   │
//! │    │     ├── INSERT / UPDATE rows                                       │
//! │    │     └── enqueue events          (event_outbox, same transaction)  │
//! │    ├── commit()                                                         │
//! │    ▼                                                                    │
//! │  Committed { value, events }                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`TenantRepository`](tenant::TenantRepository) - Tenants, context resolution, settings
//! - [`UserRepository`](user::UserRepository) - Users and profile details
//! - [`DomainRepository`](domain::DomainRepository) - Hostnames and the primary domain
//! - [`PlanRepository`](billing::PlanRepository) / [`SubscriptionRepository`](billing::SubscriptionRepository)
//! - [`CategoryRepository`](category::CategoryRepository) - Category forest
//! - [`BrandRepository`](brand::BrandRepository) / [`UnitRepository`](unit::UnitRepository)
//! - [`ItemRepository`](item::ItemRepository) - Products, combos and combo lines
//! - [`VariantRepository`](variant::VariantRepository) - Variants and stock
//! - [`AttributeRepository`](attribute::AttributeRepository) - Polymorphic attributes
//! - [`MediaRepository`](media::MediaRepository) - Polymorphic media and primaries
//! - [`EventOutboxRepository`](outbox::EventOutboxRepository) - Pending domain events

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use uuid::Uuid;
use vitrine_core::{OwnerRef, TenantContext};

use crate::error::{DbError, DbResult};

pub mod attribute;
pub mod billing;
pub mod brand;
pub mod category;
pub mod domain;
pub mod item;
pub mod media;
pub mod outbox;
pub mod tenant;
pub mod unit;
pub mod user;
pub mod variant;

// =============================================================================
// Visibility
// =============================================================================

/// Whether a lookup sees tombstoned rows.
///
/// Everything defaults to [`Visibility::Live`]; audit and restore paths opt
/// in to tombstones explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Live,
    IncludeTombstoned,
}

impl Visibility {
    /// SQL fragment appended after a `WHERE` clause.
    pub(crate) fn filter(self) -> &'static str {
        match self {
            Visibility::Live => " AND deleted_at IS NULL",
            Visibility::IncludeTombstoned => "",
        }
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Opens a write transaction holding SQLite's write lock from the start.
///
/// A deferred `BEGIN` takes a read snapshot first and fails with
/// `SQLITE_BUSY` when it later needs to write while another connection
/// holds the lock. `BEGIN IMMEDIATE` waits on the busy timeout instead, so
/// probes and the writes that depend on them run under the same lock.
pub(crate) async fn begin(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE")
        .await
        .map_err(|e| DbError::TransactionFailed(e.to_string()))
}

pub(crate) async fn commit(tx: Transaction<'static, Sqlite>) -> DbResult<()> {
    tx.commit()
        .await
        .map_err(|e| DbError::TransactionFailed(e.to_string()))
}

/// Fails with `NotFound` unless `id` is a live row of `table` in the tenant.
///
/// `table` must be one of the schema's table names, never caller input.
pub(crate) async fn ensure_live(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &str,
    tenant_id: &str,
    id: &str,
) -> DbResult<()> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        table
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_one(&mut *conn)
        .await?;

    if count == 0 {
        return Err(DbError::not_found(entity, id));
    }
    Ok(())
}

/// Same as [`ensure_live`] for an optional reference.
pub(crate) async fn ensure_live_opt(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &str,
    tenant_id: &str,
    id: Option<&str>,
) -> DbResult<()> {
    match id {
        Some(id) => ensure_live(conn, table, entity, tenant_id, id).await,
        None => Ok(()),
    }
}

/// Checks that a polymorphic owner exists and is live in the tenant.
pub(crate) async fn ensure_owner(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    owner: &OwnerRef,
) -> DbResult<()> {
    ensure_live(
        conn,
        owner.kind.table(),
        owner.kind.as_str(),
        ctx.tenant_id(),
        &owner.id,
    )
    .await
}
