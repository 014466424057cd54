//! # Domain Repository
//!
//! Hostnames routed to a tenant. Hostnames are normalized (trimmed,
//! lowercase, no trailing dot) and unique across all tenants; each tenant
//! has at most one live primary domain.
//!
//! ## Primary Switch
//! ```text
//! mark_primary(d2)
//!   ├── UPDATE domains SET is_primary = 0 WHERE tenant = ? AND is_primary = 1
//!   │     (d1 loses the flag → DomainUpdated{d1, [is_primary]})
//!   └── UPDATE domains SET is_primary = 1 WHERE id = d2
//!         (DomainUpdated{d2, [is_primary]})
//! ```
//! Clearing runs first so the partial unique index never sees two primaries.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use vitrine_core::events::domain_update_events;
use vitrine_core::input::{DomainUpdate, NewDomain};
use vitrine_core::{Committed, Domain, DomainEvent, TenantContext};

use crate::error::{DbError, DbResult};
use crate::repository::outbox::enqueue;
use crate::repository::{begin, commit, new_id, now};

const DOMAIN_COLUMNS: &str = "id, tenant_id, hostname, kind, is_primary, ssl_enabled, \
                              ssl_expires_at, created_at, updated_at, deleted_at";

async fn fetch_domain(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Domain> {
    let sql = format!(
        "SELECT {} FROM domains WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        DOMAIN_COLUMNS
    );
    sqlx::query_as::<_, Domain>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Domain", id))
}

/// Drops the primary flag from every other live domain of the tenant.
///
/// Returns the `DomainUpdated` events for the domains that lost it.
async fn clear_other_primaries(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    keep_id: &str,
) -> DbResult<Vec<DomainEvent>> {
    let sql = format!(
        "SELECT {} FROM domains WHERE tenant_id = ?1 AND is_primary = 1 \
         AND id <> ?2 AND deleted_at IS NULL",
        DOMAIN_COLUMNS
    );
    let previous = sqlx::query_as::<_, Domain>(&sql)
        .bind(tenant_id)
        .bind(keep_id)
        .fetch_all(&mut *conn)
        .await?;

    let now = now();
    let mut events = Vec::new();
    for before in previous {
        sqlx::query("UPDATE domains SET is_primary = 0, updated_at = ?2 WHERE id = ?1")
            .bind(&before.id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        let mut after = before.clone();
        after.is_primary = false;
        events.extend(domain_update_events(&before, &after));
    }
    Ok(events)
}

/// Repository for tenant domains.
#[derive(Debug, Clone)]
pub struct DomainRepository {
    pool: SqlitePool,
}

impl DomainRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DomainRepository { pool }
    }

    pub async fn add(&self, ctx: &TenantContext, input: NewDomain) -> DbResult<Committed<Domain>> {
        let hostname = input.validate()?;
        let now = now();
        let domain = Domain {
            id: new_id(),
            tenant_id: ctx.tenant_id().to_string(),
            hostname,
            kind: input.kind,
            is_primary: input.is_primary,
            ssl_enabled: input.ssl_enabled,
            ssl_expires_at: input.ssl_expires_at,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let mut tx = begin(&self.pool).await?;
        let mut events = Vec::new();
        if domain.is_primary {
            events.extend(clear_other_primaries(&mut tx, &domain.tenant_id, &domain.id).await?);
        }

        sqlx::query(
            r#"
            INSERT INTO domains (
                id, tenant_id, hostname, kind, is_primary, ssl_enabled, ssl_expires_at,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&domain.id)
        .bind(&domain.tenant_id)
        .bind(&domain.hostname)
        .bind(domain.kind)
        .bind(domain.is_primary)
        .bind(domain.ssl_enabled)
        .bind(domain.ssl_expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        events.push(DomainEvent::DomainCreated {
            tenant_id: domain.tenant_id.clone(),
            domain_id: domain.id.clone(),
            hostname: domain.hostname.clone(),
        });
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        info!(tenant_id = %domain.tenant_id, hostname = %domain.hostname, "Domain added");
        Ok(Committed::new(domain, events))
    }

    /// Makes `id` the tenant's only primary domain.
    pub async fn mark_primary(&self, ctx: &TenantContext, id: &str) -> DbResult<Committed<Domain>> {
        let mut tx = begin(&self.pool).await?;
        let before = fetch_domain(&mut tx, ctx.tenant_id(), id).await?;

        let mut events = clear_other_primaries(&mut tx, ctx.tenant_id(), id).await?;

        let mut after = before.clone();
        if !before.is_primary {
            after.is_primary = true;
            after.updated_at = now();
            sqlx::query("UPDATE domains SET is_primary = 1, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(after.updated_at)
                .execute(&mut *tx)
                .await?;
        }

        events.extend(domain_update_events(&before, &after));
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        debug!(domain_id = %id, "Primary domain set");
        Ok(Committed::new(after, events))
    }

    /// Changes kind and SSL fields. `DomainUpdated` lists what moved.
    pub async fn update(
        &self,
        ctx: &TenantContext,
        id: &str,
        input: DomainUpdate,
    ) -> DbResult<Committed<Domain>> {
        let mut tx = begin(&self.pool).await?;
        let before = fetch_domain(&mut tx, ctx.tenant_id(), id).await?;

        let mut after = before.clone();
        if let Some(kind) = input.kind {
            after.kind = kind;
        }
        if let Some(ssl_enabled) = input.ssl_enabled {
            after.ssl_enabled = ssl_enabled;
        }
        if let Some(expires) = input.ssl_expires_at {
            after.ssl_expires_at = expires;
        }
        after.updated_at = now();

        sqlx::query(
            r#"
            UPDATE domains
            SET kind = ?2, ssl_enabled = ?3, ssl_expires_at = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(after.kind)
        .bind(after.ssl_enabled)
        .bind(after.ssl_expires_at)
        .bind(after.updated_at)
        .execute(&mut *tx)
        .await?;

        let events = domain_update_events(&before, &after);
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;
        Ok(Committed::new(after, events))
    }

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> DbResult<Domain> {
        let mut conn = self.pool.acquire().await?;
        fetch_domain(&mut conn, ctx.tenant_id(), id).await
    }

    pub async fn primary(&self, ctx: &TenantContext) -> DbResult<Option<Domain>> {
        let sql = format!(
            "SELECT {} FROM domains WHERE tenant_id = ?1 AND is_primary = 1 AND deleted_at IS NULL",
            DOMAIN_COLUMNS
        );
        let domain = sqlx::query_as::<_, Domain>(&sql)
            .bind(ctx.tenant_id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(domain)
    }

    pub async fn list(&self, ctx: &TenantContext) -> DbResult<Vec<Domain>> {
        let sql = format!(
            "SELECT {} FROM domains WHERE tenant_id = ?1 AND deleted_at IS NULL \
             ORDER BY is_primary DESC, hostname",
            DOMAIN_COLUMNS
        );
        let domains = sqlx::query_as::<_, Domain>(&sql)
            .bind(ctx.tenant_id())
            .fetch_all(&self.pool)
            .await?;
        Ok(domains)
    }

    /// Tombstones a domain; its hostname becomes available again.
    pub async fn remove(&self, ctx: &TenantContext, id: &str) -> DbResult<()> {
        let now = now();
        let result = sqlx::query(
            "UPDATE domains SET deleted_at = ?3, updated_at = ?3 \
             WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(ctx.tenant_id())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Domain", id));
        }
        Ok(())
    }
}
