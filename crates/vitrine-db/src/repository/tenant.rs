//! # Tenant Repository
//!
//! Tenant lifecycle and the only way to obtain a [`TenantContext`].
//!
//! ## Context Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  request ──► RequestScope::Global (default)                            │
//! │                 │                                                       │
//! │                 ├── context_for(tenant_id)                             │
//! │                 │     tenants WHERE id = ? AND live AND active         │
//! │                 │                                                       │
//! │                 └── context_for_host("Shop.Example.com")               │
//! │                       normalize ──► domains.hostname ──► tenant        │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │           TenantContext ──► every tenant-scoped repository call        │
//! │                                                                         │
//! │  missing / tombstoned / inactive / suspended ──► CoreError::Scope      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, SqliteExecutor, SqlitePool};
use tracing::{debug, info};
use vitrine_core::events::tenant_update_events;
use vitrine_core::input::NewTenant;
use vitrine_core::validation::normalize_hostname;
use vitrine_core::{Committed, CoreError, DomainEvent, Tenant, TenantContext, TenantStatus};

use crate::cascade::{Cascade, CascadeReport};
use crate::error::{DbError, DbResult};
use crate::repository::outbox::enqueue;
use crate::repository::{begin, commit, new_id, now, Visibility};

const TENANT_COLUMNS: &str =
    "id, name, domain, status, owner_id, plan_id, settings, created_at, updated_at, deleted_at";

/// Row shape; `settings` is a JSON object in a TEXT column.
#[derive(Debug, FromRow)]
struct TenantRow {
    id: String,
    name: String,
    domain: Option<String>,
    status: TenantStatus,
    owner_id: String,
    plan_id: Option<String>,
    settings: Json<Map<String, Value>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            id: row.id,
            name: row.name,
            domain: row.domain,
            status: row.status,
            owner_id: row.owner_id,
            plan_id: row.plan_id,
            settings: row.settings.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

pub(crate) async fn fetch_tenant<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: &str,
    visibility: Visibility,
) -> DbResult<Option<Tenant>> {
    let sql = format!(
        "SELECT {} FROM tenants WHERE id = ?1{}",
        TENANT_COLUMNS,
        visibility.filter()
    );
    let row = sqlx::query_as::<_, TenantRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(Tenant::from))
}

/// Scope check shared by both resolution paths.
fn context_from(tenant: Option<Tenant>, key: &str) -> DbResult<TenantContext> {
    match tenant {
        None => Err(CoreError::scope(format!("no live tenant for {}", key)).into()),
        Some(t) if t.status != TenantStatus::Active => Err(CoreError::scope(format!(
            "tenant {} is {:?}",
            t.id, t.status
        ))
        .into()),
        Some(t) => Ok(TenantContext::resolved(t.id)),
    }
}

/// Repository for tenant operations.
#[derive(Debug, Clone)]
pub struct TenantRepository {
    pool: SqlitePool,
}

impl TenantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TenantRepository { pool }
    }

    /// Creates a tenant together with its owner user.
    ///
    /// ## What This Does (one transaction)
    /// 1. INSERT owner user (no tenant yet)
    /// 2. INSERT tenant pointing at the owner
    /// 3. Attach the owner to the tenant
    /// 4. Queue `TenantCreated`
    pub async fn create(&self, input: NewTenant) -> DbResult<Committed<Tenant>> {
        input.validate()?;
        let now = now();
        let tenant_id = new_id();
        let owner_id = new_id();
        let domain = input
            .domain
            .as_deref()
            .map(normalize_hostname)
            .transpose()?;

        debug!(tenant_id = %tenant_id, name = %input.name, "Creating tenant");

        let mut tx = begin(&self.pool).await?;

        if let Some(plan_id) = &input.plan_id {
            let live: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM plans WHERE id = ?1 AND deleted_at IS NULL",
            )
            .bind(plan_id)
            .fetch_one(&mut *tx)
            .await?;
            if live == 0 {
                return Err(DbError::not_found("Plan", plan_id.as_str()));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO users (id, tenant_id, name, email, status, created_at, updated_at)
            VALUES (?1, NULL, ?2, ?3, 'active', ?4, ?4)
            "#,
        )
        .bind(&owner_id)
        .bind(input.owner_name.trim())
        .bind(input.owner_email.trim().to_lowercase())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let tenant = Tenant {
            id: tenant_id.clone(),
            name: input.name.trim().to_string(),
            domain,
            status: TenantStatus::Active,
            owner_id: owner_id.clone(),
            plan_id: input.plan_id.clone(),
            settings: input.settings,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO tenants (
                id, name, domain, status, owner_id, plan_id, settings,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.domain)
        .bind(tenant.status)
        .bind(&tenant.owner_id)
        .bind(&tenant.plan_id)
        .bind(Json(&tenant.settings))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET tenant_id = ?1 WHERE id = ?2")
            .bind(&tenant_id)
            .bind(&owner_id)
            .execute(&mut *tx)
            .await?;

        let events = vec![DomainEvent::TenantCreated {
            tenant_id: tenant_id.clone(),
            owner_id,
        }];
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        info!(tenant_id = %tenant_id, "Tenant created");
        Ok(Committed::new(tenant, events))
    }

    pub async fn get(&self, id: &str, visibility: Visibility) -> DbResult<Option<Tenant>> {
        fetch_tenant(&self.pool, id, visibility).await
    }

    pub async fn list(&self, visibility: Visibility) -> DbResult<Vec<Tenant>> {
        let sql = format!(
            "SELECT {} FROM tenants WHERE 1 = 1{} ORDER BY name",
            TENANT_COLUMNS,
            visibility.filter()
        );
        let rows = sqlx::query_as::<_, TenantRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Tenant::from).collect())
    }

    // =========================================================================
    // Context Resolution
    // =========================================================================

    /// Resolves a live, active tenant by id.
    pub async fn context_for(&self, tenant_id: &str) -> DbResult<TenantContext> {
        let tenant = fetch_tenant(&self.pool, tenant_id, Visibility::Live).await?;
        context_from(tenant, tenant_id)
    }

    /// Resolves a live, active tenant through a live domain row.
    pub async fn context_for_host(&self, hostname: &str) -> DbResult<TenantContext> {
        let host = normalize_hostname(hostname)?;
        let tenant_id: Option<String> = sqlx::query_scalar(
            "SELECT tenant_id FROM domains WHERE hostname = ?1 AND deleted_at IS NULL",
        )
        .bind(&host)
        .fetch_optional(&self.pool)
        .await?;

        let tenant = match tenant_id {
            Some(id) => fetch_tenant(&self.pool, &id, Visibility::Live).await?,
            None => None,
        };
        context_from(tenant, &host)
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Moves a tenant between active / inactive / suspended.
    ///
    /// Takes a bare id: a suspended tenant has no context to reactivate with.
    pub async fn set_status(&self, tenant_id: &str, status: TenantStatus) -> DbResult<Committed<Tenant>> {
        let mut tx = begin(&self.pool).await?;
        let before = fetch_tenant(&mut *tx, tenant_id, Visibility::Live)
            .await?
            .ok_or_else(|| DbError::not_found("Tenant", tenant_id))?;

        let now = now();
        sqlx::query("UPDATE tenants SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(tenant_id)
            .bind(status)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let mut after = before.clone();
        after.status = status;
        after.updated_at = now;

        let events = tenant_update_events(&before, &after);
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        debug!(tenant_id = %tenant_id, status = ?status, "Tenant status set");
        Ok(Committed::new(after, events))
    }

    /// Points the tenant at another plan, or none.
    pub async fn change_plan(&self, ctx: &TenantContext, plan_id: Option<&str>) -> DbResult<Tenant> {
        let mut tx = begin(&self.pool).await?;
        if let Some(plan_id) = plan_id {
            let live: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM plans WHERE id = ?1 AND deleted_at IS NULL",
            )
            .bind(plan_id)
            .fetch_one(&mut *tx)
            .await?;
            if live == 0 {
                return Err(DbError::not_found("Plan", plan_id));
            }
        }

        sqlx::query(
            "UPDATE tenants SET plan_id = ?2, updated_at = ?3 WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(ctx.tenant_id())
        .bind(plan_id)
        .bind(now())
        .execute(&mut *tx)
        .await?;

        let tenant = fetch_tenant(&mut *tx, ctx.tenant_id(), Visibility::Live)
            .await?
            .ok_or_else(|| DbError::not_found("Tenant", ctx.tenant_id()))?;
        commit(tx).await?;
        Ok(tenant)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub async fn settings(&self, ctx: &TenantContext) -> DbResult<Map<String, Value>> {
        let tenant = fetch_tenant(&self.pool, ctx.tenant_id(), Visibility::Live)
            .await?
            .ok_or_else(|| DbError::not_found("Tenant", ctx.tenant_id()))?;
        Ok(tenant.settings)
    }

    /// Sets one settings key (read-modify-write in a transaction).
    pub async fn set_setting(
        &self,
        ctx: &TenantContext,
        key: &str,
        value: Value,
    ) -> DbResult<Tenant> {
        let mut tx = begin(&self.pool).await?;
        let mut tenant = fetch_tenant(&mut *tx, ctx.tenant_id(), Visibility::Live)
            .await?
            .ok_or_else(|| DbError::not_found("Tenant", ctx.tenant_id()))?;

        tenant.set_setting(key, value);
        tenant.updated_at = now();

        sqlx::query("UPDATE tenants SET settings = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&tenant.id)
            .bind(Json(&tenant.settings))
            .bind(tenant.updated_at)
            .execute(&mut *tx)
            .await?;
        commit(tx).await?;

        debug!(tenant_id = %tenant.id, key, "Tenant setting updated");
        Ok(tenant)
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Tombstones the tenant and everything it owns.
    pub async fn delete(&self, tenant_id: &str) -> DbResult<CascadeReport> {
        let mut tx = begin(&self.pool).await?;
        if fetch_tenant(&mut *tx, tenant_id, Visibility::Live).await?.is_none() {
            return Err(DbError::not_found("Tenant", tenant_id));
        }

        let mut cascade = Cascade::new(tenant_id, format!("tenant {}", tenant_id));
        cascade.tenant(&mut tx).await?;
        let report = cascade.finish();
        commit(tx).await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use vitrine_core::input::NewDomain;
    use vitrine_core::DomainKind;

    fn new_tenant(name: &str, email: &str) -> NewTenant {
        NewTenant {
            name: name.into(),
            owner_name: "Owner".into(),
            owner_email: email.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_resolve() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let created = db
            .tenants()
            .create(new_tenant("Acme", "Owner@Acme.io"))
            .await
            .unwrap();
        assert!(matches!(created.events[0], DomainEvent::TenantCreated { .. }));

        let tenant = created.value;
        let ctx = db.tenants().context_for(&tenant.id).await.unwrap();
        assert_eq!(ctx.tenant_id(), tenant.id);

        let owner = db.users().get(&tenant.owner_id).await.unwrap().unwrap();
        assert_eq!(owner.tenant_id.as_deref(), Some(tenant.id.as_str()));
        assert_eq!(owner.email, "owner@acme.io");
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.tenants().create(new_tenant("Acme", "a@acme.io")).await.unwrap();
        let err = db
            .tenants()
            .create(new_tenant("Acme", "b@acme.io"))
            .await
            .unwrap_err();
        assert!(err.is_unique_on("name"));
    }

    #[tokio::test]
    async fn test_suspended_tenant_has_no_context() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create(new_tenant("Acme", "a@acme.io"))
            .await
            .unwrap()
            .value;

        let changed = db
            .tenants()
            .set_status(&tenant.id, TenantStatus::Suspended)
            .await
            .unwrap();
        assert_eq!(changed.events.len(), 1);

        let err = db.tenants().context_for(&tenant.id).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Scope { .. })));

        let same = db
            .tenants()
            .set_status(&tenant.id, TenantStatus::Suspended)
            .await
            .unwrap();
        assert!(same.events.is_empty());
    }

    #[tokio::test]
    async fn test_context_for_host() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create(new_tenant("Acme", "a@acme.io"))
            .await
            .unwrap()
            .value;
        let ctx = db.tenants().context_for(&tenant.id).await.unwrap();
        db.domains()
            .add(&ctx, NewDomain::new("Shop.Acme.io", DomainKind::Custom))
            .await
            .unwrap();

        let resolved = db.tenants().context_for_host("shop.acme.io").await.unwrap();
        assert_eq!(resolved, ctx);
        assert!(db.tenants().context_for_host("other.io").await.is_err());
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create(new_tenant("Acme", "a@acme.io"))
            .await
            .unwrap()
            .value;
        let ctx = db.tenants().context_for(&tenant.id).await.unwrap();

        db.tenants()
            .set_setting(&ctx, "currency", Value::from("EUR"))
            .await
            .unwrap();
        let settings = db.tenants().settings(&ctx).await.unwrap();
        assert_eq!(settings.get("currency"), Some(&Value::from("EUR")));
    }

    #[tokio::test]
    async fn test_delete_tombstones_tenant() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create(new_tenant("Acme", "a@acme.io"))
            .await
            .unwrap()
            .value;

        let report = db.tenants().delete(&tenant.id).await.unwrap();
        assert_eq!(report.tombstoned("tenants"), 1);
        assert_eq!(report.tombstoned("users"), 1);
        assert!(db.tenants().get(&tenant.id, Visibility::Live).await.unwrap().is_none());
        assert!(db
            .tenants()
            .get(&tenant.id, Visibility::IncludeTombstoned)
            .await
            .unwrap()
            .is_some());

        // name is free again
        db.tenants().create(new_tenant("Acme", "a@acme.io")).await.unwrap();
    }
}
