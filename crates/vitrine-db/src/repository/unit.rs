//! # Unit Repository
//!
//! Units of measure. Products and variants reference them with set-null
//! semantics.

use std::collections::HashSet;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use vitrine_core::input::{NewUnit, UnitUpdate};
use vitrine_core::{TenantContext, Unit};

use crate::cascade::{Cascade, CascadeReport};
use crate::error::{DbError, DbResult};
use crate::identifier::{next_free_slug, should_retry, SlugScope};
use crate::pool::CatalogPolicy;
use crate::repository::{begin, commit, ensure_live, new_id, now};

const UNIT_COLUMNS: &str = "id, tenant_id, name, slug, is_active, created_at, updated_at, deleted_at";

async fn fetch_unit(conn: &mut SqliteConnection, tenant_id: &str, id: &str) -> DbResult<Unit> {
    let sql = format!(
        "SELECT {} FROM units WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        UNIT_COLUMNS
    );
    sqlx::query_as::<_, Unit>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Unit", id))
}

/// Repository for units of measure.
#[derive(Debug, Clone)]
pub struct UnitRepository {
    pool: SqlitePool,
    policy: CatalogPolicy,
}

impl UnitRepository {
    pub fn new(pool: SqlitePool, policy: CatalogPolicy) -> Self {
        UnitRepository { pool, policy }
    }

    pub async fn create(&self, ctx: &TenantContext, input: NewUnit) -> DbResult<Unit> {
        input.validate()?;
        let now = now();
        let mut unit = Unit {
            id: new_id(),
            tenant_id: ctx.tenant_id().to_string(),
            name: input.name.trim().to_string(),
            slug: String::new(),
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let mut tx = begin(&self.pool).await?;
        let mut collided = HashSet::new();
        let mut attempt = 0;
        loop {
            attempt += 1;
            unit.slug = next_free_slug(
                &mut tx,
                SlugScope::Units,
                &unit.tenant_id,
                &unit.name,
                None,
                &collided,
            )
            .await?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO units (id, tenant_id, name, slug, is_active, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                "#,
            )
            .bind(&unit.id)
            .bind(&unit.tenant_id)
            .bind(&unit.name)
            .bind(&unit.slug)
            .bind(unit.is_active)
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
                    collided.insert(unit.slug.clone());
                }
            }
        }
        commit(tx).await?;

        debug!(tenant_id = %unit.tenant_id, id = %unit.id, slug = %unit.slug, "Unit created");
        Ok(unit)
    }

    pub async fn update(&self, ctx: &TenantContext, id: &str, input: UnitUpdate) -> DbResult<Unit> {
        input.validate()?;
        let mut tx = begin(&self.pool).await?;
        let before = fetch_unit(&mut tx, ctx.tenant_id(), id).await?;

        let mut unit = before.clone();
        if let Some(name) = input.name {
            unit.name = name.trim().to_string();
        }
        if let Some(is_active) = input.is_active {
            unit.is_active = is_active;
        }
        unit.updated_at = now();

        let reslug = unit.name != before.name;
        let mut collided = HashSet::new();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if reslug {
                unit.slug = next_free_slug(
                    &mut tx,
                    SlugScope::Units,
                    &unit.tenant_id,
                    &unit.name,
                    Some(id),
                    &collided,
                )
                .await?;
            }

            let updated = sqlx::query(
                "UPDATE units SET name = ?3, slug = ?4, is_active = ?5, updated_at = ?6 \
                 WHERE id = ?1 AND tenant_id = ?2",
            )
            .bind(id)
            .bind(&unit.tenant_id)
            .bind(&unit.name)
            .bind(&unit.slug)
            .bind(unit.is_active)
            .bind(unit.updated_at)
            .execute(&mut *tx)
            .await;

            match updated {
                Ok(_) => break,
                Err(e) => {
                    let err = DbError::from(e);
                    if !reslug || !should_retry(&err, "slug", attempt, self.policy.id_max_attempts) {
                        return Err(err);
                    }
                    collided.insert(unit.slug.clone());
                }
            }
        }
        commit(tx).await?;
        Ok(unit)
    }

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> DbResult<Unit> {
        let mut conn = self.pool.acquire().await?;
        fetch_unit(&mut conn, ctx.tenant_id(), id).await
    }

    pub async fn get_by_slug(&self, ctx: &TenantContext, slug: &str) -> DbResult<Option<Unit>> {
        let sql = format!(
            "SELECT {} FROM units WHERE slug = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
            UNIT_COLUMNS
        );
        let unit = sqlx::query_as::<_, Unit>(&sql)
            .bind(slug)
            .bind(ctx.tenant_id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(unit)
    }

    pub async fn list(&self, ctx: &TenantContext) -> DbResult<Vec<Unit>> {
        let sql = format!(
            "SELECT {} FROM units WHERE tenant_id = ?1 AND deleted_at IS NULL ORDER BY name",
            UNIT_COLUMNS
        );
        let units = sqlx::query_as::<_, Unit>(&sql)
            .bind(ctx.tenant_id())
            .fetch_all(&self.pool)
            .await?;
        Ok(units)
    }

    /// Tombstones the unit and clears it from products and variants.
    pub async fn delete(&self, ctx: &TenantContext, id: &str) -> DbResult<CascadeReport> {
        let mut tx = begin(&self.pool).await?;
        ensure_live(&mut tx, "units", "Unit", ctx.tenant_id(), id).await?;

        let mut cascade = Cascade::new(ctx.tenant_id(), format!("unit {}", id));
        cascade.unit(&mut tx, id).await?;
        let report = cascade.finish();
        commit(tx).await?;

        info!(tenant_id = %ctx.tenant_id(), id = %id, "Unit deleted");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use vitrine_core::input::NewTenant;

    #[tokio::test]
    async fn test_unit_lifecycle() {
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

        let kg = db.units().create(&ctx, NewUnit::new("Kilogram")).await.unwrap();
        let renamed = db
            .units()
            .update(
                &ctx,
                &kg.id,
                UnitUpdate {
                    name: Some("Kilo gram".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.slug, "kilo-gram");
        assert!(db.units().get_by_slug(&ctx, "kilogram").await.unwrap().is_none());

        let report = db.units().delete(&ctx, &kg.id).await.unwrap();
        assert_eq!(report.tombstoned("units"), 1);
        assert!(db.units().list(&ctx).await.unwrap().is_empty());
    }
}
