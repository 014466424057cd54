//! # Brand Repository
//!
//! Brands are referenced by products with set-null semantics: deleting a
//! brand leaves its products live with `brand_id = NULL`.

use std::collections::HashSet;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use vitrine_core::input::{BrandUpdate, NewBrand};
use vitrine_core::{Brand, TenantContext};

use crate::cascade::{Cascade, CascadeReport};
use crate::error::{DbError, DbResult};
use crate::identifier::{next_free_slug, should_retry, SlugScope};
use crate::pool::CatalogPolicy;
use crate::repository::{begin, commit, ensure_live, new_id, now};

const BRAND_COLUMNS: &str = "id, tenant_id, name, slug, description, website_url, image_path, \
                             sort_order, is_active, created_at, updated_at, deleted_at";

async fn fetch_brand(conn: &mut SqliteConnection, tenant_id: &str, id: &str) -> DbResult<Brand> {
    let sql = format!(
        "SELECT {} FROM brands WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        BRAND_COLUMNS
    );
    sqlx::query_as::<_, Brand>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Brand", id))
}

/// Inserts or rewrites a brand row.
async fn write_brand(conn: &mut SqliteConnection, brand: &Brand, insert: bool) -> Result<(), sqlx::Error> {
    let query = if insert {
        sqlx::query(
            r#"
            INSERT INTO brands (
                id, tenant_id, name, slug, description, website_url, image_path,
                sort_order, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
        )
    } else {
        sqlx::query(
            r#"
            UPDATE brands
            SET name = ?3, slug = ?4, description = ?5, website_url = ?6, image_path = ?7,
                sort_order = ?8, is_active = ?9, updated_at = ?10
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
    };
    query
        .bind(&brand.id)
        .bind(&brand.tenant_id)
        .bind(&brand.name)
        .bind(&brand.slug)
        .bind(&brand.description)
        .bind(&brand.website_url)
        .bind(&brand.image_path)
        .bind(brand.sort_order)
        .bind(brand.is_active)
        .bind(brand.updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Repository for brands.
#[derive(Debug, Clone)]
pub struct BrandRepository {
    pool: SqlitePool,
    policy: CatalogPolicy,
}

impl BrandRepository {
    pub fn new(pool: SqlitePool, policy: CatalogPolicy) -> Self {
        BrandRepository { pool, policy }
    }

    /// Allocates a slug and writes the row, retrying on slug races.
    async fn save(
        &self,
        conn: &mut SqliteConnection,
        brand: &mut Brand,
        insert: bool,
        reslug: bool,
    ) -> DbResult<()> {
        let mut collided = HashSet::new();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if reslug {
                let exclude = if insert { None } else { Some(brand.id.as_str()) };
                brand.slug = next_free_slug(
                    conn,
                    SlugScope::Brands,
                    &brand.tenant_id,
                    &brand.name,
                    exclude,
                    &collided,
                )
                .await?;
            }
            match write_brand(conn, brand, insert).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let err = DbError::from(e);
                    if !reslug || !should_retry(&err, "slug", attempt, self.policy.id_max_attempts) {
                        return Err(err);
                    }
                    collided.insert(brand.slug.clone());
                }
            }
        }
    }

    pub async fn create(&self, ctx: &TenantContext, input: NewBrand) -> DbResult<Brand> {
        input.validate()?;
        let now = now();
        let mut brand = Brand {
            id: new_id(),
            tenant_id: ctx.tenant_id().to_string(),
            name: input.name.trim().to_string(),
            slug: String::new(),
            description: input.description,
            website_url: input.website_url,
            image_path: input.image_path,
            sort_order: input.sort_order,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let mut tx = begin(&self.pool).await?;
        self.save(&mut tx, &mut brand, true, true).await?;
        commit(tx).await?;

        debug!(tenant_id = %brand.tenant_id, id = %brand.id, slug = %brand.slug, "Brand created");
        Ok(brand)
    }

    pub async fn update(&self, ctx: &TenantContext, id: &str, input: BrandUpdate) -> DbResult<Brand> {
        input.validate()?;
        let mut tx = begin(&self.pool).await?;
        let before = fetch_brand(&mut tx, ctx.tenant_id(), id).await?;

        let mut brand = before.clone();
        if let Some(name) = input.name {
            brand.name = name.trim().to_string();
        }
        if let Some(description) = input.description {
            brand.description = description;
        }
        if let Some(website_url) = input.website_url {
            brand.website_url = website_url;
        }
        if let Some(image_path) = input.image_path {
            brand.image_path = image_path;
        }
        if let Some(sort_order) = input.sort_order {
            brand.sort_order = sort_order;
        }
        if let Some(is_active) = input.is_active {
            brand.is_active = is_active;
        }
        brand.updated_at = now();

        let reslug = brand.name != before.name;
        self.save(&mut tx, &mut brand, false, reslug).await?;
        commit(tx).await?;
        Ok(brand)
    }

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> DbResult<Brand> {
        let mut conn = self.pool.acquire().await?;
        fetch_brand(&mut conn, ctx.tenant_id(), id).await
    }

    pub async fn get_by_slug(&self, ctx: &TenantContext, slug: &str) -> DbResult<Option<Brand>> {
        let sql = format!(
            "SELECT {} FROM brands WHERE slug = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
            BRAND_COLUMNS
        );
        let brand = sqlx::query_as::<_, Brand>(&sql)
            .bind(slug)
            .bind(ctx.tenant_id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(brand)
    }

    pub async fn list(&self, ctx: &TenantContext) -> DbResult<Vec<Brand>> {
        let sql = format!(
            "SELECT {} FROM brands WHERE tenant_id = ?1 AND deleted_at IS NULL \
             ORDER BY sort_order, name",
            BRAND_COLUMNS
        );
        let brands = sqlx::query_as::<_, Brand>(&sql)
            .bind(ctx.tenant_id())
            .fetch_all(&self.pool)
            .await?;
        Ok(brands)
    }

    /// Tombstones the brand and clears it from products.
    pub async fn delete(&self, ctx: &TenantContext, id: &str) -> DbResult<CascadeReport> {
        let mut tx = begin(&self.pool).await?;
        ensure_live(&mut tx, "brands", "Brand", ctx.tenant_id(), id).await?;

        let mut cascade = Cascade::new(ctx.tenant_id(), format!("brand {}", id));
        cascade.brand(&mut tx, id).await?;
        let report = cascade.finish();
        commit(tx).await?;

        info!(tenant_id = %ctx.tenant_id(), id = %id, "Brand deleted");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use vitrine_core::input::NewTenant;

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

    #[tokio::test]
    async fn test_create_update_get() {
        let (db, ctx) = setup().await;
        let brand = db.brands().create(&ctx, NewBrand::new("North Face")).await.unwrap();
        assert_eq!(brand.slug, "north-face");

        let updated = db
            .brands()
            .update(
                &ctx,
                &brand.id,
                BrandUpdate {
                    website_url: Some(Some("https://example.com".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.slug, "north-face");

        let stored = db.brands().get(&ctx, &brand.id).await.unwrap();
        assert_eq!(stored.website_url.as_deref(), Some("https://example.com"));
    }

    #[tokio::test]
    async fn test_tombstoned_slug_is_reusable() {
        let (db, ctx) = setup().await;
        let first = db.brands().create(&ctx, NewBrand::new("Acme")).await.unwrap();
        db.brands().delete(&ctx, &first.id).await.unwrap();

        let second = db.brands().create(&ctx, NewBrand::new("Acme")).await.unwrap();
        assert_eq!(second.slug, "acme");
        assert_eq!(db.brands().list(&ctx).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_read() {
        let (db, ctx) = setup().await;
        let brand = db.brands().create(&ctx, NewBrand::new("Acme")).await.unwrap();
        let other = TenantContext::resolved("someone-else");
        assert!(matches!(
            db.brands().get(&other, &brand.id).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
