//! # Media Repository
//!
//! Images and videos attached to products, combos and variants.
//!
//! At most one live media row per owner is primary. Making a row primary
//! clears the other primaries of the same owner first, in the same
//! transaction; `idx_media_primary_live` rejects anything that slips past.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use vitrine_core::input::NewMedia;
use vitrine_core::{EntityKind, Media, OwnerRef, TenantContext};

use crate::error::{DbError, DbResult};
use crate::repository::{begin, commit, ensure_owner, new_id, now};

const MEDIA_COLUMNS: &str = "id, tenant_id, mediable_type, mediable_id, media_type, file_path, \
                             alt_text, is_primary, sort_order, created_at, updated_at, deleted_at";

async fn fetch_media(conn: &mut SqliteConnection, tenant_id: &str, id: &str) -> DbResult<Media> {
    let sql = format!(
        "SELECT {} FROM media WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        MEDIA_COLUMNS
    );
    sqlx::query_as::<_, Media>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Media", id))
}

/// Clears every live primary of the owner except `keep_id`.
async fn clear_primaries(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    kind: EntityKind,
    owner_id: &str,
    keep_id: &str,
) -> DbResult<u64> {
    let result = sqlx::query(
        "UPDATE media SET is_primary = 0, updated_at = ?5 \
         WHERE tenant_id = ?1 AND mediable_type = ?2 AND mediable_id = ?3 AND id <> ?4 \
         AND is_primary = 1 AND deleted_at IS NULL",
    )
    .bind(tenant_id)
    .bind(kind)
    .bind(owner_id)
    .bind(keep_id)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Repository for polymorphic media.
#[derive(Debug, Clone)]
pub struct MediaRepository {
    pool: SqlitePool,
}

impl MediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MediaRepository { pool }
    }

    pub async fn attach(&self, ctx: &TenantContext, owner: OwnerRef, input: NewMedia) -> DbResult<Media> {
        owner.ensure_mediable()?;
        input.validate()?;
        let tenant_id = ctx.tenant_id();

        let mut tx = begin(&self.pool).await?;
        ensure_owner(&mut tx, ctx, &owner).await?;

        let now = now();
        let media = Media {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            mediable_type: owner.kind,
            mediable_id: owner.id,
            media_type: input.media_type,
            file_path: input.file_path.trim().to_string(),
            alt_text: input.alt_text,
            is_primary: input.is_primary,
            sort_order: input.sort_order,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        if media.is_primary {
            clear_primaries(&mut tx, tenant_id, media.mediable_type, &media.mediable_id, &media.id)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO media (
                id, tenant_id, mediable_type, mediable_id, media_type, file_path, alt_text,
                is_primary, sort_order, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
        )
        .bind(&media.id)
        .bind(&media.tenant_id)
        .bind(media.mediable_type)
        .bind(&media.mediable_id)
        .bind(media.media_type)
        .bind(&media.file_path)
        .bind(&media.alt_text)
        .bind(media.is_primary)
        .bind(media.sort_order)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        commit(tx).await?;

        debug!(
            tenant_id = %tenant_id,
            owner = %media.mediable_type,
            owner_id = %media.mediable_id,
            primary = media.is_primary,
            "Media attached"
        );
        Ok(media)
    }

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> DbResult<Media> {
        let mut conn = self.pool.acquire().await?;
        fetch_media(&mut conn, ctx.tenant_id(), id).await
    }

    /// Makes `id` the only primary of its owner.
    pub async fn set_primary(&self, ctx: &TenantContext, id: &str) -> DbResult<Media> {
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        let mut media = fetch_media(&mut tx, tenant_id, id).await?;

        let cleared =
            clear_primaries(&mut tx, tenant_id, media.mediable_type, &media.mediable_id, id).await?;

        media.is_primary = true;
        media.updated_at = now();
        sqlx::query("UPDATE media SET is_primary = 1, updated_at = ?3 WHERE id = ?1 AND tenant_id = ?2")
            .bind(id)
            .bind(tenant_id)
            .bind(media.updated_at)
            .execute(&mut *tx)
            .await?;
        commit(tx).await?;

        debug!(media_id = %id, cleared, "Primary media set");
        Ok(media)
    }

    pub async fn clear_primary(&self, ctx: &TenantContext, id: &str) -> DbResult<Media> {
        let tenant_id = ctx.tenant_id();
        let mut tx = begin(&self.pool).await?;
        let mut media = fetch_media(&mut tx, tenant_id, id).await?;

        media.is_primary = false;
        media.updated_at = now();
        sqlx::query("UPDATE media SET is_primary = 0, updated_at = ?3 WHERE id = ?1 AND tenant_id = ?2")
            .bind(id)
            .bind(tenant_id)
            .bind(media.updated_at)
            .execute(&mut *tx)
            .await?;
        commit(tx).await?;
        Ok(media)
    }

    pub async fn primary_for(&self, ctx: &TenantContext, owner: &OwnerRef) -> DbResult<Option<Media>> {
        let sql = format!(
            "SELECT {} FROM media WHERE tenant_id = ?1 AND mediable_type = ?2 AND mediable_id = ?3 \
             AND is_primary = 1 AND deleted_at IS NULL",
            MEDIA_COLUMNS
        );
        let media = sqlx::query_as::<_, Media>(&sql)
            .bind(ctx.tenant_id())
            .bind(owner.kind)
            .bind(&owner.id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(media)
    }

    /// Live media of an owner, primary first, then by sort order.
    pub async fn list_for(&self, ctx: &TenantContext, owner: &OwnerRef) -> DbResult<Vec<Media>> {
        let sql = format!(
            "SELECT {} FROM media WHERE tenant_id = ?1 AND mediable_type = ?2 AND mediable_id = ?3 \
             AND deleted_at IS NULL ORDER BY is_primary DESC, sort_order, created_at",
            MEDIA_COLUMNS
        );
        let media = sqlx::query_as::<_, Media>(&sql)
            .bind(ctx.tenant_id())
            .bind(owner.kind)
            .bind(&owner.id)
            .fetch_all(&self.pool)
            .await?;
        Ok(media)
    }

    /// Tombstones one media row. A removed primary leaves the owner without one.
    pub async fn remove(&self, ctx: &TenantContext, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE media SET deleted_at = ?3, updated_at = ?3 \
             WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(ctx.tenant_id())
        .bind(now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Media", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use vitrine_core::input::{NewProduct, NewTenant};
    use vitrine_core::storage::PublicUrlResolver;

    async fn setup() -> (Database, TenantContext, OwnerRef) {
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
            .create_product(&ctx, NewProduct::named("Shoe"))
            .await
            .unwrap()
            .value;
        let owner = OwnerRef::product(product.specialization.id());
        (db, ctx, owner)
    }

    async fn primaries(db: &Database, ctx: &TenantContext, owner: &OwnerRef) -> usize {
        db.media()
            .list_for(ctx, owner)
            .await
            .unwrap()
            .iter()
            .filter(|m| m.is_primary)
            .count()
    }

    #[tokio::test]
    async fn test_primary_stays_exclusive() {
        let (db, ctx, owner) = setup().await;
        let media = db.media();

        let a = media.attach(&ctx, owner.clone(), NewMedia::image("a.jpg").primary()).await.unwrap();
        let b = media.attach(&ctx, owner.clone(), NewMedia::image("b.jpg").primary()).await.unwrap();
        let c = media.attach(&ctx, owner.clone(), NewMedia::image("c.jpg")).await.unwrap();
        assert_eq!(primaries(&db, &ctx, &owner).await, 1);
        assert_eq!(media.primary_for(&ctx, &owner).await.unwrap().unwrap().id, b.id);

        media.set_primary(&ctx, &c.id).await.unwrap();
        media.set_primary(&ctx, &a.id).await.unwrap();
        assert_eq!(primaries(&db, &ctx, &owner).await, 1);
        assert_eq!(media.list_for(&ctx, &owner).await.unwrap()[0].id, a.id);

        media.clear_primary(&ctx, &a.id).await.unwrap();
        assert_eq!(primaries(&db, &ctx, &owner).await, 0);
        assert!(media.primary_for(&ctx, &owner).await.unwrap().is_none());

        media.set_primary(&ctx, &b.id).await.unwrap();
        media.remove(&ctx, &b.id).await.unwrap();
        assert_eq!(primaries(&db, &ctx, &owner).await, 0);
        assert_eq!(media.list_for(&ctx, &owner).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_items_cannot_carry_media() {
        let (db, ctx, _) = setup().await;
        let err = db
            .media()
            .attach(&ctx, OwnerRef::item("i1"), NewMedia::image("a.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }

    #[tokio::test]
    async fn test_url_comes_from_resolver() {
        let (db, ctx, owner) = setup().await;
        let media = db
            .media()
            .attach(&ctx, owner, NewMedia::image("products/shoe.jpg"))
            .await
            .unwrap();
        assert_eq!(media.file_path, "products/shoe.jpg");

        let resolver = PublicUrlResolver::new("https://cdn.example.com");
        assert_eq!(media.url_with(&resolver), "https://cdn.example.com/products/shoe.jpg");
    }
}
