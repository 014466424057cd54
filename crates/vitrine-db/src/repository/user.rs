//! # User Repository
//!
//! Users are global rows with an optional tenant link. Each user has at
//! most one live `user_details` row; saving it is an upsert that queues
//! `ProfileUpdated`.

use sqlx::SqlitePool;
use tracing::debug;
use vitrine_core::input::{NewUser, UserDetailInput};
use vitrine_core::{Committed, DomainEvent, TenantContext, User, UserDetail, UserStatus};

use crate::error::{DbError, DbResult};
use crate::repository::outbox::enqueue;
use crate::repository::{begin, commit, new_id, now};

const USER_COLUMNS: &str = "id, tenant_id, name, email, status, created_at, updated_at, deleted_at";

const DETAIL_COLUMNS: &str = "id, tenant_id, user_id, full_name, secondary_email, phone_number, \
                              address, city, postal_code, country, preferred_language, \
                              image_path, created_at, updated_at, deleted_at";

/// Repository for users and their profile details.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Creates a user, optionally inside a tenant. Emails are stored lowercase.
    pub async fn create(&self, ctx: Option<&TenantContext>, input: NewUser) -> DbResult<User> {
        input.validate()?;
        let now = now();
        let user = User {
            id: new_id(),
            tenant_id: ctx.map(|c| c.tenant_id().to_string()),
            name: input.name.trim().to_string(),
            email: input.email.trim().to_lowercase(),
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, tenant_id, name, email, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&user.id)
        .bind(&user.tenant_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.status)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(user_id = %user.id, "User created");
        Ok(user)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = ?1 AND deleted_at IS NULL",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE email = ?1 AND deleted_at IS NULL",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn list_for_tenant(&self, ctx: &TenantContext) -> DbResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE tenant_id = ?1 AND deleted_at IS NULL ORDER BY name",
            USER_COLUMNS
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(ctx.tenant_id())
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn set_status(&self, id: &str, status: UserStatus) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE users SET status = ?2, updated_at = ?3 WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(status)
        .bind(now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        Ok(())
    }

    // =========================================================================
    // Profile Details
    // =========================================================================

    pub async fn detail(&self, user_id: &str) -> DbResult<Option<UserDetail>> {
        let sql = format!(
            "SELECT {} FROM user_details WHERE user_id = ?1 AND deleted_at IS NULL",
            DETAIL_COLUMNS
        );
        let detail = sqlx::query_as::<_, UserDetail>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(detail)
    }

    /// Creates or updates the user's profile. `None` fields keep their value.
    pub async fn update_detail(
        &self,
        user_id: &str,
        input: UserDetailInput,
    ) -> DbResult<Committed<UserDetail>> {
        input.validate()?;
        let mut tx = begin(&self.pool).await?;

        let tenant_id: Option<Option<String>> = sqlx::query_scalar(
            "SELECT tenant_id FROM users WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let tenant_id = tenant_id.ok_or_else(|| DbError::not_found("User", user_id))?;

        let sql = format!(
            "SELECT {} FROM user_details WHERE user_id = ?1 AND deleted_at IS NULL",
            DETAIL_COLUMNS
        );
        let existing = sqlx::query_as::<_, UserDetail>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let now = now();
        let mut detail = existing.unwrap_or_else(|| UserDetail {
            id: new_id(),
            tenant_id: tenant_id.clone(),
            user_id: user_id.to_string(),
            full_name: None,
            secondary_email: None,
            phone_number: None,
            address: None,
            city: None,
            postal_code: None,
            country: None,
            preferred_language: None,
            image_path: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        });

        let UserDetailInput {
            full_name,
            secondary_email,
            phone_number,
            address,
            city,
            postal_code,
            country,
            preferred_language,
            image_path,
        } = input;
        detail.full_name = full_name.or(detail.full_name);
        detail.secondary_email = secondary_email.or(detail.secondary_email);
        detail.phone_number = phone_number.or(detail.phone_number);
        detail.address = address.or(detail.address);
        detail.city = city.or(detail.city);
        detail.postal_code = postal_code.or(detail.postal_code);
        detail.country = country.or(detail.country);
        detail.preferred_language = preferred_language.or(detail.preferred_language);
        detail.image_path = image_path.or(detail.image_path);
        detail.updated_at = now;

        sqlx::query(
            r#"
            INSERT INTO user_details (
                id, tenant_id, user_id, full_name, secondary_email, phone_number,
                address, city, postal_code, country, preferred_language, image_path,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT (id) DO UPDATE SET
                full_name = excluded.full_name,
                secondary_email = excluded.secondary_email,
                phone_number = excluded.phone_number,
                address = excluded.address,
                city = excluded.city,
                postal_code = excluded.postal_code,
                country = excluded.country,
                preferred_language = excluded.preferred_language,
                image_path = excluded.image_path,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&detail.id)
        .bind(&detail.tenant_id)
        .bind(&detail.user_id)
        .bind(&detail.full_name)
        .bind(&detail.secondary_email)
        .bind(&detail.phone_number)
        .bind(&detail.address)
        .bind(&detail.city)
        .bind(&detail.postal_code)
        .bind(&detail.country)
        .bind(&detail.preferred_language)
        .bind(&detail.image_path)
        .bind(detail.created_at)
        .bind(detail.updated_at)
        .execute(&mut *tx)
        .await?;

        let events = vec![DomainEvent::ProfileUpdated {
            user_id: user_id.to_string(),
            tenant_id,
        }];
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        Ok(Committed::new(detail, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Sam".into(),
            email: email.into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_by_email() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = db.users().create(None, new_user("Sam@Example.com")).await.unwrap();
        assert!(user.tenant_id.is_none());

        let found = db.users().get_by_email("sam@example.COM").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        let err = db.users().create(None, new_user("sam@example.com")).await.unwrap_err();
        assert!(err.is_unique_on("email"));
    }

    #[tokio::test]
    async fn test_update_detail_is_an_upsert() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = db.users().create(None, new_user("sam@example.com")).await.unwrap();

        let first = db
            .users()
            .update_detail(
                &user.id,
                UserDetailInput {
                    full_name: Some("Sam Lee".into()),
                    city: Some("Lisbon".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(first.events[0], DomainEvent::ProfileUpdated { .. }));

        let second = db
            .users()
            .update_detail(
                &user.id,
                UserDetailInput {
                    city: Some("Porto".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .value;
        assert_eq!(second.id, first.value.id);
        assert_eq!(second.full_name.as_deref(), Some("Sam Lee"));
        assert_eq!(second.city.as_deref(), Some("Porto"));

        let stored = db.users().detail(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.city.as_deref(), Some("Porto"));
        assert_eq!(db.outbox().count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_detail_unknown_user() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .users()
            .update_detail("ghost", UserDetailInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
