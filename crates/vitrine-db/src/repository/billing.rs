//! # Billing Repositories
//!
//! Plans are global; subscriptions belong to a tenant. A plan update that
//! touches status, price or features fans a single `PlanUpdated` out to
//! every live tenant on the plan.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::{debug, info};
use vitrine_core::events::{plan_update_events, subscription_update_events};
use vitrine_core::input::{NewPlan, NewSubscription, PlanUpdate};
use vitrine_core::{
    BillingCycle, Committed, DomainEvent, Plan, PlanStatus, Subscription, SubscriptionStatus,
    TenantContext,
};

use crate::error::{DbError, DbResult};
use crate::repository::outbox::enqueue;
use crate::repository::{begin, commit, new_id, now, Visibility};

// =============================================================================
// Plans
// =============================================================================

const PLAN_COLUMNS: &str = "id, name, description, price_cents, currency, features, \
                            billing_cycle, status, created_at, updated_at, deleted_at";

/// Row shape; `features` is a JSON array in a TEXT column.
#[derive(Debug, FromRow)]
struct PlanRow {
    id: String,
    name: String,
    description: Option<String>,
    price_cents: i64,
    currency: String,
    features: Json<Vec<String>>,
    billing_cycle: BillingCycle,
    status: PlanStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Plan {
            id: row.id,
            name: row.name,
            description: row.description,
            price_cents: row.price_cents,
            currency: row.currency,
            features: row.features.0,
            billing_cycle: row.billing_cycle,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

async fn fetch_plan<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: &str,
    visibility: Visibility,
) -> DbResult<Option<Plan>> {
    let sql = format!(
        "SELECT {} FROM plans WHERE id = ?1{}",
        PLAN_COLUMNS,
        visibility.filter()
    );
    let row = sqlx::query_as::<_, PlanRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(Plan::from))
}

/// Repository for global billing plans.
#[derive(Debug, Clone)]
pub struct PlanRepository {
    pool: SqlitePool,
}

impl PlanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PlanRepository { pool }
    }

    pub async fn create(&self, input: NewPlan) -> DbResult<Plan> {
        input.validate()?;
        let now = now();
        let plan = Plan {
            id: new_id(),
            name: input.name.trim().to_string(),
            description: input.description,
            price_cents: input.price_cents,
            currency: input.currency.to_ascii_uppercase(),
            features: input.features,
            billing_cycle: input.billing_cycle,
            status: input.status,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO plans (
                id, name, description, price_cents, currency, features,
                billing_cycle, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.price_cents)
        .bind(&plan.currency)
        .bind(Json(&plan.features))
        .bind(plan.billing_cycle)
        .bind(plan.status)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(plan_id = %plan.id, name = %plan.name, "Plan created");
        Ok(plan)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Plan>> {
        fetch_plan(&self.pool, id, Visibility::Live).await
    }

    pub async fn list(&self) -> DbResult<Vec<Plan>> {
        let sql = format!(
            "SELECT {} FROM plans WHERE deleted_at IS NULL ORDER BY price_cents, name",
            PLAN_COLUMNS
        );
        let rows = sqlx::query_as::<_, PlanRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Plan::from).collect())
    }

    /// Updates a plan and notifies the tenants on it.
    pub async fn update(&self, id: &str, input: PlanUpdate) -> DbResult<Committed<Plan>> {
        input.validate()?;
        let mut tx = begin(&self.pool).await?;
        let before = fetch_plan(&mut *tx, id, Visibility::Live)
            .await?
            .ok_or_else(|| DbError::not_found("Plan", id))?;

        let mut after = before.clone();
        if let Some(name) = input.name {
            after.name = name.trim().to_string();
        }
        if let Some(description) = input.description {
            after.description = description;
        }
        if let Some(price) = input.price_cents {
            after.price_cents = price;
        }
        if let Some(features) = input.features {
            after.features = features;
        }
        if let Some(cycle) = input.billing_cycle {
            after.billing_cycle = cycle;
        }
        if let Some(status) = input.status {
            after.status = status;
        }
        after.updated_at = now();

        sqlx::query(
            r#"
            UPDATE plans
            SET name = ?2, description = ?3, price_cents = ?4, features = ?5,
                billing_cycle = ?6, status = ?7, updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&after.name)
        .bind(&after.description)
        .bind(after.price_cents)
        .bind(Json(&after.features))
        .bind(after.billing_cycle)
        .bind(after.status)
        .bind(after.updated_at)
        .execute(&mut *tx)
        .await?;

        let tenant_ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM tenants WHERE plan_id = ?1 AND deleted_at IS NULL ORDER BY id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let events = plan_update_events(&before, &after, tenant_ids);
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        debug!(plan_id = %id, events = events.len(), "Plan updated");
        Ok(Committed::new(after, events))
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

const SUBSCRIPTION_COLUMNS: &str = "id, tenant_id, plan_id, status, currency, starts_at, ends_at, \
                                    trial_ends_at, cancelled_at, created_at, updated_at, deleted_at";

async fn fetch_subscription(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Subscription> {
    let sql = format!(
        "SELECT {} FROM subscriptions WHERE id = ?1 AND tenant_id = ?2 AND deleted_at IS NULL",
        SUBSCRIPTION_COLUMNS
    );
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Subscription", id))
}

async fn store_subscription(conn: &mut SqliteConnection, sub: &Subscription) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = ?2, ends_at = ?3, trial_ends_at = ?4, cancelled_at = ?5, updated_at = ?6
        WHERE id = ?1
        "#,
    )
    .bind(&sub.id)
    .bind(sub.status)
    .bind(sub.ends_at)
    .bind(sub.trial_ends_at)
    .bind(sub.cancelled_at)
    .bind(sub.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Repository for tenant subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    pool: SqlitePool,
}

impl SubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SubscriptionRepository { pool }
    }

    pub async fn subscribe(
        &self,
        ctx: &TenantContext,
        input: NewSubscription,
    ) -> DbResult<Committed<Subscription>> {
        input.validate()?;
        let mut tx = begin(&self.pool).await?;

        if fetch_plan(&mut *tx, &input.plan_id, Visibility::Live).await?.is_none() {
            return Err(DbError::not_found("Plan", input.plan_id.as_str()));
        }

        let now = now();
        let sub = Subscription {
            id: new_id(),
            tenant_id: ctx.tenant_id().to_string(),
            plan_id: input.plan_id,
            status: SubscriptionStatus::Active,
            currency: input.currency.to_ascii_uppercase(),
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            trial_ends_at: input.trial_ends_at,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, tenant_id, plan_id, status, currency, starts_at, ends_at,
                trial_ends_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(&sub.id)
        .bind(&sub.tenant_id)
        .bind(&sub.plan_id)
        .bind(sub.status)
        .bind(&sub.currency)
        .bind(sub.starts_at)
        .bind(sub.ends_at)
        .bind(sub.trial_ends_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let events = vec![DomainEvent::SubscriptionCreated {
            tenant_id: sub.tenant_id.clone(),
            subscription_id: sub.id.clone(),
            plan_id: sub.plan_id.clone(),
        }];
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;

        info!(tenant_id = %sub.tenant_id, plan_id = %sub.plan_id, "Subscription created");
        Ok(Committed::new(sub, events))
    }

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> DbResult<Subscription> {
        let mut conn = self.pool.acquire().await?;
        fetch_subscription(&mut conn, ctx.tenant_id(), id).await
    }

    pub async fn list_for(&self, ctx: &TenantContext) -> DbResult<Vec<Subscription>> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE tenant_id = ?1 AND deleted_at IS NULL \
             ORDER BY starts_at DESC",
            SUBSCRIPTION_COLUMNS
        );
        let subs = sqlx::query_as::<_, Subscription>(&sql)
            .bind(ctx.tenant_id())
            .fetch_all(&self.pool)
            .await?;
        Ok(subs)
    }

    /// Most recent subscription that is active at `at`.
    pub async fn active(&self, ctx: &TenantContext, at: DateTime<Utc>) -> DbResult<Option<Subscription>> {
        let subs = self.list_for(ctx).await?;
        Ok(subs.into_iter().find(|s| s.is_active_at(at)))
    }

    /// Cancels now; the subscription ends at the cancellation instant.
    pub async fn cancel(&self, ctx: &TenantContext, id: &str) -> DbResult<Committed<Subscription>> {
        let mut tx = begin(&self.pool).await?;
        let before = fetch_subscription(&mut tx, ctx.tenant_id(), id).await?;
        if before.is_cancelled() {
            return Ok(Committed::quiet(before));
        }

        let now = now();
        let mut after = before.clone();
        after.status = SubscriptionStatus::Cancelled;
        after.cancelled_at = Some(now);
        after.ends_at = Some(after.ends_at.map_or(now, |end| end.min(now)));
        after.updated_at = now;
        store_subscription(&mut tx, &after).await?;

        let events = subscription_update_events(&before, &after);
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;
        Ok(Committed::new(after, events))
    }

    /// Reactivates the subscription with a new end date.
    pub async fn renew(
        &self,
        ctx: &TenantContext,
        id: &str,
        ends_at: Option<DateTime<Utc>>,
    ) -> DbResult<Committed<Subscription>> {
        let mut tx = begin(&self.pool).await?;
        let before = fetch_subscription(&mut tx, ctx.tenant_id(), id).await?;

        let now = now();
        if let Some(end) = ends_at {
            if end <= now {
                return Err(vitrine_core::ValidationError::InvalidRange {
                    start: "now".to_string(),
                    end: "ends_at".to_string(),
                }
                .into());
            }
        }

        let mut after = before.clone();
        after.status = SubscriptionStatus::Active;
        after.cancelled_at = None;
        after.ends_at = ends_at;
        after.updated_at = now;
        store_subscription(&mut tx, &after).await?;

        let events = subscription_update_events(&before, &after);
        enqueue(&mut tx, &events).await?;
        commit(tx).await?;
        Ok(Committed::new(after, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use vitrine_core::input::NewTenant;

    fn basic_plan(name: &str) -> NewPlan {
        NewPlan {
            name: name.into(),
            description: None,
            price_cents: 1900,
            currency: "usd".into(),
            features: vec!["catalog".into()],
            billing_cycle: BillingCycle::Monthly,
            status: PlanStatus::Active,
        }
    }

    async fn tenant_on(db: &Database, name: &str, plan_id: &str) -> TenantContext {
        let tenant = db
            .tenants()
            .create(NewTenant {
                name: name.into(),
                owner_name: "Owner".into(),
                owner_email: format!("owner@{}.io", name.to_lowercase()),
                plan_id: Some(plan_id.into()),
                ..Default::default()
            })
            .await
            .unwrap()
            .value;
        db.tenants().context_for(&tenant.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_plan_features_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let plan = db.plans().create(basic_plan("Starter")).await.unwrap();
        let stored = db.plans().get(&plan.id).await.unwrap().unwrap();
        assert_eq!(stored.features, vec!["catalog"]);
        assert_eq!(stored.currency, "USD");
    }

    #[tokio::test]
    async fn test_plan_update_fans_out_to_tenants() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let plan = db.plans().create(basic_plan("Starter")).await.unwrap();
        let a = tenant_on(&db, "Alpha", &plan.id).await;
        let b = tenant_on(&db, "Beta", &plan.id).await;

        let renamed = db
            .plans()
            .update(
                &plan.id,
                PlanUpdate {
                    name: Some("Starter+".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(renamed.events.is_empty());

        let repriced = db
            .plans()
            .update(
                &plan.id,
                PlanUpdate {
                    price_cents: Some(2900),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        match &repriced.events[..] {
            [DomainEvent::PlanUpdated { tenant_ids, changed, .. }] => {
                let mut expected = vec![a.tenant_id().to_string(), b.tenant_id().to_string()];
                expected.sort();
                assert_eq!(tenant_ids, &expected);
                assert_eq!(changed, &vec!["price"]);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscription_cancel_and_renew() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let plan = db.plans().create(basic_plan("Starter")).await.unwrap();
        let ctx = tenant_on(&db, "Alpha", &plan.id).await;

        let now = Utc::now();
        let sub = db
            .subscriptions()
            .subscribe(
                &ctx,
                NewSubscription {
                    plan_id: plan.id.clone(),
                    currency: "USD".into(),
                    starts_at: now - Duration::days(1),
                    ends_at: Some(now + Duration::days(30)),
                    trial_ends_at: None,
                },
            )
            .await
            .unwrap();
        assert!(matches!(sub.events[0], DomainEvent::SubscriptionCreated { .. }));
        assert!(db.subscriptions().active(&ctx, Utc::now()).await.unwrap().is_some());

        let cancelled = db.subscriptions().cancel(&ctx, &sub.value.id).await.unwrap();
        assert!(cancelled.value.is_cancelled());
        assert_eq!(cancelled.events.len(), 1);
        assert!(db.subscriptions().active(&ctx, Utc::now()).await.unwrap().is_none());

        let again = db.subscriptions().cancel(&ctx, &sub.value.id).await.unwrap();
        assert!(again.events.is_empty());

        let renewed = db
            .subscriptions()
            .renew(&ctx, &sub.value.id, Some(Utc::now() + Duration::days(365)))
            .await
            .unwrap();
        assert_eq!(renewed.value.status, SubscriptionStatus::Active);
        assert!(renewed.value.cancelled_at.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_to_unknown_plan() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let plan = db.plans().create(basic_plan("Starter")).await.unwrap();
        let ctx = tenant_on(&db, "Alpha", &plan.id).await;
        let err = db
            .subscriptions()
            .subscribe(
                &ctx,
                NewSubscription {
                    plan_id: "ghost".into(),
                    currency: "USD".into(),
                    starts_at: Utc::now(),
                    ends_at: None,
                    trial_ends_at: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
