//! Cross-repository properties of the catalog: tree safety, identifier
//! uniqueness under contention, primary-flag exclusivity, stock status,
//! combo aggregation and cascade atomicity.

use std::collections::HashSet;

use chrono::NaiveDate;
use vitrine_core::input::{
    CategoryUpdate, ItemFields, NewAttribute, NewBrand, NewCategory, NewCombo, NewComboLine,
    NewDomain, NewMedia, NewProduct, NewTenant, NewVariant,
};
use vitrine_core::{
    ComboStockStatus, CoreError, DomainKind, OwnerRef, StockStatus, TenantContext,
};
use vitrine_db::{Database, DbConfig, DbError};

async fn setup() -> (Database, TenantContext) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let ctx = tenant(&db, "Acme").await;
    (db, ctx)
}

async fn tenant(db: &Database, name: &str) -> TenantContext {
    let tenant = db
        .tenants()
        .create(NewTenant {
            name: name.into(),
            owner_name: "Owner".into(),
            owner_email: format!("owner@{}.io", name.to_lowercase()),
            ..Default::default()
        })
        .await
        .unwrap()
        .value;
    db.tenants().context_for(&tenant.id).await.unwrap()
}

async fn product(db: &Database, ctx: &TenantContext, input: NewProduct) -> (String, String) {
    let aggregate = db.items().create_product(ctx, input).await.unwrap().value;
    (aggregate.item.id.clone(), aggregate.specialization.id().to_string())
}

async fn variant(db: &Database, ctx: &TenantContext, product_id: &str, name: &str, qty: i64) -> String {
    db.variants()
        .add_variant(ctx, product_id, NewVariant::new(name, 1000, qty))
        .await
        .unwrap()
        .value
        .variant
        .id
}

// =============================================================================
// Category Tree
// =============================================================================

#[tokio::test]
async fn reparent_into_descendant_is_rejected() {
    let (db, ctx) = setup().await;
    let categories = db.categories();
    let a = categories.create(&ctx, NewCategory::new("A")).await.unwrap();
    let b = categories.create(&ctx, NewCategory::new("B").under(&a.id)).await.unwrap();
    let c = categories.create(&ctx, NewCategory::new("C").under(&b.id)).await.unwrap();

    let err = categories
        .update(
            &ctx,
            &a.id,
            CategoryUpdate {
                parent_id: Some(Some(c.id.clone())),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Domain(CoreError::InvalidTransition { .. })));
    assert!(categories.get(&ctx, &a.id).await.unwrap().parent_id.is_none());

    let detached = categories
        .update(
            &ctx,
            &c.id,
            CategoryUpdate {
                parent_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(detached.parent_id.is_none());
    assert_eq!(categories.roots(&ctx).await.unwrap().len(), 2);
    assert_eq!(categories.breadcrumb(&ctx, &b.id).await.unwrap(), vec!["A", "B"]);
}

// =============================================================================
// Identifiers
// =============================================================================

/// File-backed database with a real multi-connection pool.
async fn file_backed(dir: &tempfile::TempDir) -> Database {
    let config = DbConfig::new(dir.path().join("catalog.db")).max_connections(5);
    Database::new(config).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_slug_requests_get_distinct_slugs() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_backed(&dir).await;
    let ctx = tenant(&db, "Acme").await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let db = db.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            db.brands().create(&ctx, NewBrand::new("Acme")).await
        }));
    }

    let mut slugs = HashSet::new();
    for handle in handles {
        let brand = handle.await.unwrap().unwrap();
        assert!(slugs.insert(brand.slug));
    }
    let expected: HashSet<String> = std::iter::once("acme".to_string())
        .chain((1..16).map(|n| format!("acme-{}", n)))
        .collect();
    assert_eq!(slugs, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stock_adjustments_all_apply() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_backed(&dir).await;
    let ctx = tenant(&db, "Acme").await;
    let (_, product_id) = product(&db, &ctx, NewProduct::named("Mug")).await;
    let variant_id = variant(&db, &ctx, &product_id, "Blue", 10).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let db = db.clone();
        let ctx = ctx.clone();
        let variant_id = variant_id.clone();
        handles.push(tokio::spawn(async move {
            db.variants().adjust_quantity(&ctx, &variant_id, -1).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stock = db.variants().stock_for(&ctx, &variant_id).await.unwrap();
    assert_eq!(stock.quantity, 0);
    assert_eq!(stock.status, StockStatus::StockOut);
}

/// An extra index over tombstoned rows makes a slug the probe sees as free
/// collide on insert.
async fn block_tombstoned_brand_slugs(db: &Database) {
    sqlx::query("CREATE UNIQUE INDEX brands_slug_all_rows ON brands (tenant_id, slug)")
        .execute(db.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn slug_collision_on_insert_reallocates() {
    let (db, ctx) = setup().await;
    let first = db.brands().create(&ctx, NewBrand::new("Acme")).await.unwrap();
    db.brands().delete(&ctx, &first.id).await.unwrap();
    block_tombstoned_brand_slugs(&db).await;

    let second = db.brands().create(&ctx, NewBrand::new("Acme")).await.unwrap();
    assert_eq!(second.slug, "acme-1");
}

#[tokio::test]
async fn slug_collision_surfaces_once_attempts_run_out() {
    let db = Database::new(DbConfig::in_memory().id_max_attempts(1)).await.unwrap();
    let ctx = tenant(&db, "Acme").await;
    let first = db.brands().create(&ctx, NewBrand::new("Acme")).await.unwrap();
    db.brands().delete(&ctx, &first.id).await.unwrap();
    block_tombstoned_brand_slugs(&db).await;

    let err = db.brands().create(&ctx, NewBrand::new("Acme")).await.unwrap_err();
    assert!(err.is_unique_on("slug"));
    assert_eq!(db.brands().list(&ctx).await.unwrap().len(), 0);
}

#[tokio::test]
async fn slugs_are_scoped_per_tenant() {
    let (db, acme) = setup().await;
    let globex = tenant(&db, "Globex").await;

    let a = db.categories().create(&acme, NewCategory::new("Shoes")).await.unwrap();
    let b = db.categories().create(&globex, NewCategory::new("Shoes")).await.unwrap();
    assert_eq!(a.slug, "shoes");
    assert_eq!(b.slug, "shoes");
    assert!(db.categories().get(&globex, &a.id).await.is_err());
}

// =============================================================================
// Primary Flags
// =============================================================================

async fn primary_media(db: &Database, ctx: &TenantContext, owner: &OwnerRef) -> usize {
    db.media()
        .list_for(ctx, owner)
        .await
        .unwrap()
        .iter()
        .filter(|m| m.is_primary)
        .count()
}

#[tokio::test]
async fn media_primary_is_zero_or_one_after_any_sequence() {
    let (db, ctx) = setup().await;
    let (_, product_id) = product(&db, &ctx, NewProduct::named("Shoe")).await;
    let owner = OwnerRef::product(&product_id);
    let media = db.media();

    let mut ids = Vec::new();
    for (i, primary) in [true, false, true, true, false].iter().enumerate() {
        let mut input = NewMedia::image(format!("shoe-{}.jpg", i));
        input.is_primary = *primary;
        ids.push(media.attach(&ctx, owner.clone(), input).await.unwrap().id);
    }

    assert_eq!(primary_media(&db, &ctx, &owner).await, 1);

    for id in [&ids[1], &ids[4], &ids[0]] {
        media.set_primary(&ctx, id).await.unwrap();
        assert_eq!(primary_media(&db, &ctx, &owner).await, 1);
    }
    media.clear_primary(&ctx, &ids[0]).await.unwrap();
    assert_eq!(primary_media(&db, &ctx, &owner).await, 0);
    media.remove(&ctx, &ids[3]).await.unwrap();
    assert!(primary_media(&db, &ctx, &owner).await <= 1);
}

#[tokio::test]
async fn domain_primary_is_zero_or_one_after_any_sequence() {
    let (db, ctx) = setup().await;
    let domains = db.domains();

    let mut ids = Vec::new();
    for (host, primary) in [("a.acme.io", true), ("b.acme.io", true), ("shop.acme.com", false)] {
        let mut input = NewDomain::new(host, DomainKind::Subdomain);
        input.is_primary = primary;
        ids.push(domains.add(&ctx, input).await.unwrap().value.id);
    }

    let primaries = |list: Vec<vitrine_core::Domain>| list.iter().filter(|d| d.is_primary).count();
    assert_eq!(primaries(domains.list(&ctx).await.unwrap()), 1);

    domains.mark_primary(&ctx, &ids[2]).await.unwrap();
    assert_eq!(primaries(domains.list(&ctx).await.unwrap()), 1);
    assert_eq!(domains.primary(&ctx).await.unwrap().unwrap().id, ids[2]);

    domains.remove(&ctx, &ids[2]).await.unwrap();
    assert_eq!(primaries(domains.list(&ctx).await.unwrap()), 0);
}

// =============================================================================
// Stock
// =============================================================================

#[tokio::test]
async fn stock_status_thresholds() {
    let (db, ctx) = setup().await;
    let (_, product_id) = product(&db, &ctx, NewProduct::named("Mug")).await;

    for (quantity, expected) in [
        (0, StockStatus::StockOut),
        (3, StockStatus::LowStock),
        (10, StockStatus::Available),
    ] {
        let id = variant(&db, &ctx, &product_id, &format!("Qty {}", quantity), quantity).await;
        let stock = db.variants().stock_for(&ctx, &id).await.unwrap();
        assert_eq!(stock.low_stock_threshold, 5);
        assert_eq!(stock.status, expected);
    }
}

#[tokio::test]
async fn combo_status_aggregates_lines() {
    let (db, ctx) = setup().await;
    let (_, product_id) = product(&db, &ctx, NewProduct::named("Mug")).await;
    let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

    let cases = [
        (1, 2, ComboStockStatus::OutOfStock),
        (2, 1, ComboStockStatus::LowStock),
        (20, 1, ComboStockStatus::Available),
    ];
    for (stock_qty, line_qty, expected) in cases {
        let variant_id = variant(&db, &ctx, &product_id, &format!("S{}", stock_qty), stock_qty).await;
        let combo = db
            .items()
            .create_combo(
                &ctx,
                NewCombo {
                    item: ItemFields::named(format!("Bundle {}", stock_qty)),
                    category_id: None,
                    regular_price_cents: None,
                    offered_price_cents: 500,
                    start_date: day,
                    end_date: day,
                },
            )
            .await
            .unwrap()
            .value;
        let combo_id = combo.specialization.id().to_string();
        db.items()
            .add_combo_line(&ctx, &combo_id, NewComboLine::new(&product_id, &variant_id, line_qty))
            .await
            .unwrap();

        let recomputed = db.variants().recompute_combo_status(&ctx, &combo_id).await.unwrap();
        assert_eq!(recomputed.value.stock_status, expected);
    }
}

// =============================================================================
// Cascades
// =============================================================================

async fn product_with_two_variants(db: &Database, ctx: &TenantContext) -> (String, String, Vec<String>) {
    let (item_id, product_id) = product(db, ctx, NewProduct::named("Jacket")).await;
    let mut variants = Vec::new();
    for name in ["S", "M"] {
        let id = variant(db, ctx, &product_id, name, 4).await;
        db.attributes()
            .attach(ctx, OwnerRef::variant(&id), NewAttribute::text("Size", name).filterable())
            .await
            .unwrap();
        variants.push(id);
    }
    (item_id, product_id, variants)
}

#[tokio::test]
async fn deleting_product_item_tombstones_the_subtree() {
    let (db, ctx) = setup().await;
    let (item_id, product_id, variants) = product_with_two_variants(&db, &ctx).await;

    let report = db.items().delete(&ctx, &item_id).await.unwrap().value;
    assert_eq!(report.tombstoned("variants"), 2);
    assert_eq!(report.tombstoned("stocks"), 2);
    assert_eq!(report.tombstoned("attributes"), 2);
    assert_eq!(report.tombstoned("products"), 1);
    assert_eq!(report.tombstoned("items"), 1);

    assert!(db.variants().list_for_product(&ctx, &product_id).await.unwrap().is_empty());
    for id in &variants {
        assert!(db.variants().stock_for(&ctx, id).await.is_err());
    }
}

#[tokio::test]
async fn failing_cascade_leaves_everything_live() {
    let (db, ctx) = setup().await;
    let (item_id, product_id, variants) = product_with_two_variants(&db, &ctx).await;

    sqlx::query(
        "CREATE TRIGGER block_product_tombstone BEFORE UPDATE OF deleted_at ON products \
         WHEN NEW.deleted_at IS NOT NULL \
         BEGIN SELECT RAISE(ABORT, 'product tombstone blocked'); END",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let err = db.items().delete(&ctx, &item_id).await.unwrap_err();
    match err {
        DbError::CascadeFailure { step, .. } => assert_eq!(step, "products"),
        other => panic!("expected cascade failure, got {other:?}"),
    }

    assert!(db.items().get(&ctx, &item_id).await.is_ok());
    assert_eq!(db.variants().list_for_product(&ctx, &product_id).await.unwrap().len(), 2);
    for id in &variants {
        assert_eq!(db.variants().stock_for(&ctx, id).await.unwrap().quantity, 4);
        let attrs = db.attributes().list_for(&ctx, &OwnerRef::variant(id), None).await.unwrap();
        assert_eq!(attrs.len(), 1);
    }
    // nothing from the failed delete reached the outbox
    let pending = db.outbox().pending_for_tenant(ctx.tenant_id(), 100).await.unwrap();
    assert!(pending.iter().all(|e| e.event_type != "ItemDeleted"));
}

#[tokio::test]
async fn deleting_brand_detaches_products() {
    let (db, ctx) = setup().await;
    let brand = db.brands().create(&ctx, NewBrand::new("Acme")).await.unwrap();

    let mut item_ids = Vec::new();
    for name in ["One", "Two", "Three"] {
        let mut input = NewProduct::named(name);
        input.brand_id = Some(brand.id.clone());
        item_ids.push(product(&db, &ctx, input).await.0);
    }

    let report = db.brands().delete(&ctx, &brand.id).await.unwrap();
    assert_eq!(report.detached("products.brand_id"), 3);
    assert_eq!(report.tombstoned("brands"), 1);

    for item_id in &item_ids {
        let aggregate = db.items().get(&ctx, item_id).await.unwrap();
        assert!(aggregate.as_product().unwrap().brand_id.is_none());
    }
}

#[tokio::test]
async fn deleting_tenant_hides_it_from_resolution() {
    let (db, ctx) = setup().await;
    product_with_two_variants(&db, &ctx).await;

    let report = db.tenants().delete(ctx.tenant_id()).await.unwrap();
    assert_eq!(report.tombstoned("tenants"), 1);
    assert_eq!(report.tombstoned("variants"), 2);
    assert!(db.tenants().context_for(ctx.tenant_id()).await.is_err());
}
