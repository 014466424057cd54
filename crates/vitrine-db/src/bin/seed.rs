//! # Demo Catalog Seeder
//!
//! Populates the database with one demo tenant and a small catalog for
//! development.
//!
//! ## Usage
//! ```bash
//! # Seed ./vitrine_dev.db
//! cargo run -p vitrine-db --bin seed
//!
//! # Specify database path or config file
//! cargo run -p vitrine-db --bin seed -- --db ./data/vitrine.db
//! cargo run -p vitrine-db --bin seed -- --config ./catalog.toml
//! ```
//!
//! ## Generated Data
//! - Tenant "Demo Store" with owner, plan, subscription and a primary domain
//! - Category tree: Apparel > Shirts / Footwear, Home > Kitchen
//! - Brands and units
//! - Products with variants, stock, filterable attributes and media
//! - A combo bundling two variants, with its stock status recomputed

use chrono::{Duration, NaiveDate, Utc};
use rand::Rng;
use std::env;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use vitrine_core::input::{
    ItemFields, NewAttribute, NewBrand, NewCategory, NewCombo, NewComboLine, NewDomain, NewMedia,
    NewPlan, NewProduct, NewSubscription, NewTenant, NewUnit, NewVariant,
};
use vitrine_core::{BillingCycle, DomainEvent, DomainKind, OwnerRef, PlanStatus, TenantContext};
use vitrine_db::{CatalogConfig, Database, Visibility};

const DEMO_TENANT: &str = "Demo Store";

/// (product name, category key, brand index, [(variant, price cents, color)])
const PRODUCTS: &[(&str, &str, usize, &[(&str, i64, &str)])] = &[
    (
        "Oxford Shirt",
        "shirts",
        0,
        &[("S / White", 4900, "White"), ("M / White", 4900, "White"), ("M / Blue", 5200, "Blue")],
    ),
    (
        "Linen Shirt",
        "shirts",
        1,
        &[("M / Sand", 5900, "Sand"), ("L / Sand", 5900, "Sand")],
    ),
    (
        "Trail Runner",
        "footwear",
        2,
        &[("42 / Black", 8900, "Black"), ("43 / Black", 8900, "Black"), ("44 / Red", 9400, "Red")],
    ),
    (
        "Enamel Mug",
        "kitchen",
        1,
        &[("Blue", 1500, "Blue"), ("Green", 1500, "Green")],
    ),
];

const BRANDS: &[&str] = &["Harbor & Co", "Fieldnote", "Summit"];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vitrine=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Vitrine Demo Catalog Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./vitrine_dev.db)");
                println!("  -c, --config <PATH>  catalog.toml to load");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(arg = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = CatalogConfig::load(config_path)?;
    config.database.path = db_path.unwrap_or_else(|| PathBuf::from("./vitrine_dev.db"));

    println!("🌱 Vitrine Demo Catalog Seeder");
    println!("==============================");
    println!("Database: {}", config.database.path.display());
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.tenants().list(Visibility::Live).await?;
    if existing.iter().any(|t| t.name == DEMO_TENANT) {
        println!("⚠ Tenant '{}' already exists", DEMO_TENANT);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let ctx = seed_tenant(&db).await?;
    let variants = seed_catalog(&db, &ctx, &config.url_resolver()).await?;

    println!();
    println!("✓ Seeded {} variants in {:?}", variants, start.elapsed());

    let pending = db.outbox().count_pending().await?;
    println!("  Outbox: {} pending events", pending);

    let apparel = db.categories().get_by_slug(&ctx, "apparel").await?;
    if let Some(apparel) = apparel {
        for facet in db.attributes().filter_facets_for_category(&ctx, &apparel.id).await? {
            println!("  Facet {}: {}", facet.attribute_name, facet.values.join(", "));
        }
    }

    println!();
    println!("✓ Seed complete!");
    Ok(())
}

async fn seed_tenant(db: &Database) -> Result<TenantContext, Box<dyn std::error::Error>> {
    let plan = db
        .plans()
        .create(NewPlan {
            name: "Growth".into(),
            description: Some("Demo plan".into()),
            price_cents: 2900,
            currency: "usd".into(),
            features: vec!["custom_domain".into(), "combos".into()],
            billing_cycle: BillingCycle::Monthly,
            status: PlanStatus::Active,
        })
        .await?;

    let mut published: Vec<DomainEvent> = Vec::new();
    let tenant = db
        .tenants()
        .create(NewTenant {
            name: DEMO_TENANT.into(),
            owner_name: "Dana Demo".into(),
            owner_email: "owner@demo.vitrine.test".into(),
            plan_id: Some(plan.id.clone()),
            ..Default::default()
        })
        .await?
        .dispatch(&mut published);
    let ctx = db.tenants().context_for(&tenant.id).await?;

    let mut domain = NewDomain::new("demo.vitrine.test", DomainKind::Subdomain);
    domain.is_primary = true;
    db.domains().add(&ctx, domain).await?;

    let now = Utc::now();
    db.subscriptions()
        .subscribe(
            &ctx,
            NewSubscription {
                plan_id: plan.id,
                currency: "USD".into(),
                starts_at: now,
                ends_at: Some(now + Duration::days(30)),
                trial_ends_at: Some(now + Duration::days(14)),
            },
        )
        .await?;

    info!(tenant_id = %tenant.id, events = published.len(), "Demo tenant created");
    println!("✓ Tenant '{}' ({})", tenant.name, tenant.id);
    Ok(ctx)
}

async fn seed_catalog(
    db: &Database,
    ctx: &TenantContext,
    resolver: &dyn vitrine_core::storage::StorageUrlResolver,
) -> Result<usize, Box<dyn std::error::Error>> {
    let categories = db.categories();
    let apparel = categories.create(ctx, NewCategory::new("Apparel")).await?;
    let shirts = categories.create(ctx, NewCategory::new("Shirts").under(&apparel.id)).await?;
    let footwear = categories.create(ctx, NewCategory::new("Footwear").under(&apparel.id)).await?;
    let home = categories.create(ctx, NewCategory::new("Home")).await?;
    let kitchen = categories.create(ctx, NewCategory::new("Kitchen").under(&home.id)).await?;

    let mut brand_ids = Vec::new();
    for name in BRANDS {
        brand_ids.push(db.brands().create(ctx, NewBrand::new(*name)).await?.id);
    }
    let piece = db.units().create(ctx, NewUnit::new("Piece")).await?;

    let mut rng = rand::thread_rng();
    let mut seeded = 0;
    let mut combo_lines = Vec::new();

    for (name, category, brand, variants) in PRODUCTS {
        let mut input = NewProduct::named(*name);
        input.item.meta_description = Some(format!("{} from the demo catalog", name));
        input.brand_id = brand_ids.get(*brand).cloned();
        input.unit_id = Some(piece.id.clone());
        match *category {
            "shirts" => {
                input.category_id = Some(apparel.id.clone());
                input.subcategory_id = Some(shirts.id.clone());
            }
            "footwear" => {
                input.category_id = Some(apparel.id.clone());
                input.subcategory_id = Some(footwear.id.clone());
            }
            _ => {
                input.category_id = Some(home.id.clone());
                input.subcategory_id = Some(kitchen.id.clone());
            }
        }

        let aggregate = db.items().create_product(ctx, input).await?.value;
        let product_id = aggregate.specialization.id().to_string();
        let slug = aggregate.item.slug.clone();

        db.attributes()
            .attach(
                ctx,
                OwnerRef::item(&aggregate.item.id),
                NewAttribute::text("Care", "See label").in_category("Product Details"),
            )
            .await?;
        let hero = db
            .media()
            .attach(
                ctx,
                OwnerRef::product(&product_id),
                NewMedia::image(format!("products/{}/hero.jpg", slug)).primary(),
            )
            .await?;

        for (variant_name, price, color) in variants.iter() {
            let mut input = NewVariant::new(*variant_name, *price, rng.gen_range(0..=30));
            input.image_path = Some(format!("products/{}/{}.jpg", slug, color.to_lowercase()));
            let stocked = db.variants().add_variant(ctx, &product_id, input).await?.value;
            debug!(
                sku = %stocked.variant.sku,
                status = %stocked.stock.status,
                image = ?stocked.variant.image_url_with(resolver),
                "Variant seeded"
            );

            db.attributes()
                .attach(
                    ctx,
                    OwnerRef::variant(&stocked.variant.id),
                    NewAttribute::text("Color", *color).filterable(),
                )
                .await?;

            if combo_lines.len() < 2 && *category == "kitchen" {
                combo_lines.push((product_id.clone(), stocked.variant.id.clone()));
            }
            seeded += 1;
        }

        println!(
            "  {} ({} variants) → {}",
            name,
            variants.len(),
            hero.url_with(resolver)
        );
    }

    let today = Utc::now().date_naive();
    let combo = db
        .items()
        .create_combo(
            ctx,
            NewCombo {
                item: ItemFields::named("Mug Pair"),
                category_id: Some(kitchen.id.clone()),
                regular_price_cents: Some(3000),
                offered_price_cents: 2500,
                start_date: today,
                end_date: today
                    .checked_add_signed(Duration::days(90))
                    .unwrap_or(NaiveDate::MAX),
            },
        )
        .await?
        .value;
    let combo_id = combo.specialization.id().to_string();

    for (product_id, variant_id) in &combo_lines {
        db.items()
            .add_combo_line(ctx, &combo_id, NewComboLine::new(product_id, variant_id, 1))
            .await?;
    }
    let combo = db.variants().recompute_combo_status(ctx, &combo_id).await?.value;
    println!("  Combo 'Mug Pair' → {}", combo.stock_status);

    Ok(seeded)
}
