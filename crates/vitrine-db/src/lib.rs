//! # vitrine-db: Persistence Layer for the Vitrine Catalog
//!
//! SQLite storage for tenants, catalog and inventory, built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vitrine Data Flow                                │
//! │                                                                         │
//! │  Storefront / admin request (resolved to a TenantContext)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     vitrine-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (tenant,     │    │  (embedded)  │  │   │
//! │  │   │               │    │   item,       │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│   variant,    │    │ 001_catalog  │  │   │
//! │  │   │ CatalogPolicy │    │   media, ..)  │    │  _schema.sql │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │                                │   │
//! │  │           identifier.rs ◄──────┼──────► cascade.rs              │   │
//! │  │           (slug / SKU)         │        (tombstone graph)       │   │
//! │  │                                ▼                                │   │
//! │  │                        event_outbox table                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`config`] - TOML + environment configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`identifier`] - Slug and SKU allocation against live rows
//! - [`cascade`] - Soft-delete cascades
//! - [`repository`] - Tenant-scoped repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vitrine_core::input::{NewProduct, NewVariant};
//! use vitrine_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("catalog.db")).await?;
//! let ctx = db.tenants().context_for(&tenant_id).await?;
//!
//! let shoe = db.items().create_product(&ctx, NewProduct::named("Trail Shoe")).await?;
//! let product_id = shoe.value.specialization.id().to_string();
//! db.variants()
//!     .add_variant(&ctx, &product_id, NewVariant::new("42 / Black", 8900, 12))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cascade;
pub mod config;
pub mod error;
pub mod identifier;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use cascade::CascadeReport;
pub use config::CatalogConfig;
pub use error::{DbError, DbResult};
pub use pool::{CatalogPolicy, Database, DbConfig};
pub use repository::Visibility;

// Repository re-exports for convenience
pub use repository::attribute::AttributeRepository;
pub use repository::billing::{PlanRepository, SubscriptionRepository};
pub use repository::brand::BrandRepository;
pub use repository::category::CategoryRepository;
pub use repository::domain::DomainRepository;
pub use repository::item::ItemRepository;
pub use repository::media::MediaRepository;
pub use repository::outbox::{EventOutboxRepository, OutboxEntry};
pub use repository::tenant::TenantRepository;
pub use repository::unit::UnitRepository;
pub use repository::user::UserRepository;
pub use repository::variant::{StockedVariant, VariantRepository};
