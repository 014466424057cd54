//! # vitrine-core: Pure Catalog Rules
//!
//! Everything the multi-tenant catalog engine decides without touching
//! storage: entity types, identifier derivation, stock status rules,
//! category tree checks, tenant scoping and event emission.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vitrine Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │      Callers (HTTP handlers, admin jobs, seed binary)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ &TenantContext + input DTOs            │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    vitrine-db (repositories)                    │   │
//! │  │      transactions, unique retries, cascades, outbox             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ vitrine-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌───────────┐ ┌─────────┐ ┌──────────┐          │   │
//! │  │   │ catalog  │ │identifier │ │  stock  │ │   tree   │          │   │
//! │  │   │ types    │ │slug / SKU │ │ status  │ │  cycles  │          │   │
//! │  │   └──────────┘ └───────────┘ └─────────┘ └──────────┘          │   │
//! │  │   ┌──────────┐ ┌───────────┐ ┌─────────┐ ┌──────────┐          │   │
//! │  │   │  tenant  │ │  events   │ │  kind   │ │validation│          │   │
//! │  │   └──────────┘ └───────────┘ └─────────┘ └──────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Tenants, users, domains, plans, subscriptions
//! - [`catalog`] - Categories, brands, units, items, products, combos, variants, stock
//! - [`kind`] - Polymorphic entity-kind tags
//! - [`identifier`] - Slug and SKU derivation
//! - [`stock`] - Variant and combo stock status rules
//! - [`tree`] - Category forest and reparent checks
//! - [`tenant`] - Explicit tenant context
//! - [`events`] - Post-commit domain events
//! - [`input`] - Write request shapes
//! - [`validation`] - Input validation
//! - [`money`] - Integer money
//! - [`storage`] - Storage URL resolution boundary
//!
//! ## Example Usage
//!
//! ```rust
//! use vitrine_core::stock::{aggregate_combo_status, ComboLineStock, ComboStockStatus, StockStatus};
//!
//! assert_eq!(StockStatus::derive(3, 5), StockStatus::LowStock);
//!
//! let lines = [ComboLineStock::new(2, Some((1, 5)))];
//! assert_eq!(aggregate_combo_status(&lines), ComboStockStatus::OutOfStock);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod error;
pub mod events;
pub mod identifier;
pub mod input;
pub mod kind;
pub mod money;
pub mod stock;
pub mod storage;
pub mod tenant;
pub mod tree;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use catalog::*;
pub use error::{CoreError, CoreResult, ValidationError};
pub use events::{Committed, DomainEvent, EventSink};
pub use kind::{EntityKind, OwnerRef};
pub use money::Money;
pub use stock::{ComboStockStatus, StockStatus, DEFAULT_LOW_STOCK_THRESHOLD};
pub use tenant::{RequestScope, TenantContext};
pub use types::*;
