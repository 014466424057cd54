//! # Catalog Types
//!
//! Tenant-scoped catalog entities.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Category ◄─┐   Brand ◄─┐   Unit ◄─┐        (references, set-null)      │
//! │             │           │          │                                    │
//! │  Item ──1:1──► Product ─┴──────────┘                                    │
//! │   │             ├──► Variant ──1:1──► Stock                             │
//! │   │             │       ├──► Attribute (variant)                        │
//! │   │             │       └──► Media (variant)                            │
//! │   │             ├──► Attribute (product)                                │
//! │   │             └──► Media (product)                                    │
//! │   │                                                                     │
//! │   └──1:1──► Combo ──► ComboProduct ──► (Product, Variant)               │
//! │   │           └──► Media (combo)                                        │
//! │   └──► Attribute (item)                                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::kind::{EntityKind, OwnerRef};
use crate::money::Money;
use crate::stock::{ComboStockStatus, StockStatus};
use crate::storage::StorageUrlResolver;

// =============================================================================
// Reference Entities
// =============================================================================

/// A node in a tenant's category forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub tenant_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_path: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Brand {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub website_url: Option<String>,
    pub image_path: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Unit of measure (piece, kg, litre...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Unit {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Item (aggregate root)
// =============================================================================

/// Discriminator of an item's specialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Product,
    Combo,
}

impl ItemType {
    /// Kind tag stored in `itemable_type`.
    pub const fn specialization_kind(self) -> EntityKind {
        match self {
            ItemType::Product => EntityKind::Product,
            ItemType::Combo => EntityKind::Combo,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ItemType::Product => "product",
            ItemType::Combo => "combo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Item {
    pub id: String,
    pub tenant_id: String,
    pub item_type: ItemType,
    pub itemable_id: String,
    pub itemable_type: EntityKind,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// SEO fields with fallbacks applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Seo {
    pub title: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
}

impl Item {
    pub fn specialization_ref(&self) -> OwnerRef {
        OwnerRef::new(self.itemable_type, self.itemable_id.clone())
    }

    /// Meta title falls back to the name, meta description to the description.
    pub fn seo(&self) -> Seo {
        Seo {
            title: self.meta_title.clone().unwrap_or_else(|| self.name.clone()),
            description: self
                .meta_description
                .clone()
                .or_else(|| self.description.clone()),
            keywords: self.meta_keywords.clone(),
        }
    }
}

// =============================================================================
// Product
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ShippingCharge {
    #[default]
    Free,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub item_id: String,
    pub category_id: Option<String>,
    pub subcategory_id: Option<String>,
    pub sub_subcategory_id: Option<String>,
    pub brand_id: Option<String>,
    pub unit_id: Option<String>,
    pub sku: String,
    pub shipping_charge: ShippingCharge,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Combo
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Combo {
    pub id: String,
    pub tenant_id: String,
    pub item_id: String,
    pub category_id: Option<String>,
    pub regular_price_cents: Option<i64>,
    pub offered_price_cents: i64,
    #[ts(as = "String")]
    pub start_date: NaiveDate,
    #[ts(as = "String")]
    pub end_date: NaiveDate,
    pub stock_status: ComboStockStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Combo {
    /// Inclusive validity window check.
    pub fn is_valid_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }

    pub fn offered_price(&self) -> Money {
        Money::from_cents(self.offered_price_cents)
    }

    /// Regular minus offered price, when a regular price is set.
    pub fn savings(&self) -> Option<Money> {
        self.regular_price_cents
            .map(|regular| Money::from_cents(regular) - self.offered_price())
    }
}

/// One bundled variant inside a combo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ComboProduct {
    pub id: String,
    pub tenant_id: String,
    pub combo_id: String,
    pub product_id: String,
    pub variant_id: String,
    pub quantity: i64,
    pub price_cents: Option<i64>,
    /// Discount in basis points, 0..=10000.
    pub discount_bps: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ComboProduct {
    /// Line total after the discount, if the line carries a price override.
    pub fn line_total(&self) -> Option<Money> {
        self.price_cents.map(|p| {
            Money::from_cents(p)
                .multiply_quantity(self.quantity)
                .apply_discount_bps(self.discount_bps)
        })
    }
}

// =============================================================================
// Variant & Stock
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Variant {
    pub id: String,
    pub tenant_id: String,
    pub product_id: String,
    pub variant_name: String,
    pub sku: String,
    pub regular_price_cents: i64,
    pub sale_price_cents: Option<i64>,
    pub barcode: Option<String>,
    pub unit_id: Option<String>,
    pub weight: Option<f64>,
    pub image_path: Option<String>,
    pub is_active: bool,
    #[ts(as = "Option<String>")]
    pub expire_date: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub manufacture_date: Option<NaiveDate>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Variant {
    /// Sale price when set, otherwise the regular price.
    pub fn effective_price(&self) -> Money {
        Money::from_cents(self.sale_price_cents.unwrap_or(self.regular_price_cents))
    }

    pub fn is_expired_on(&self, day: NaiveDate) -> bool {
        self.expire_date.is_some_and(|exp| exp < day)
    }

    pub fn image_url_with(&self, resolver: &dyn StorageUrlResolver) -> Option<String> {
        self.image_path.as_deref().map(|path| resolver.url_for(path))
    }
}

/// The single stock row of a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Stock {
    pub id: String,
    pub tenant_id: String,
    pub variant_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub low_stock_threshold: i64,
    pub status: StockStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Attribute
// =============================================================================

/// How `attribute_value` text is meant to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    #[default]
    Text,
    Number,
    Boolean,
    Enum,
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Attribute {
    pub id: String,
    pub tenant_id: String,
    pub attributable_type: EntityKind,
    pub attributable_id: String,
    pub attribute_category: Option<String>,
    pub attribute_name: String,
    pub attribute_value: String,
    pub attribute_type: AttributeType,
    pub is_filterable: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Attribute {
    pub fn owner(&self) -> OwnerRef {
        OwnerRef::new(self.attributable_type, self.attributable_id.clone())
    }
}

/// Distinct values of one filterable attribute under a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FilterFacet {
    pub attribute_name: String,
    pub attribute_type: AttributeType,
    pub values: Vec<String>,
}

/// Groups filterable attributes into facets keyed by name.
///
/// Values are de-duplicated and sorted; facets come back in name order.
pub fn group_facets<'a, I>(attributes: I) -> Vec<FilterFacet>
where
    I: IntoIterator<Item = &'a Attribute>,
{
    let mut by_name: BTreeMap<&str, (AttributeType, Vec<String>)> = BTreeMap::new();

    for attr in attributes.into_iter().filter(|a| a.is_filterable) {
        let entry = by_name
            .entry(attr.attribute_name.as_str())
            .or_insert_with(|| (attr.attribute_type, Vec::new()));
        if !entry.1.contains(&attr.attribute_value) {
            entry.1.push(attr.attribute_value.clone());
        }
    }

    by_name
        .into_iter()
        .map(|(name, (attribute_type, mut values))| {
            values.sort();
            FilterFacet {
                attribute_name: name.to_string(),
                attribute_type,
                values,
            }
        })
        .collect()
}

// =============================================================================
// Media
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Media {
    pub id: String,
    pub tenant_id: String,
    pub mediable_type: EntityKind,
    pub mediable_id: String,
    pub media_type: MediaType,
    /// Relative path; URLs come from a `StorageUrlResolver`.
    pub file_path: String,
    pub alt_text: Option<String>,
    pub is_primary: bool,
    pub sort_order: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Media {
    pub fn owner(&self) -> OwnerRef {
        OwnerRef::new(self.mediable_type, self.mediable_id.clone())
    }

    pub fn url_with(&self, resolver: &dyn StorageUrlResolver) -> String {
        resolver.url_for(&self.file_path)
    }
}

// =============================================================================
// Aggregates
// =============================================================================

/// The one live specialization of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Specialization {
    Product(Product),
    Combo(Combo),
}

impl Specialization {
    pub fn item_type(&self) -> ItemType {
        match self {
            Specialization::Product(_) => ItemType::Product,
            Specialization::Combo(_) => ItemType::Combo,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Specialization::Product(p) => &p.id,
            Specialization::Combo(c) => &c.id,
        }
    }
}

/// An item together with its specialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemAggregate {
    pub item: Item,
    pub specialization: Specialization,
}

impl ItemAggregate {
    pub fn as_product(&self) -> Option<&Product> {
        match &self.specialization {
            Specialization::Product(p) => Some(p),
            Specialization::Combo(_) => None,
        }
    }

    pub fn as_combo(&self) -> Option<&Combo> {
        match &self.specialization {
            Specialization::Combo(c) => Some(c),
            Specialization::Product(_) => None,
        }
    }
}
