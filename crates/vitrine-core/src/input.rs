//! # Write Inputs
//!
//! Request shapes accepted by the repositories. Each `validate()` runs the
//! checks from [`crate::validation`] so malformed input never reaches SQL.
//!
//! Update structs use `Option<T>` for "leave unchanged" and
//! `Option<Option<T>>` for nullable columns ("leave" / "clear" / "set").

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{AttributeType, ItemType, MediaType, ShippingCharge};
use crate::error::ValidationError;
use crate::types::{BillingCycle, DomainKind, PlanStatus};
use crate::validation::{
    normalize_hostname, validate_currency, validate_date_window, validate_discount_bps,
    validate_email, validate_line_quantity, validate_name, validate_non_negative,
    validate_required, validate_sku, ValidationResult, MAX_NAME_LEN,
};

fn validate_opt_name(name: &Option<String>) -> ValidationResult<()> {
    match name {
        Some(n) => validate_name(n),
        None => Ok(()),
    }
}

// =============================================================================
// Tenancy
// =============================================================================

/// A new tenant together with its owner account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTenant {
    pub name: String,
    pub owner_name: String,
    pub owner_email: String,
    pub plan_id: Option<String>,
    pub domain: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl NewTenant {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_name(&self.name)?;
        validate_required("owner_name", &self.owner_name, MAX_NAME_LEN)?;
        validate_email(&self.owner_email)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl NewUser {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_required("name", &self.name, MAX_NAME_LEN)?;
        validate_email(&self.email)
    }
}

/// Profile fields; `None` leaves a field unchanged on update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDetailInput {
    pub full_name: Option<String>,
    pub secondary_email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub preferred_language: Option<String>,
    pub image_path: Option<String>,
}

impl UserDetailInput {
    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(email) = &self.secondary_email {
            validate_email(email)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDomain {
    pub hostname: String,
    pub kind: DomainKind,
    pub is_primary: bool,
    pub ssl_enabled: bool,
    pub ssl_expires_at: Option<DateTime<Utc>>,
}

impl NewDomain {
    pub fn new(hostname: impl Into<String>, kind: DomainKind) -> Self {
        NewDomain {
            hostname: hostname.into(),
            kind,
            is_primary: false,
            ssl_enabled: false,
            ssl_expires_at: None,
        }
    }

    /// Returns the normalized hostname.
    pub fn validate(&self) -> ValidationResult<String> {
        normalize_hostname(&self.hostname)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainUpdate {
    pub kind: Option<DomainKind>,
    pub ssl_enabled: Option<bool>,
    pub ssl_expires_at: Option<Option<DateTime<Utc>>>,
}

// =============================================================================
// Billing
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub features: Vec<String>,
    pub billing_cycle: BillingCycle,
    pub status: PlanStatus,
}

impl NewPlan {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_name(&self.name)?;
        validate_non_negative("price", self.price_cents)?;
        validate_currency(&self.currency)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub price_cents: Option<i64>,
    pub features: Option<Vec<String>>,
    pub billing_cycle: Option<BillingCycle>,
    pub status: Option<PlanStatus>,
}

impl PlanUpdate {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_opt_name(&self.name)?;
        if let Some(price) = self.price_cents {
            validate_non_negative("price", price)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
    pub plan_id: String,
    pub currency: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl NewSubscription {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_currency(&self.currency)?;
        if let Some(end) = self.ends_at {
            if end < self.starts_at {
                return Err(ValidationError::InvalidRange {
                    start: "starts_at".to_string(),
                    end: "ends_at".to_string(),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Reference Entities
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub parent_id: Option<String>,
    pub description: Option<String>,
    pub image_path: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        NewCategory {
            name: name.into(),
            parent_id: None,
            description: None,
            image_path: None,
            sort_order: 0,
            is_active: true,
        }
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_name(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub parent_id: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub image_path: Option<Option<String>>,
    pub sort_order: Option<i64>,
    pub is_active: Option<bool>,
}

impl CategoryUpdate {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_opt_name(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBrand {
    pub name: String,
    pub description: Option<String>,
    pub website_url: Option<String>,
    pub image_path: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
}

impl NewBrand {
    pub fn new(name: impl Into<String>) -> Self {
        NewBrand {
            name: name.into(),
            description: None,
            website_url: None,
            image_path: None,
            sort_order: 0,
            is_active: true,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_name(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub website_url: Option<Option<String>>,
    pub image_path: Option<Option<String>>,
    pub sort_order: Option<i64>,
    pub is_active: Option<bool>,
}

impl BrandUpdate {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_opt_name(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUnit {
    pub name: String,
    pub is_active: bool,
}

impl NewUnit {
    pub fn new(name: impl Into<String>) -> Self {
        NewUnit {
            name: name.into(),
            is_active: true,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_name(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

impl UnitUpdate {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_opt_name(&self.name)
    }
}

// =============================================================================
// Items
// =============================================================================

/// Fields shared by every item regardless of specialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFields {
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub created_by: Option<String>,
}

impl ItemFields {
    pub fn named(name: impl Into<String>) -> Self {
        ItemFields {
            name: name.into(),
            description: None,
            sort_order: 0,
            is_active: true,
            meta_title: None,
            meta_description: None,
            meta_keywords: None,
            created_by: None,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_name(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub item: ItemFields,
    pub category_id: Option<String>,
    pub subcategory_id: Option<String>,
    pub sub_subcategory_id: Option<String>,
    pub brand_id: Option<String>,
    pub unit_id: Option<String>,
    /// Generated from the name when absent.
    pub sku: Option<String>,
    pub shipping_charge: ShippingCharge,
}

impl NewProduct {
    pub fn named(name: impl Into<String>) -> Self {
        NewProduct {
            item: ItemFields::named(name),
            category_id: None,
            subcategory_id: None,
            sub_subcategory_id: None,
            brand_id: None,
            unit_id: None,
            sku: None,
            shipping_charge: ShippingCharge::Free,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        self.item.validate()?;
        if let Some(sku) = &self.sku {
            validate_sku(sku)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCombo {
    pub item: ItemFields,
    pub category_id: Option<String>,
    pub regular_price_cents: Option<i64>,
    pub offered_price_cents: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl NewCombo {
    pub fn validate(&self) -> ValidationResult<()> {
        self.item.validate()?;
        validate_non_negative("offered_price", self.offered_price_cents)?;
        if let Some(regular) = self.regular_price_cents {
            validate_non_negative("regular_price", regular)?;
        }
        validate_date_window(self.start_date, self.end_date)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub category_id: Option<Option<String>>,
    pub subcategory_id: Option<Option<String>>,
    pub sub_subcategory_id: Option<Option<String>>,
    pub brand_id: Option<Option<String>>,
    pub unit_id: Option<Option<String>>,
    pub sku: Option<String>,
    pub shipping_charge: Option<ShippingCharge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComboUpdate {
    pub category_id: Option<Option<String>>,
    pub regular_price_cents: Option<Option<i64>>,
    pub offered_price_cents: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Update of an item and, optionally, its specialization.
///
/// `item_type` exists only so that a re-typing attempt is rejected
/// explicitly instead of silently ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub sort_order: Option<i64>,
    pub is_active: Option<bool>,
    pub meta_title: Option<Option<String>>,
    pub meta_description: Option<Option<String>>,
    pub meta_keywords: Option<Option<String>>,
    pub item_type: Option<ItemType>,
    pub product: Option<ProductUpdate>,
    pub combo: Option<ComboUpdate>,
}

impl ItemUpdate {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_opt_name(&self.name)?;
        if let Some(product) = &self.product {
            if let Some(sku) = &product.sku {
                validate_sku(sku)?;
            }
        }
        if let Some(combo) = &self.combo {
            if let Some(price) = combo.offered_price_cents {
                validate_non_negative("offered_price", price)?;
            }
            if let Some(Some(price)) = combo.regular_price_cents {
                validate_non_negative("regular_price", price)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComboLine {
    pub product_id: String,
    pub variant_id: String,
    pub quantity: i64,
    pub price_cents: Option<i64>,
    pub discount_bps: i64,
    pub is_active: bool,
}

impl NewComboLine {
    pub fn new(product_id: impl Into<String>, variant_id: impl Into<String>, quantity: i64) -> Self {
        NewComboLine {
            product_id: product_id.into(),
            variant_id: variant_id.into(),
            quantity,
            price_cents: None,
            discount_bps: 0,
            is_active: true,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_line_quantity(self.quantity)?;
        validate_discount_bps(self.discount_bps)?;
        if let Some(price) = self.price_cents {
            validate_non_negative("price", price)?;
        }
        Ok(())
    }
}

// =============================================================================
// Variants
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVariant {
    pub variant_name: String,
    /// Generated from the variant name when absent.
    pub sku: Option<String>,
    pub regular_price_cents: i64,
    pub sale_price_cents: Option<i64>,
    pub barcode: Option<String>,
    pub unit_id: Option<String>,
    pub weight: Option<f64>,
    pub image_path: Option<String>,
    pub is_active: bool,
    pub expire_date: Option<NaiveDate>,
    pub manufacture_date: Option<NaiveDate>,
    pub initial_quantity: i64,
    /// Falls back to the configured default.
    pub low_stock_threshold: Option<i64>,
}

impl NewVariant {
    pub fn new(variant_name: impl Into<String>, regular_price_cents: i64, initial_quantity: i64) -> Self {
        NewVariant {
            variant_name: variant_name.into(),
            sku: None,
            regular_price_cents,
            sale_price_cents: None,
            barcode: None,
            unit_id: None,
            weight: None,
            image_path: None,
            is_active: true,
            expire_date: None,
            manufacture_date: None,
            initial_quantity,
            low_stock_threshold: None,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_required("variant_name", &self.variant_name, MAX_NAME_LEN)?;
        if let Some(sku) = &self.sku {
            validate_sku(sku)?;
        }
        validate_non_negative("regular_price", self.regular_price_cents)?;
        if let Some(sale) = self.sale_price_cents {
            validate_non_negative("sale_price", sale)?;
        }
        validate_non_negative("quantity", self.initial_quantity)?;
        if let Some(threshold) = self.low_stock_threshold {
            validate_non_negative("low_stock_threshold", threshold)?;
        }
        if let (Some(made), Some(expires)) = (self.manufacture_date, self.expire_date) {
            if made > expires {
                return Err(ValidationError::InvalidRange {
                    start: "manufacture_date".to_string(),
                    end: "expire_date".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantUpdate {
    pub variant_name: Option<String>,
    pub sku: Option<String>,
    pub regular_price_cents: Option<i64>,
    pub sale_price_cents: Option<Option<i64>>,
    pub barcode: Option<Option<String>>,
    pub unit_id: Option<Option<String>>,
    pub weight: Option<Option<f64>>,
    pub image_path: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub expire_date: Option<Option<NaiveDate>>,
    pub manufacture_date: Option<Option<NaiveDate>>,
}

impl VariantUpdate {
    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(name) = &self.variant_name {
            validate_required("variant_name", name, MAX_NAME_LEN)?;
        }
        if let Some(sku) = &self.sku {
            validate_sku(sku)?;
        }
        if let Some(price) = self.regular_price_cents {
            validate_non_negative("regular_price", price)?;
        }
        if let Some(Some(price)) = self.sale_price_cents {
            validate_non_negative("sale_price", price)?;
        }
        Ok(())
    }
}

// =============================================================================
// Attributes & Media
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttribute {
    pub attribute_category: Option<String>,
    pub attribute_name: String,
    pub attribute_value: String,
    pub attribute_type: AttributeType,
    pub is_filterable: bool,
}

impl NewAttribute {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        NewAttribute {
            attribute_category: None,
            attribute_name: name.into(),
            attribute_value: value.into(),
            attribute_type: AttributeType::Text,
            is_filterable: false,
        }
    }

    pub fn filterable(mut self) -> Self {
        self.is_filterable = true;
        self
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.attribute_category = Some(category.into());
        self
    }

    /// Presence only; the declared type is the caller's contract.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_required("attribute_name", &self.attribute_name, MAX_NAME_LEN)?;
        if self.attribute_value.trim().is_empty() {
            return Err(ValidationError::required("attribute_value"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeUpdate {
    pub attribute_category: Option<Option<String>>,
    pub attribute_name: Option<String>,
    pub attribute_value: Option<String>,
    pub attribute_type: Option<AttributeType>,
    pub is_filterable: Option<bool>,
}

impl AttributeUpdate {
    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(name) = &self.attribute_name {
            validate_required("attribute_name", name, MAX_NAME_LEN)?;
        }
        if let Some(value) = &self.attribute_value {
            if value.trim().is_empty() {
                return Err(ValidationError::required("attribute_value"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMedia {
    pub media_type: MediaType,
    pub file_path: String,
    pub alt_text: Option<String>,
    pub is_primary: bool,
    pub sort_order: i64,
}

impl NewMedia {
    pub fn image(file_path: impl Into<String>) -> Self {
        NewMedia {
            media_type: MediaType::Image,
            file_path: file_path.into(),
            alt_text: None,
            is_primary: false,
            sort_order: 0,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_required("file_path", &self.file_path, 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_combo_window() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let combo = NewCombo {
            item: ItemFields::named("Breakfast Bundle"),
            category_id: None,
            regular_price_cents: Some(1500),
            offered_price_cents: 1200,
            start_date: d("2024-06-10"),
            end_date: d("2024-06-01"),
        };
        assert!(matches!(combo.validate(), Err(ValidationError::InvalidRange { .. })));
    }

    #[test]
    fn test_new_variant_rejects_negative_stock() {
        let variant = NewVariant::new("Large", 1999, -1);
        assert!(matches!(variant.validate(), Err(ValidationError::Negative { .. })));
    }

    #[test]
    fn test_attribute_requires_value() {
        assert!(NewAttribute::text("color", " ").validate().is_err());
        assert!(NewAttribute::text("color", "red").validate().is_ok());
    }

    #[test]
    fn test_combo_line_quantity() {
        assert!(NewComboLine::new("p", "v", 0).validate().is_err());
        let mut line = NewComboLine::new("p", "v", 2);
        line.discount_bps = 12_000;
        assert!(line.validate().is_err());
    }
}
