//! # Entity Kinds
//!
//! Polymorphic type tags (`itemable_type`, `attributable_type`,
//! `mediable_type`) are a closed enum, not free-form class names.
//!
//! ```text
//! ┌───────────────┬──────────────┬────────────┬────────┐
//! │ EntityKind    │ table        │ attributes │ media  │
//! ├───────────────┼──────────────┼────────────┼────────┤
//! │ item          │ items        │     ✓      │        │
//! │ product       │ products     │     ✓      │   ✓    │
//! │ combo         │ combos       │            │   ✓    │
//! │ variant       │ variants     │     ✓      │   ✓    │
//! │ category      │ categories   │            │        │
//! │ brand         │ brands       │            │        │
//! └───────────────┴──────────────┴────────────┴────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Discriminator for every catalog entity that can be the target of a
/// polymorphic pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Item,
    Product,
    Combo,
    Variant,
    Category,
    Brand,
}

impl EntityKind {
    /// Table that stores rows of this kind.
    pub const fn table(self) -> &'static str {
        match self {
            EntityKind::Item => "items",
            EntityKind::Product => "products",
            EntityKind::Combo => "combos",
            EntityKind::Variant => "variants",
            EntityKind::Category => "categories",
            EntityKind::Brand => "brands",
        }
    }

    /// Tag persisted in `*_type` columns.
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Product => "product",
            EntityKind::Combo => "combo",
            EntityKind::Variant => "variant",
            EntityKind::Category => "category",
            EntityKind::Brand => "brand",
        }
    }

    /// Whether attributes may be attached to this kind.
    pub const fn accepts_attributes(self) -> bool {
        matches!(
            self,
            EntityKind::Item | EntityKind::Product | EntityKind::Variant
        )
    }

    /// Whether media may be attached to this kind.
    pub const fn accepts_media(self) -> bool {
        matches!(
            self,
            EntityKind::Product | EntityKind::Combo | EntityKind::Variant
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "item" => Ok(EntityKind::Item),
            "product" => Ok(EntityKind::Product),
            "combo" => Ok(EntityKind::Combo),
            "variant" => Ok(EntityKind::Variant),
            "category" => Ok(EntityKind::Category),
            "brand" => Ok(EntityKind::Brand),
            _ => Err(ValidationError::NotAllowed {
                field: "entity_kind".to_string(),
                allowed: [
                    "item", "product", "combo", "variant", "category", "brand",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            }),
        }
    }
}

/// A typed polymorphic pointer: kind tag plus foreign id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OwnerRef {
    pub kind: EntityKind,
    pub id: String,
}

impl OwnerRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        OwnerRef {
            kind,
            id: id.into(),
        }
    }

    pub fn item(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Item, id)
    }

    pub fn product(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Product, id)
    }

    pub fn combo(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Combo, id)
    }

    pub fn variant(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Variant, id)
    }

    /// Rejects owners that cannot carry attributes.
    pub fn ensure_attributable(&self) -> Result<(), ValidationError> {
        if self.kind.accepts_attributes() {
            Ok(())
        } else {
            Err(ValidationError::NotAllowed {
                field: "attributable_type".to_string(),
                allowed: vec!["item".into(), "product".into(), "variant".into()],
            })
        }
    }

    /// Rejects owners that cannot carry media.
    pub fn ensure_mediable(&self) -> Result<(), ValidationError> {
        if self.kind.accepts_media() {
            Ok(())
        } else {
            Err(ValidationError::NotAllowed {
                field: "mediable_type".to_string(),
                allowed: vec!["product".into(), "combo".into(), "variant".into()],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip_through_str() {
        for kind in [
            EntityKind::Item,
            EntityKind::Product,
            EntityKind::Combo,
            EntityKind::Variant,
        ] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("App\\Models\\Product".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_capabilities() {
        assert!(OwnerRef::variant("v1").ensure_attributable().is_ok());
        assert!(OwnerRef::combo("c1").ensure_attributable().is_err());
        assert!(OwnerRef::combo("c1").ensure_mediable().is_ok());
        assert!(OwnerRef::item("i1").ensure_mediable().is_err());
        assert_eq!(EntityKind::Category.table(), "categories");
    }
}
