//! # Stock Status Rules
//!
//! Derived inventory state. Two pure functions:
//!
//! ```text
//! Variant stock                         Combo aggregate
//! ─────────────                         ───────────────
//! quantity == 0          → Stock Out    any line missing / short → out_of_stock
//! quantity <= threshold  → Low Stock    any line at/under thresh → low_stock
//! otherwise              → Available    otherwise (or no lines)  → available
//! ```
//!
//! `Stock.status` is persisted, so every quantity/threshold write must
//! recompute it with [`StockStatus::derive`]. Combo status is recomputed on
//! demand from [`ComboLineStock`] snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Default low-stock threshold for new stock rows.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

// =============================================================================
// Variant Stock Status
// =============================================================================

/// Status of a single variant's stock row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT"))]
#[ts(export)]
pub enum StockStatus {
    #[serde(rename = "Available")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Available"))]
    Available,

    #[serde(rename = "Low Stock")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Low Stock"))]
    LowStock,

    #[serde(rename = "Stock Out")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Stock Out"))]
    StockOut,
}

impl StockStatus {
    /// Derives the status from quantity and threshold.
    ///
    /// ```rust
    /// use vitrine_core::stock::StockStatus;
    ///
    /// assert_eq!(StockStatus::derive(0, 5), StockStatus::StockOut);
    /// assert_eq!(StockStatus::derive(3, 5), StockStatus::LowStock);
    /// assert_eq!(StockStatus::derive(10, 5), StockStatus::Available);
    /// ```
    pub fn derive(quantity: i64, low_stock_threshold: i64) -> Self {
        if quantity <= 0 {
            StockStatus::StockOut
        } else if quantity <= low_stock_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::Available
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            StockStatus::Available => "Available",
            StockStatus::LowStock => "Low Stock",
            StockStatus::StockOut => "Stock Out",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Combo Aggregate Status
// =============================================================================

/// Aggregate availability of a combo bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ComboStockStatus {
    #[default]
    Available,
    LowStock,
    OutOfStock,
}

impl ComboStockStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ComboStockStatus::Available => "available",
            ComboStockStatus::LowStock => "low_stock",
            ComboStockStatus::OutOfStock => "out_of_stock",
        }
    }
}

impl fmt::Display for ComboStockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One combo line resolved against its variant's live stock row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboLineStock {
    /// Units of the variant the combo consumes.
    pub required_quantity: i64,
    /// `(quantity, low_stock_threshold)` of the live stock row, if any.
    pub stock: Option<(i64, i64)>,
}

impl ComboLineStock {
    pub fn new(required_quantity: i64, stock: Option<(i64, i64)>) -> Self {
        ComboLineStock {
            required_quantity,
            stock,
        }
    }
}

/// Aggregates combo availability over its lines.
///
/// The first missing or short line decides `OutOfStock`. A combo with no
/// lines is `Available`.
pub fn aggregate_combo_status<'a, I>(lines: I) -> ComboStockStatus
where
    I: IntoIterator<Item = &'a ComboLineStock>,
{
    let mut status = ComboStockStatus::Available;

    for line in lines {
        match line.stock {
            None => return ComboStockStatus::OutOfStock,
            Some((quantity, _)) if quantity < line.required_quantity => {
                return ComboStockStatus::OutOfStock;
            }
            Some((quantity, threshold)) if quantity <= threshold => {
                status = ComboStockStatus::LowStock;
            }
            Some(_) => {}
        }
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_status_boundaries() {
        assert_eq!(StockStatus::derive(0, 5), StockStatus::StockOut);
        assert_eq!(StockStatus::derive(1, 5), StockStatus::LowStock);
        assert_eq!(StockStatus::derive(5, 5), StockStatus::LowStock);
        assert_eq!(StockStatus::derive(6, 5), StockStatus::Available);
        assert_eq!(StockStatus::derive(1, 0), StockStatus::Available);
    }

    #[test]
    fn test_stock_status_serializes_display_labels() {
        let json = serde_json::to_string(&StockStatus::LowStock).unwrap();
        assert_eq!(json, "\"Low Stock\"");
        let json = serde_json::to_string(&ComboStockStatus::OutOfStock).unwrap();
        assert_eq!(json, "\"out_of_stock\"");
    }

    #[test]
    fn test_combo_short_line_is_out_of_stock() {
        let lines = [ComboLineStock::new(2, Some((1, 5)))];
        assert_eq!(aggregate_combo_status(&lines), ComboStockStatus::OutOfStock);
    }

    #[test]
    fn test_combo_line_under_threshold_is_low_stock() {
        let lines = [ComboLineStock::new(1, Some((2, 5)))];
        assert_eq!(aggregate_combo_status(&lines), ComboStockStatus::LowStock);
    }

    #[test]
    fn test_combo_plenty_is_available() {
        let lines = [ComboLineStock::new(1, Some((20, 5)))];
        assert_eq!(aggregate_combo_status(&lines), ComboStockStatus::Available);
    }

    #[test]
    fn test_combo_missing_stock_wins_over_low() {
        let lines = [
            ComboLineStock::new(1, Some((3, 5))),
            ComboLineStock::new(1, None),
            ComboLineStock::new(1, Some((50, 5))),
        ];
        assert_eq!(aggregate_combo_status(&lines), ComboStockStatus::OutOfStock);
    }

    #[test]
    fn test_empty_combo_is_available() {
        let lines: [ComboLineStock; 0] = [];
        assert_eq!(aggregate_combo_status(&lines), ComboStockStatus::Available);
    }
}
