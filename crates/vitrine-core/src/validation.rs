//! # Validation Module
//!
//! Input checks that run before any persistence attempt.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE                                                   │
//! │  ├── Presence, length, ranges, formats                                 │
//! │  └── Fails fast with ValidationError                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Repository (vitrine-db)                                      │
//! │  ├── Tenant ownership of referenced rows                               │
//! │  └── Category cycle checks                                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  ├── CHECK constraints                                                 │
//! │  ├── Partial UNIQUE indexes on live rows                               │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::BPS_SCALE;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest display name accepted for catalog entities.
pub const MAX_NAME_LEN: usize = 255;

/// Longest SKU accepted.
pub const MAX_SKU_LEN: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

/// Non-blank and at most `max` characters.
pub fn validate_required(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Display name of a catalog entity.
pub fn validate_name(value: &str) -> ValidationResult<()> {
    validate_required("name", value, MAX_NAME_LEN)
}

/// Validates a caller-supplied SKU.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Letters, digits, hyphens and underscores only
///
/// ```rust
/// use vitrine_core::validation::validate_sku;
///
/// assert!(validate_sku("TEA-4821").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("TEA 4821").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    validate_required("sku", sku, MAX_SKU_LEN)?;

    if !sku
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates and normalizes a hostname to lower case.
///
/// ```rust
/// use vitrine_core::validation::normalize_hostname;
///
/// assert_eq!(normalize_hostname("Shop.Example.COM").unwrap(), "shop.example.com");
/// assert!(normalize_hostname("bad host").is_err());
/// ```
pub fn normalize_hostname(hostname: &str) -> ValidationResult<String> {
    let host = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
    validate_required("hostname", &host, 253)?;

    let labels_ok = host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    if !labels_ok {
        return Err(ValidationError::InvalidFormat {
            field: "hostname".to_string(),
            reason: "must be dot-separated labels of letters, digits and hyphens".to_string(),
        });
    }

    Ok(host)
}

/// Minimal email shape check: one `@` with text on both sides and a dot in
/// the domain.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    validate_required("email", email, MAX_NAME_LEN)?;

    let valid = match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.contains('@')
        }
        None => false,
    };

    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "email".to_string(),
            reason: "must look like name@example.com".to_string(),
        });
    }
    Ok(())
}

/// ISO-4217 style three-letter code.
pub fn validate_currency(code: &str) -> ValidationResult<()> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be a three-letter upper-case code".to_string(),
        })
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Rejects negative values (quantities, thresholds, prices).
pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Combo line quantity must be at least 1.
pub fn validate_line_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 1 {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Discount in basis points, 0..=10000.
pub fn validate_discount_bps(discount_bps: i64) -> ValidationResult<()> {
    if !(0..=BPS_SCALE).contains(&discount_bps) {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: BPS_SCALE,
        });
    }
    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// `start` must not be after `end`.
pub fn validate_date_window(start: NaiveDate, end: NaiveDate) -> ValidationResult<()> {
    if start > end {
        return Err(ValidationError::InvalidRange {
            start: "start_date".to_string(),
            end: "end_date".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Shoes").is_ok());
        assert!(matches!(validate_name("   "), Err(ValidationError::Required { .. })));
        assert!(matches!(
            validate_name(&"x".repeat(300)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_hostname_rules() {
        assert_eq!(normalize_hostname("A.b.c.").unwrap(), "a.b.c");
        assert!(normalize_hostname("-bad.example.com").is_err());
        assert!(normalize_hostname("a..b").is_err());
        assert!(normalize_hostname("").is_err());
    }

    #[test]
    fn test_email_and_currency() {
        assert!(validate_email("owner@acme.io").is_ok());
        assert!(validate_email("owner.acme.io").is_err());
        assert!(validate_currency("EUR").is_ok());
        assert!(validate_currency("eur").is_err());
    }

    #[test]
    fn test_numeric_rules() {
        assert!(validate_non_negative("quantity", 0).is_ok());
        assert!(validate_non_negative("quantity", -1).is_err());
        assert!(validate_line_quantity(0).is_err());
        assert!(validate_line_quantity(1).is_ok());
        assert!(validate_discount_bps(10_000).is_ok());
        assert!(validate_discount_bps(10_001).is_err());
    }

    #[test]
    fn test_date_window() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        assert!(validate_date_window(d("2024-01-01"), d("2024-01-01")).is_ok());
        assert!(validate_date_window(d("2024-02-01"), d("2024-01-01")).is_err());
    }
}
