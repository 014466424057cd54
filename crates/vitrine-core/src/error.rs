//! # Error Types
//!
//! Domain-specific error types for vitrine-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  vitrine-core errors (this file)                                       │
//! │  ├── CoreError        - Scope, transition and lookup failures          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  vitrine-db errors (separate crate)                                    │
//! │  └── DbError          - Storage, uniqueness and cascade failures       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant here is recoverable at the request boundary. Only
//! storage-layer connection loss (in vitrine-db) is fatal.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Catalog rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A tenant-scoped operation ran without a resolvable tenant.
    ///
    /// ## When This Occurs
    /// - `RequestScope::Global` used where a tenant is required
    /// - Tenant id or hostname does not resolve to a live tenant
    /// - Tenant exists but is inactive or suspended
    #[error("Tenant scope required: {reason}")]
    Scope { reason: String },

    /// A disallowed state change.
    ///
    /// ## When This Occurs
    /// - Re-typing an item (product ↔ combo)
    /// - Reparenting a category under itself or one of its descendants
    #[error("Invalid transition for {entity}: {reason}")]
    InvalidTransition { entity: String, reason: String },

    /// Entity referenced by a rule does not exist (or is tombstoned).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a Scope error.
    pub fn scope(reason: impl Into<String>) -> Self {
        CoreError::Scope {
            reason: reason.into(),
        }
    }

    /// Creates an InvalidTransition error.
    pub fn invalid_transition(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidTransition {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any persistence attempt.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g., hostname, SKU characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Start/end pair out of order.
    #[error("{start} must not be after {end}")]
    InvalidRange { start: String, end: String },
}

impl ValidationError {
    /// Shorthand for `Required`.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::invalid_transition("item", "item_type cannot change");
        assert_eq!(
            err.to_string(),
            "Invalid transition for item: item_type cannot change"
        );

        let err = CoreError::scope("no tenant established");
        assert_eq!(err.to_string(), "Tenant scope required: no tenant established");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("name").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: name is required");
    }
}
