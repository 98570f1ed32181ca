//! # Validation Module
//!
//! Input validation for the operations the checkout core exposes.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Request layer (outside this workspace)                       │
//! │  ├── Authentication, DTO shape checks                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Selection size, quantities, identifiers, free-text limits        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock >= 0), CHECK (times_used <= max_usage)               │
//! │  ├── UNIQUE one pending order per shopper                              │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_LINE_QUANTITY, MAX_ORDER_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of the shopper's order note.
pub const MAX_MESSAGE_LEN: usize = 500;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Selection Validators
// =============================================================================

/// Validates and normalises a cart selection.
///
/// Returns the ids trimmed, de-duplicated and sorted; sorting gives every
/// caller the same lock order when the lines are later reserved.
pub fn normalize_selection(variant_ids: &[String]) -> ValidationResult<Vec<String>> {
    let mut ids: Vec<String> = variant_ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    ids.sort();
    ids.dedup();

    if ids.is_empty() {
        return Err(ValidationError::Required {
            field: "variant_ids".to_string(),
        });
    }

    if ids.len() > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "variant_ids".to_string(),
            min: 1,
            max: MAX_ORDER_LINES as i64,
        });
    }

    Ok(ids)
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a coupon code.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters of letters, digits, hyphens, underscores
///
/// ## Returns
/// The code, trimmed and upper-cased.
pub fn validate_coupon_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: 50,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(code.to_uppercase())
}

/// Validates the shopper's order note. Blank notes become `None`.
pub fn validate_message(message: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(message) = message.map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(None);
    };

    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(ValidationError::TooLong {
            field: "message".to_string(),
            max: MAX_MESSAGE_LEN,
        });
    }

    Ok(Some(message.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_price_cents() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(1099).is_ok());
        assert!(validate_price_cents(-100).is_err());
    }

    #[test]
    fn test_normalize_selection() {
        let ids = vec![
            "b".to_string(),
            " a ".to_string(),
            "b".to_string(),
            "".to_string(),
        ];
        assert_eq!(normalize_selection(&ids).unwrap(), vec!["a", "b"]);
        assert!(normalize_selection(&[]).is_err());
        assert!(normalize_selection(&["  ".to_string()]).is_err());

        let too_many: Vec<String> = (0..=MAX_ORDER_LINES).map(|i| i.to_string()).collect();
        assert!(normalize_selection(&too_many).is_err());
    }

    #[test]
    fn test_validate_coupon_code() {
        assert_eq!(validate_coupon_code(" save10 ").unwrap(), "SAVE10");
        assert!(validate_coupon_code("").is_err());
        assert!(validate_coupon_code("has space").is_err());
        assert!(validate_coupon_code(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_message() {
        assert_eq!(validate_message(None).unwrap(), None);
        assert_eq!(validate_message(Some("   ")).unwrap(), None);
        assert_eq!(
            validate_message(Some(" leave at door ")).unwrap(),
            Some("leave at door".to_string())
        );
        assert!(validate_message(Some(&"x".repeat(MAX_MESSAGE_LEN + 1))).is_err());
    }
}
