//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// - 0xxx: General errors
/// - 4xxx: Order and shipment errors
/// - 5xxx: Payment errors
/// - 6xxx: Production errors
/// - 7xxx: Invoice errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Order and shipment errors (4xxx)
    Order,
    /// Payment errors (5xxx)
    Payment,
    /// Production errors (6xxx)
    Production,
    /// Invoice errors (7xxx)
    Invoice,
    /// System errors (9xxx and anything unassigned)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            4000..5000 => Self::Order,
            5000..6000 => Self::Payment,
            6000..7000 => Self::Production,
            7000..8000 => Self::Invoice,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Order => "order",
            Self::Payment => "payment",
            Self::Production => "production",
            Self::Invoice => "invoice",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(4103), ErrorCategory::Order);
        assert_eq!(ErrorCategory::from_code(5001), ErrorCategory::Payment);
        assert_eq!(ErrorCategory::from_code(6202), ErrorCategory::Production);
        assert_eq!(ErrorCategory::from_code(7004), ErrorCategory::Invoice);
        assert_eq!(ErrorCategory::from_code(9201), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(2001), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::Conflict.category(), ErrorCategory::General);
        assert_eq!(ErrorCode::ShipmentConflict.category(), ErrorCategory::Order);
        assert_eq!(ErrorCode::QcInvalidAction.category(), ErrorCategory::Production);
        assert_eq!(ErrorCode::ExportPublishFailed.category(), ErrorCategory::System);
    }

    #[test]
    fn test_category_serialize() {
        let json = serde_json::to_string(&ErrorCategory::Production).unwrap();
        assert_eq!(json, "\"production\"");
        let category: ErrorCategory = serde_json::from_str("\"invoice\"").unwrap();
        assert_eq!(category, ErrorCategory::Invoice);
    }
}
