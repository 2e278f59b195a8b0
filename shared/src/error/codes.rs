//! Unified error codes for the fulfillment core
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Order and shipment errors
//! - 5xxx: Payment errors
//! - 6xxx: Production errors
//! - 7xxx: Invoice errors
//! - 9xxx: System errors (export, storage, downstream)

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Concurrent modification detected
    Conflict = 6,
    /// Action not allowed in current state
    InvalidState = 7,
    /// Operation canceled by caller
    Canceled = 8,

    // ==================== 4xxx: Order / Shipment ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order status transition not allowed
    OrderInvalidTransition = 4002,
    /// Shipment not found
    ShipmentNotFound = 4101,
    /// Shipment input invalid
    ShipmentInvalidInput = 4102,
    /// Shipment exceeds remaining quantity
    ShipmentConflict = 4103,
    /// Shipment operation not supported
    ShipmentUnsupported = 4104,

    // ==================== 5xxx: Payment ====================
    /// Payment not found
    PaymentNotFound = 5001,
    /// Payment input invalid
    PaymentInvalidInput = 5002,
    /// Payment update conflicted
    PaymentConflict = 5003,
    /// Payment state forbids the action
    PaymentInvalidState = 5004,
    /// Payment processor failure
    PaymentProcessorFailed = 5005,

    // ==================== 6xxx: Production ====================
    /// Production queue not found
    QueueNotFound = 6001,
    /// Production queue input invalid
    QueueInvalid = 6002,
    /// Production queue update conflicted
    QueueConflict = 6003,
    /// Production queue still has assignments
    QueueHasAssignments = 6004,
    /// Production card not found
    CardNotFound = 6101,
    /// Stage is not valid for the card
    StageInvalid = 6102,
    /// QC inspection not found
    QcItemNotFound = 6201,
    /// QC action not allowed
    QcInvalidAction = 6202,

    // ==================== 7xxx: Invoice ====================
    /// Invoice input invalid
    InvoiceInvalidInput = 7001,
    /// Invoice already exists for order
    InvoiceConflict = 7002,
    /// Invoice order not found
    InvoiceOrderNotFound = 7003,
    /// Invoice document generation failed
    InvoiceGenerationFailed = 7004,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Repository unavailable
    RepositoryUnavailable = 9002,
    /// Downstream dependency unavailable
    DependencyUnavailable = 9003,
    /// Counter exhausted
    CounterExhausted = 9101,
    /// Export input invalid
    ExportInvalidInput = 9201,
    /// Export publish failed
    ExportPublishFailed = 9202,
    /// Storage write failed
    StorageFailed = 9301,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::Conflict => "Resource was modified concurrently",
            ErrorCode::InvalidState => "Action not allowed in current state",
            ErrorCode::Canceled => "Operation canceled",

            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderInvalidTransition => "Order status transition not allowed",
            ErrorCode::ShipmentNotFound => "Shipment not found",
            ErrorCode::ShipmentInvalidInput => "Invalid shipment input",
            ErrorCode::ShipmentConflict => "Shipment exceeds remaining quantity",
            ErrorCode::ShipmentUnsupported => "Shipment operation not supported",

            ErrorCode::PaymentNotFound => "Payment not found",
            ErrorCode::PaymentInvalidInput => "Invalid payment input",
            ErrorCode::PaymentConflict => "Payment was modified concurrently",
            ErrorCode::PaymentInvalidState => "Payment state does not allow this action",
            ErrorCode::PaymentProcessorFailed => "Payment processor failed",

            ErrorCode::QueueNotFound => "Production queue not found",
            ErrorCode::QueueInvalid => "Invalid production queue",
            ErrorCode::QueueConflict => "Production queue was modified concurrently",
            ErrorCode::QueueHasAssignments => "Production queue has active assignments",
            ErrorCode::CardNotFound => "Production card not found",
            ErrorCode::StageInvalid => "Invalid production stage",
            ErrorCode::QcItemNotFound => "QC inspection not found",
            ErrorCode::QcInvalidAction => "QC action not allowed",

            ErrorCode::InvoiceInvalidInput => "Invalid invoice input",
            ErrorCode::InvoiceConflict => "Invoice already issued for order",
            ErrorCode::InvoiceOrderNotFound => "Invoice order not found",
            ErrorCode::InvoiceGenerationFailed => "Invoice generation failed",

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::RepositoryUnavailable => "Repository unavailable",
            ErrorCode::DependencyUnavailable => "Downstream dependency unavailable",
            ErrorCode::CounterExhausted => "Counter exhausted",
            ErrorCode::ExportInvalidInput => "Invalid export request",
            ErrorCode::ExportPublishFailed => "Export publish failed",
            ErrorCode::StorageFailed => "Storage write failed",
        }
    }

    /// HTTP status an outer surface should use for this code
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::Success => StatusCode::OK,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidRequest
            | ErrorCode::ShipmentInvalidInput
            | ErrorCode::PaymentInvalidInput
            | ErrorCode::QueueInvalid
            | ErrorCode::StageInvalid
            | ErrorCode::InvoiceInvalidInput
            | ErrorCode::ExportInvalidInput => StatusCode::BAD_REQUEST,

            ErrorCode::NotFound
            | ErrorCode::OrderNotFound
            | ErrorCode::ShipmentNotFound
            | ErrorCode::PaymentNotFound
            | ErrorCode::QueueNotFound
            | ErrorCode::CardNotFound
            | ErrorCode::QcItemNotFound
            | ErrorCode::InvoiceOrderNotFound => StatusCode::NOT_FOUND,

            ErrorCode::AlreadyExists
            | ErrorCode::Conflict
            | ErrorCode::ShipmentConflict
            | ErrorCode::PaymentConflict
            | ErrorCode::QueueConflict
            | ErrorCode::QueueHasAssignments
            | ErrorCode::InvoiceConflict => StatusCode::CONFLICT,

            ErrorCode::InvalidState
            | ErrorCode::OrderInvalidTransition
            | ErrorCode::PaymentInvalidState
            | ErrorCode::QcInvalidAction => StatusCode::UNPROCESSABLE_ENTITY,

            ErrorCode::ShipmentUnsupported => StatusCode::NOT_IMPLEMENTED,

            ErrorCode::Canceled => StatusCode::REQUEST_TIMEOUT,

            ErrorCode::RepositoryUnavailable
            | ErrorCode::DependencyUnavailable
            | ErrorCode::ExportPublishFailed => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::PaymentProcessorFailed | ErrorCode::InvoiceGenerationFailed => {
                StatusCode::BAD_GATEWAY
            }

            ErrorCode::Unknown
            | ErrorCode::InternalError
            | ErrorCode::CounterExhausted
            | ErrorCode::StorageFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::Conflict),
            7 => Ok(ErrorCode::InvalidState),
            8 => Ok(ErrorCode::Canceled),

            // Order / Shipment
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderInvalidTransition),
            4101 => Ok(ErrorCode::ShipmentNotFound),
            4102 => Ok(ErrorCode::ShipmentInvalidInput),
            4103 => Ok(ErrorCode::ShipmentConflict),
            4104 => Ok(ErrorCode::ShipmentUnsupported),

            // Payment
            5001 => Ok(ErrorCode::PaymentNotFound),
            5002 => Ok(ErrorCode::PaymentInvalidInput),
            5003 => Ok(ErrorCode::PaymentConflict),
            5004 => Ok(ErrorCode::PaymentInvalidState),
            5005 => Ok(ErrorCode::PaymentProcessorFailed),

            // Production
            6001 => Ok(ErrorCode::QueueNotFound),
            6002 => Ok(ErrorCode::QueueInvalid),
            6003 => Ok(ErrorCode::QueueConflict),
            6004 => Ok(ErrorCode::QueueHasAssignments),
            6101 => Ok(ErrorCode::CardNotFound),
            6102 => Ok(ErrorCode::StageInvalid),
            6201 => Ok(ErrorCode::QcItemNotFound),
            6202 => Ok(ErrorCode::QcInvalidAction),

            // Invoice
            7001 => Ok(ErrorCode::InvoiceInvalidInput),
            7002 => Ok(ErrorCode::InvoiceConflict),
            7003 => Ok(ErrorCode::InvoiceOrderNotFound),
            7004 => Ok(ErrorCode::InvoiceGenerationFailed),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::RepositoryUnavailable),
            9003 => Ok(ErrorCode::DependencyUnavailable),
            9101 => Ok(ErrorCode::CounterExhausted),
            9201 => Ok(ErrorCode::ExportInvalidInput),
            9202 => Ok(ErrorCode::ExportPublishFailed),
            9301 => Ok(ErrorCode::StorageFailed),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
