//! Unified error system for the fulfillment core
//!
//! - [`ErrorCode`]: Standardized error codes for all error types
//! - [`ErrorCategory`]: Classification of errors by domain
//! - [`AppError`]: Rich error type with codes, messages, and details
//!
//! Every service error (`QueueError`, `InvoiceError`, `PaymentError`, ...)
//! converts into [`AppError`] so that outer surfaces only deal with one shape.
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode};
//!
//! let err = AppError::with_message(ErrorCode::QueueInvalid, "name is required")
//!     .with_detail("field", "name");
//! assert_eq!(err.code, ErrorCode::QueueInvalid);
//! ```

mod category;
mod codes;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult};
