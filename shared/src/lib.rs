//! Shared types for the fulfillment core
//!
//! Domain models (orders, payments, shipments, invoices, production queues and
//! cards, system tasks), the unified error type and small utilities used by
//! `fulfillment-core` and by any outer surface built on top of it.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult, ErrorCode};
