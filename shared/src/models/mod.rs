//! Data models
//!
//! Value aggregates owned by their repositories. Cross references use ids
//! (`order_id`, `queue_id`) rather than pointers; summaries such as
//! `Order.metadata["payment"]` are recomputed by the owning service.

pub mod event;
pub mod invoice;
pub mod order;
pub mod payment;
pub mod production;
pub mod shipment;
pub mod system_task;

// Re-exports
pub use event::*;
pub use invoice::*;
pub use order::*;
pub use payment::*;
pub use production::*;
pub use shipment::*;
pub use system_task::*;

/// Free-form metadata map (sorted keys, JSON values)
pub type Metadata = serde_json::Map<String, serde_json::Value>;
