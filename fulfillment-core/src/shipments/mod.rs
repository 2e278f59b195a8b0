//! 发货模块
//!
//! - [`ShipmentService`] 创建发货单、数量上限校验、订单自动发货
//! - [`ShippingLabelProvider`] 承运商面单端口

mod error;
mod labels;
mod service;

pub use error::{ShipmentError, ShipmentResult};
pub use labels::{LabelError, ShipmentPackage, ShippingLabel, ShippingLabelProvider, ShippingLabelRequest};
pub use service::{
    CreateShipmentCommand, ShipmentEventCommand, ShipmentService, UpdateShipmentCommand,
    remaining_quantities,
};
