use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use crate::db::RepoError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShipmentError {
    #[error("invalid shipment request: {0}")]
    InvalidInput(String),

    #[error("shipment not found: {0}")]
    NotFound(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// Over-shipment, illegal order transition, or optimistic-lock mismatch
    #[error("shipment conflict: {0}")]
    Conflict(String),

    #[error("shipment repository unavailable: {0}")]
    Unavailable(String),

    #[error("shipment operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("shipment internal error: {0}")]
    Internal(String),
}

pub type ShipmentResult<T> = Result<T, ShipmentError>;

impl ShipmentError {
    /// 订单仓储错误：NotFound 归为订单缺失
    pub(crate) fn from_order_repo(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => ShipmentError::OrderNotFound(msg),
            other => other.into(),
        }
    }
}

impl From<RepoError> for ShipmentError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => ShipmentError::NotFound(msg),
            RepoError::Conflict(msg) => ShipmentError::Conflict(msg),
            RepoError::Unavailable(msg) => ShipmentError::Unavailable(msg),
            RepoError::Validation(msg) => ShipmentError::InvalidInput(msg),
            RepoError::Internal(msg) => ShipmentError::Internal(msg),
        }
    }
}

impl From<ShipmentError> for AppError {
    fn from(err: ShipmentError) -> Self {
        let code = match &err {
            ShipmentError::InvalidInput(_) => ErrorCode::ShipmentInvalidInput,
            ShipmentError::NotFound(_) => ErrorCode::ShipmentNotFound,
            ShipmentError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            ShipmentError::Conflict(_) => ErrorCode::ShipmentConflict,
            ShipmentError::Unavailable(_) => ErrorCode::RepositoryUnavailable,
            ShipmentError::Unsupported(_) => ErrorCode::ShipmentUnsupported,
            ShipmentError::Internal(_) => ErrorCode::InternalError,
        };
        AppError::with_message(code, err.to_string())
    }
}
