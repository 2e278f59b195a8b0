use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use super::adapters::StorageError;
use crate::counters::CounterError;
use crate::db::RepoError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvoiceError {
    #[error("invalid invoice request: {0}")]
    InvalidInput(String),

    #[error("invoice conflict: {0}")]
    Conflict(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("invoice batch not found: {0}")]
    BatchNotFound(String),

    #[error("invoice generation failed: {0}")]
    GenerationFailed(String),

    #[error("invoice storage failed: {0}")]
    Storage(String),

    #[error(transparent)]
    Counter(#[from] CounterError),

    #[error("invoice repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("invoice issuance canceled")]
    Canceled,

    #[error("invoice internal error: {0}")]
    Internal(String),
}

pub type InvoiceResult<T> = Result<T, InvoiceError>;

impl From<RepoError> for InvoiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => InvoiceError::OrderNotFound(msg),
            RepoError::Conflict(msg) => InvoiceError::Conflict(msg),
            RepoError::Unavailable(msg) => InvoiceError::RepositoryUnavailable(msg),
            RepoError::Validation(msg) => InvoiceError::InvalidInput(msg),
            RepoError::Internal(msg) => InvoiceError::Internal(msg),
        }
    }
}

impl From<StorageError> for InvoiceError {
    fn from(err: StorageError) -> Self {
        InvoiceError::Storage(err.to_string())
    }
}

impl From<InvoiceError> for AppError {
    fn from(err: InvoiceError) -> Self {
        let code = match &err {
            InvoiceError::InvalidInput(_) => ErrorCode::InvoiceInvalidInput,
            InvoiceError::Conflict(_) => ErrorCode::InvoiceConflict,
            InvoiceError::OrderNotFound(_) => ErrorCode::InvoiceOrderNotFound,
            InvoiceError::BatchNotFound(_) => ErrorCode::NotFound,
            InvoiceError::GenerationFailed(_) => ErrorCode::InvoiceGenerationFailed,
            InvoiceError::Storage(_) => ErrorCode::StorageFailed,
            InvoiceError::Counter(e) => return AppError::from(e.clone()),
            InvoiceError::RepositoryUnavailable(_) => ErrorCode::RepositoryUnavailable,
            InvoiceError::Canceled => ErrorCode::Canceled,
            InvoiceError::Internal(_) => ErrorCode::InternalError,
        };
        AppError::with_message(code, err.to_string())
    }
}
