use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use super::processor::ProcessorError;
use crate::db::RepoError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("invalid payment request: {0}")]
    InvalidInput(String),

    #[error("payment not found: {0}")]
    NotFound(String),

    #[error("payment conflict: {0}")]
    Conflict(String),

    #[error("payment state does not allow this action: {0}")]
    InvalidState(String),

    #[error("payment dependency unavailable: {0}")]
    Unavailable(String),

    #[error("payment processor failed: {0}")]
    Processor(String),

    #[error("payment internal error: {0}")]
    Internal(String),
}

pub type PaymentResult<T> = Result<T, PaymentError>;

impl PaymentError {
    /// Webhook adapters answer 202 for events that reference unknown aggregates
    pub fn is_ignorable_webhook(&self) -> bool {
        matches!(self, PaymentError::NotFound(_))
    }
}

impl From<RepoError> for PaymentError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => PaymentError::NotFound(msg),
            RepoError::Conflict(msg) => PaymentError::Conflict(msg),
            RepoError::Unavailable(msg) => PaymentError::Unavailable(msg),
            RepoError::Validation(msg) => PaymentError::InvalidInput(msg),
            RepoError::Internal(msg) => PaymentError::Internal(msg),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let code = match &err {
            PaymentError::InvalidInput(_) => ErrorCode::PaymentInvalidInput,
            PaymentError::NotFound(_) => ErrorCode::PaymentNotFound,
            PaymentError::Conflict(_) => ErrorCode::PaymentConflict,
            PaymentError::InvalidState(_) => ErrorCode::PaymentInvalidState,
            PaymentError::Unavailable(_) => ErrorCode::DependencyUnavailable,
            PaymentError::Processor(_) => ErrorCode::PaymentProcessorFailed,
            PaymentError::Internal(_) => ErrorCode::InternalError,
        };
        AppError::with_message(code, err.to_string())
    }
}

/// 处理器错误按动作包装（`capture failed: ...`）
pub(crate) fn processor_failure(action: &str, err: ProcessorError) -> PaymentError {
    match err {
        ProcessorError::Invalid(msg) => {
            PaymentError::InvalidInput(format!("{} failed: {}", action, msg))
        }
        ProcessorError::Unavailable(msg) => {
            PaymentError::Unavailable(format!("{} failed: {}", action, msg))
        }
        ProcessorError::Declined(msg) => {
            PaymentError::Processor(format!("{} failed: {}", action, msg))
        }
    }
}
