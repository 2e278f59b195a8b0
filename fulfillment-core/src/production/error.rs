use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use crate::db::RepoError;

/// 生产队列错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("invalid production queue: {0}")]
    Invalid(String),

    #[error("production queue not found: {0}")]
    NotFound(String),

    #[error("production queue conflict: {0}")]
    Conflict(String),

    #[error("production queue {0} still has active assignments")]
    HasAssignments(String),

    #[error("production queue repository unavailable: {0}")]
    Unavailable(String),

    #[error("production queue internal error: {0}")]
    Internal(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

impl From<RepoError> for QueueError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => QueueError::NotFound(msg),
            RepoError::Conflict(msg) => QueueError::Conflict(msg),
            RepoError::Unavailable(msg) => QueueError::Unavailable(msg),
            RepoError::Validation(msg) => QueueError::Invalid(msg),
            RepoError::Internal(msg) => QueueError::Internal(msg),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        let code = match &err {
            QueueError::Invalid(_) => ErrorCode::QueueInvalid,
            QueueError::NotFound(_) => ErrorCode::QueueNotFound,
            QueueError::Conflict(_) => ErrorCode::QueueConflict,
            QueueError::HasAssignments(_) => ErrorCode::QueueHasAssignments,
            QueueError::Unavailable(_) => ErrorCode::RepositoryUnavailable,
            QueueError::Internal(_) => ErrorCode::InternalError,
        };
        AppError::with_message(code, err.to_string())
    }
}

/// 看板 / QC 错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("production card not found: {0}")]
    CardNotFound(String),

    #[error("qc inspection not found for card {0}")]
    QcItemNotFound(String),

    #[error("invalid qc action: {0}")]
    QcInvalidAction(String),

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("card {card} cannot move back from {from} to {to}")]
    StageRegression {
        card: String,
        from: String,
        to: String,
    },

    #[error("invalid production card input: {0}")]
    InvalidInput(String),

    #[error("production card conflict: {0}")]
    Conflict(String),

    #[error("production board repository unavailable: {0}")]
    Unavailable(String),

    #[error("production board internal error: {0}")]
    Internal(String),
}

pub type BoardResult<T> = Result<T, BoardError>;

impl From<RepoError> for BoardError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => BoardError::CardNotFound(msg),
            RepoError::Conflict(msg) => BoardError::Conflict(msg),
            RepoError::Unavailable(msg) => BoardError::Unavailable(msg),
            RepoError::Validation(msg) => BoardError::InvalidInput(msg),
            RepoError::Internal(msg) => BoardError::Internal(msg),
        }
    }
}

impl From<BoardError> for AppError {
    fn from(err: BoardError) -> Self {
        let code = match &err {
            BoardError::CardNotFound(_) => ErrorCode::CardNotFound,
            BoardError::QcItemNotFound(_) => ErrorCode::QcItemNotFound,
            BoardError::QcInvalidAction(_) => ErrorCode::QcInvalidAction,
            BoardError::InvalidStage(_) | BoardError::StageRegression { .. } => {
                ErrorCode::StageInvalid
            }
            BoardError::InvalidInput(_) => ErrorCode::ValidationFailed,
            BoardError::Conflict(_) => ErrorCode::Conflict,
            BoardError::Unavailable(_) => ErrorCode::RepositoryUnavailable,
            BoardError::Internal(_) => ErrorCode::InternalError,
        };
        AppError::with_message(code, err.to_string())
    }
}
