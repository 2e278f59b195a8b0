use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use super::publisher::PublishError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("invalid export request: {0}")]
    InvalidInput(String),

    #[error("export task not found: {0}")]
    TaskNotFound(String),

    #[error("publish bigquery export: {0}")]
    Publish(#[from] PublishError),
}

pub type ExportResult<T> = Result<T, ExportError>;

impl From<ExportError> for AppError {
    fn from(err: ExportError) -> Self {
        let code = match &err {
            ExportError::InvalidInput(_) => ErrorCode::ExportInvalidInput,
            ExportError::TaskNotFound(_) => ErrorCode::NotFound,
            ExportError::Publish(_) => ErrorCode::ExportPublishFailed,
        };
        AppError::with_message(code, err.to_string())
    }
}
