//! Unified error handling
//!
//! Nothing in this subsystem is allowed to escalate into a process-level
//! failure: delivery loss, version conflicts and sync failures all degrade
//! toward eventual consistency. [`AppError`] exists for the cases callers can
//! act on (bad input, missing entity, repository trouble).

use serde::Serialize;

/// Application error enumeration
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Underlying persistence read failed during a sync pass. The previous
    /// cache is retained and the staleness marker stays set.
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code, mirrored to clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "E0003",
            AppError::Invalid(_) => "E0006",
            AppError::Conflict(_) => "E0004",
            AppError::Repository(_) => "E9002",
            AppError::Internal(_) => "E9001",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Serializable error body for transport adapters
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_stable() {
        assert_eq!(AppError::not_found("x").code(), "E0003");
        assert_eq!(AppError::repository("x").code(), "E9002");
        assert_eq!(AppError::internal("x").code(), "E9001");
    }
}
