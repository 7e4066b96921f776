/// Error types for discussion-service
use crate::domain::models::VoteTarget;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a `DiscussionStore` implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The write collided with the `(user_id, target_type, target_id)` vote
    /// uniqueness constraint, or the row it meant to change vanished.
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Store error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid vote value: {0} (expected -1, 0 or 1)")]
    InvalidValue(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Target not found: {0}")]
    TargetNotFound(VoteTarget),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parent comment not found: {0}")]
    ParentNotFound(Uuid),

    #[error("Conflicting concurrent write, retry the request: {0}")]
    ConflictRetryable(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

/// Coarse error classes exposed to the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    ConflictRetryable,
    ParentNotFound,
    Storage,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidTarget(_)
            | ServiceError::InvalidValue(_)
            | ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServiceError::TargetNotFound(_) | ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::ParentNotFound(_) => ErrorKind::ParentNotFound,
            ServiceError::ConflictRetryable(_) => ErrorKind::ConflictRetryable,
            ServiceError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ConflictRetryable
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg) => ServiceError::ConflictRetryable(msg),
            other => ServiceError::Storage(other),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errs: validator::ValidationErrors) -> Self {
        ServiceError::InvalidInput(errs.to_string())
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_maps_to_retryable() {
        let err: ServiceError = StoreError::UniqueViolation("votes_user_post".into()).into();
        assert_eq!(err.kind(), ErrorKind::ConflictRetryable);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_store_errors_are_opaque() {
        let err: ServiceError = StoreError::Internal("disk on fire".into()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(ServiceError::InvalidValue(2).kind(), ErrorKind::InvalidInput);
        assert_eq!(
            ServiceError::InvalidTarget("both".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            ServiceError::TargetNotFound(VoteTarget::Post(Uuid::nil())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ServiceError::ParentNotFound(Uuid::nil()).kind(),
            ErrorKind::ParentNotFound
        );
    }
}
