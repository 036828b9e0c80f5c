//! Error taxonomy shared by the lifecycle engine, the voting ledger and the HTTP layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::aggregator::AggregateError;
use crate::types::RoomStatus;

/// Result type for room operations
pub type TohyoResult<T> = Result<T, TohyoError>;

#[derive(Debug, thiserror::Error)]
pub enum TohyoError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Room is {actual}, operation requires {expected}")]
    InvalidState {
        expected: RoomStatus,
        actual: RoomStatus,
    },

    #[error("Already voted for this option")]
    DuplicateVote,

    #[error("AI summarization failed: {0}")]
    Upstream(String),

    #[error("Admin credential rejected")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl TohyoError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState { .. } | Self::DuplicateVote => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for API clients
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::DuplicateVote => "DUPLICATE_VOTE",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl From<AggregateError> for TohyoError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::EmptyInput => {
                Self::Validation("No opinions have been submitted".to_string())
            }
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for TohyoError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        } else {
            tracing::debug!(error = %self, code, "Request rejected");
        }

        // Don't leak database internals to clients
        let msg = match &self {
            Self::Database(_) => "Internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "code": code, "msg": msg }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            TohyoError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TohyoError::InvalidState {
                expected: RoomStatus::Voting,
                actual: RoomStatus::Closed,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(TohyoError::DuplicateVote.error_code(), "DUPLICATE_VOTE");
        assert_eq!(
            TohyoError::Upstream("boom".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_aggregate_error_mapping() {
        let err: TohyoError = AggregateError::EmptyInput.into();
        assert!(matches!(err, TohyoError::Validation(_)));

        let err: TohyoError = AggregateError::Malformed("4 options".into()).into();
        assert!(matches!(err, TohyoError::Upstream(_)));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = TohyoError::InvalidState {
            expected: RoomStatus::Voting,
            actual: RoomStatus::Closed,
        };
        assert_eq!(err.to_string(), "Room is closed, operation requires voting");
    }
}
