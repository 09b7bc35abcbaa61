//! Error types for kumulus-control.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kumulus_proto::{ErrorBody, ProtoError};
use tracing::error;

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur in the control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Malformed request or a lifecycle call that would be a no-op.
    #[error("validation error: {0}")]
    Validation(String),

    /// The caller did not identify as a developer.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Record or host resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: &'static str,
        /// Attempted target state.
        to: &'static str,
    },

    /// Record already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No provider resource can take another workload.
    #[error("no provider resource has spare capacity")]
    CapacityExhausted,

    /// The provisioning agent reported a failure.
    #[error("agent error: {message}")]
    AgentFailure {
        /// Agent's error message.
        message: String,
        /// Captured host command output, when the agent sent it.
        details: Option<serde_json::Value>,
    },

    /// The agent did not answer within the deadline; the outcome is unknown.
    #[error("agent did not respond within {0} seconds")]
    AgentTimeout(u64),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an agent failure without details.
    #[must_use]
    pub fn agent(msg: impl Into<String>) -> Self {
        Self::AgentFailure {
            message: msg.into(),
            details: None,
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means the target no longer exists.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Machine-readable error category.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::NotFound(_) => "not_found",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::Conflict(_) => "conflict",
            Self::CapacityExhausted => "capacity_exhausted",
            Self::AgentFailure { .. } => "agent_failure",
            Self::AgentTimeout(_) => "agent_timeout",
            Self::Database(_) => "database_error",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
            Self::Serialisation(_) => "serialisation_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidStateTransition { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::AgentTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::AgentFailure { .. }
            | Self::Database(_)
            | Self::Http(_)
            | Self::Config(_)
            | Self::Serialisation(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProtoError> for ControlError {
    fn from(err: ProtoError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, kind = self.error_type(), "request failed");
        }

        let body = match self {
            Self::AgentFailure {
                message,
                details: Some(details),
            } => ErrorBody::new(message).with_details(details),
            Self::AgentFailure { message, .. } => ErrorBody::new(message),
            // Keep driver detail out of responses; it is in the log above.
            Self::Database(_) => ErrorBody::new("database error"),
            other => ErrorBody::new(other.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            ControlError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ControlError::Unauthenticated("missing header".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ControlError::InvalidStateTransition {
                from: "deleted",
                to: "running"
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ControlError::CapacityExhausted.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ControlError::agent("docker run failed").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ControlError::AgentTimeout(300).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn proto_errors_become_validation() {
        let err: ControlError = ProtoError::InvalidSize("12x".into()).into();
        assert_eq!(err.error_type(), "validation_error");
    }
}
