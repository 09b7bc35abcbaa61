//! Error types for kumulus-agent.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kumulus_proto::{CommandDetails, ErrorBody, ProtoError};

/// Result type alias using [`AgentError`].
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur while provisioning on this host.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Request rejected before touching the host.
    #[error("validation error: {0}")]
    Validation(String),

    /// Container, VM or deployment does not exist on this host.
    #[error("{0}")]
    NotFound(String),

    /// A host command exited unsuccessfully.
    #[error("{context}")]
    CommandFailed {
        /// What the agent was doing.
        context: String,
        /// Captured process output.
        details: CommandDetails,
    },

    /// No free port left in the range.
    #[error("no available ports in range {start}-{end}")]
    PortsExhausted {
        /// First port of the range.
        start: u16,
        /// Last port of the range.
        end: u16,
    },

    /// Filesystem or process spawn error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
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

    /// Create a command failure carrying the captured output.
    #[must_use]
    pub fn command_failed(context: impl Into<String>, stdout: String, stderr: String) -> Self {
        Self::CommandFailed {
            context: context.into(),
            details: CommandDetails { stdout, stderr },
        }
    }

    /// Machine-readable error category.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::CommandFailed { .. } => "command_failed",
            Self::PortsExhausted { .. } => "ports_exhausted",
            Self::Io(_) => "io_error",
            Self::Config(_) => "config_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PortsExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::CommandFailed { .. } | Self::Io(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ProtoError> for AgentError {
    fn from(err: ProtoError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = ErrorBody::new(self.to_string());
        if let Self::CommandFailed { details, .. } = &self {
            if let Ok(value) = serde_json::to_value(details) {
                body = body.with_details(value);
            }
        }
        (status, Json(body)).into_response()
    }
}
