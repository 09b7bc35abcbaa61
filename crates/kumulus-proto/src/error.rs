//! Validation errors for wire values.

/// Errors raised while parsing or validating wire values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    /// Size string is not `<int><m|g>`.
    #[error("invalid size '{0}': expected <integer><m|g>")]
    InvalidSize(String),

    /// Username failed the allow-list.
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// SSH public key failed the allow-list.
    #[error("invalid SSH public key: {0}")]
    InvalidSshKey(String),

    /// Host identifier (container, network, deployment id) is unsafe.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Unknown application type.
    #[error("unsupported app type: {0}")]
    UnknownAppType(String),

    /// Unknown enum value on the wire.
    #[error("unknown {kind}: {value}")]
    UnknownValue {
        /// What was being parsed.
        kind: &'static str,
        /// The offending value.
        value: String,
    },
}
