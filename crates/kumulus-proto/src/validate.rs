//! Allow-list validation for values that end up in host commands or image
//! definitions.
//!
//! Both the control plane and the agent run these checks: the control plane
//! so bad requests fail before any side effect, the agent because it never
//! trusts its caller.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ProtoError;

/// Maximum accepted length of an SSH public key line.
pub const MAX_SSH_KEY_LENGTH: usize = 16 * 1024;

/// Maximum length for host identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// POSIX-style login names.
static USERNAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").ok());

/// `<type> <base64> [comment]` with a fixed set of key types.
static SSH_KEY_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(ssh-ed25519|ssh-rsa|ecdsa-sha2-nistp256|ecdsa-sha2-nistp384|ecdsa-sha2-nistp521|sk-ssh-ed25519@openssh\.com|sk-ecdsa-sha2-nistp256@openssh\.com) [A-Za-z0-9+/]+={0,3}( [A-Za-z0-9@._+-]{1,128})?$",
    )
    .ok()
});

/// Container, network and deployment identifiers.
static IDENTIFIER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").ok());

/// Accounts that may not be created inside a VM image.
const RESERVED_USERNAMES: [&str; 4] = ["root", "sshd", "nobody", "daemon"];

/// Validate a VM login name.
pub fn validate_username(username: &str) -> Result<(), ProtoError> {
    let Some(pattern) = USERNAME_PATTERN.as_ref() else {
        return Err(ProtoError::InvalidUsername(
            "username validation unavailable".into(),
        ));
    };

    if !pattern.is_match(username) {
        return Err(ProtoError::InvalidUsername(format!(
            "'{username}' must match [a-z_][a-z0-9_-]{{0,31}}"
        )));
    }

    if RESERVED_USERNAMES.contains(&username) {
        return Err(ProtoError::InvalidUsername(format!(
            "'{username}' is reserved"
        )));
    }

    Ok(())
}

/// Validate an OpenSSH public key line.
pub fn validate_ssh_public_key(key: &str) -> Result<(), ProtoError> {
    if key.len() > MAX_SSH_KEY_LENGTH {
        return Err(ProtoError::InvalidSshKey(format!(
            "key exceeds {MAX_SSH_KEY_LENGTH} bytes"
        )));
    }

    let Some(pattern) = SSH_KEY_PATTERN.as_ref() else {
        return Err(ProtoError::InvalidSshKey(
            "key validation unavailable".into(),
        ));
    };

    if !pattern.is_match(key.trim_end()) {
        return Err(ProtoError::InvalidSshKey(
            "expected '<type> <base64> [comment]' with a supported key type".into(),
        ));
    }

    Ok(())
}

/// Validate an identifier that is passed to the container runtime.
pub fn validate_identifier(id: &str) -> Result<(), ProtoError> {
    if id.is_empty() || id.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ProtoError::InvalidIdentifier(format!(
            "identifier must be 1-{MAX_IDENTIFIER_LENGTH} characters"
        )));
    }

    let Some(pattern) = IDENTIFIER_PATTERN.as_ref() else {
        return Err(ProtoError::InvalidIdentifier(
            "identifier validation unavailable".into(),
        ));
    };

    if !pattern.is_match(id) {
        return Err(ProtoError::InvalidIdentifier(format!(
            "'{id}' contains invalid characters"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ED25519: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIMx9lG3kJ0hZrjmN4cQ2bqk8b0Zf1J9t2GfP6mHcXy3p dev@laptop";

    #[test]
    fn accepts_ordinary_usernames() {
        for name in ["alice", "_svc", "dev-01", "a"] {
            assert!(validate_username(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_injection_in_usernames() {
        for name in [
            "",
            "Alice",
            "bob; rm -rf /",
            "$(id)",
            "name\nRUN echo",
            "root",
            "a-very-long-username-that-goes-past-32",
        ] {
            assert!(validate_username(name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn accepts_supported_key_types() {
        assert!(validate_ssh_public_key(ED25519).is_ok());
        assert!(validate_ssh_public_key("ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQ==").is_ok());
        assert!(validate_ssh_public_key(&format!("{ED25519}\n")).is_ok());
    }

    #[test]
    fn rejects_malformed_keys() {
        for key in [
            "",
            "ssh-dss AAAAB3NzaC1kc3M=",
            "ssh-ed25519",
            "ssh-ed25519 AAAA\" && curl evil",
            "ssh-ed25519 AAAA $(reboot)",
            "ssh-ed25519 AAAA\nRUN rm -rf /",
        ] {
            assert!(validate_ssh_public_key(key).is_err(), "{key:?}");
        }
    }

    #[test]
    fn identifiers() {
        assert!(validate_identifier("0f8e-network").is_ok());
        assert!(validate_identifier("-rm").is_err());
        assert!(validate_identifier("a b").is_err());
        assert!(validate_identifier(&"x".repeat(200)).is_err());
    }
}
