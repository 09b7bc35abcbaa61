//! Resource size strings such as `512m` or `1g`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtoError;

/// A memory or disk size, stored in mebibytes.
///
/// The wire form is `<integer><m|g>`; uppercase suffixes are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Size {
    megabytes: u64,
}

impl Size {
    /// Create a size from mebibytes.
    #[must_use]
    pub const fn from_megabytes(megabytes: u64) -> Self {
        Self { megabytes }
    }

    /// Create a size from gibibytes.
    #[must_use]
    pub const fn from_gigabytes(gigabytes: u64) -> Self {
        Self {
            megabytes: gigabytes.saturating_mul(1024),
        }
    }

    /// Size in mebibytes.
    #[must_use]
    pub const fn megabytes(&self) -> u64 {
        self.megabytes
    }

    /// Parse a `<integer><m|g>` string.
    pub fn parse(s: &str) -> Result<Self, ProtoError> {
        let invalid = || ProtoError::InvalidSize(s.to_owned());
        let trimmed = s.trim();
        let Some((unit_at, _)) = trimmed.char_indices().last() else {
            return Err(invalid());
        };
        let (digits, unit) = trimmed.split_at(unit_at);

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        if value == 0 {
            return Err(invalid());
        }

        match unit {
            "m" | "M" => Ok(Self::from_megabytes(value)),
            "g" | "G" => value
                .checked_mul(1024)
                .map(Self::from_megabytes)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }

    /// Format for `docker run --memory`.
    #[must_use]
    pub fn docker_arg(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.megabytes % 1024 == 0 {
            write!(f, "{}g", self.megabytes / 1024)
        } else {
            write!(f, "{}m", self.megabytes)
        }
    }
}

impl std::str::FromStr for Size {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Size {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Size {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
