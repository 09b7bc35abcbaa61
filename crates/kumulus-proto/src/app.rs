//! Application types and container roles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Application stacks a developer can deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    /// Odoo ERP backed by PostgreSQL.
    Odoo,
    /// WordPress backed by MySQL.
    Wordpress,
    /// Collabora Online (LibreOffice), no database.
    Libreoffice,
    /// Nextcloud backed by MariaDB.
    Nextcloud,
}

impl AppType {
    /// Every supported application type.
    pub const ALL: [Self; 4] = [Self::Odoo, Self::Wordpress, Self::Libreoffice, Self::Nextcloud];

    /// Get the type name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Odoo => "odoo",
            Self::Wordpress => "wordpress",
            Self::Libreoffice => "libreoffice",
            Self::Nextcloud => "nextcloud",
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppType {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtoError::UnknownAppType(s.to_owned()))
    }
}

/// Role a container plays inside an application deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRole {
    /// The application itself, exposed on a host port.
    Main,
    /// Backing database, reachable inside the deployment network as `db`.
    Database,
    /// Cache sidecar.
    Cache,
    /// Reverse proxy sidecar.
    Proxy,
}

impl ContainerRole {
    /// Get the role name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Database => "database",
            Self::Cache => "cache",
            Self::Proxy => "proxy",
        }
    }

    /// Host container name suffix for this role.
    #[must_use]
    pub const fn name_suffix(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Database => "db",
            Self::Cache => "cache",
            Self::Proxy => "proxy",
        }
    }

    /// Host container name for this role within a deployment.
    #[must_use]
    pub fn container_name(&self, deployment_id: &str) -> String {
        format!("{deployment_id}-{}", self.name_suffix())
    }

    /// Infer the role from a host container name.
    ///
    /// Anything that is not a recognised sidecar suffix is the main container.
    #[must_use]
    pub fn from_container_name(name: &str) -> Self {
        [Self::Database, Self::Cache, Self::Proxy]
            .into_iter()
            .find(|role| name.ends_with(&format!("-{}", role.name_suffix())))
            .unwrap_or(Self::Main)
    }

    /// Start order: backing services before the application.
    #[must_use]
    pub const fn start_rank(&self) -> u8 {
        match self {
            Self::Database => 0,
            Self::Cache => 1,
            Self::Main => 2,
            Self::Proxy => 3,
        }
    }
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContainerRole {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Self::Main),
            "database" => Ok(Self::Database),
            "cache" => Ok(Self::Cache),
            "proxy" => Ok(Self::Proxy),
            _ => Err(ProtoError::UnknownValue {
                kind: "container role",
                value: s.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_type_parses_wire_names() {
        assert_eq!("odoo".parse::<AppType>(), Ok(AppType::Odoo));
        assert_eq!("nextcloud".parse::<AppType>(), Ok(AppType::Nextcloud));
        assert!("drupal".parse::<AppType>().is_err());
    }

    #[test]
    fn app_type_serialises_lowercase() {
        let json = serde_json::to_string(&AppType::Libreoffice).unwrap();
        assert_eq!(json, "\"libreoffice\"");
    }

    #[test]
    fn role_from_container_name() {
        assert_eq!(
            ContainerRole::from_container_name("abc-db"),
            ContainerRole::Database
        );
        assert_eq!(
            ContainerRole::from_container_name("abc-main"),
            ContainerRole::Main
        );
        assert_eq!(
            ContainerRole::from_container_name("abc-dbx"),
            ContainerRole::Main
        );
    }

    #[test]
    fn database_starts_before_main() {
        assert!(ContainerRole::Database.start_rank() < ContainerRole::Main.start_rank());
        assert_eq!(ContainerRole::Database.container_name("d1"), "d1-db");
    }
}
