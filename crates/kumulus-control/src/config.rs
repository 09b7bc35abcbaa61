//! Configuration for kumulus-control.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use kumulus_proto::AGENT_DEFAULT_PORT;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Top-level configuration for the control service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Registry backend configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Provisioning agent client configuration.
    #[serde(default)]
    pub agent: AgentClientConfig,

    /// Placement policy configuration.
    #[serde(default)]
    pub scheduling: SchedulingConfig,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `control.toml` in the current directory (if present)
    /// 3. Environment variables with `KUMULUS_CONTROL_` prefix
    pub fn load() -> ControlResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file("control.toml")))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file(path.as_ref())))
    }

    fn from_figment(figment: Figment) -> ControlResult<Self> {
        let config: Self = figment
            .merge(Env::prefixed("KUMULUS_CONTROL_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the control plane cannot run with.
    pub fn validate(&self) -> ControlResult<()> {
        if self.scheduling.max_load == 0 {
            return Err(ControlError::Config(
                "scheduling.max_load must be positive".into(),
            ));
        }
        if self.agent.port == 0 {
            return Err(ControlError::Config("agent.port must be non-zero".into()));
        }
        if self.agent.request_timeout_secs == 0 {
            return Err(ControlError::Config(
                "agent.request_timeout_secs must be positive".into(),
            ));
        }
        if self.database.backend == DatabaseBackend::Postgres
            && self.database.min_connections > self.database.max_connections
        {
            return Err(ControlError::Config(
                "database.min_connections exceeds max_connections".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8083)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Which registry implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    /// PostgreSQL through a connection pool.
    #[default]
    Postgres,

    /// In-process registry; state is lost on exit.
    Memory,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Registry backend.
    #[serde(default)]
    pub backend: DatabaseBackend,

    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_database_url() -> String {
    "postgres://localhost/kumulus".to_owned()
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_min_connections() -> u32 {
    1
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// How the control plane reaches provisioning agents.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentClientConfig {
    /// Port every agent listens on.
    #[serde(default = "default_agent_port")]
    pub port: u16,

    /// Deadline for a single agent call. Image builds dominate this.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

const fn default_agent_port() -> u16 {
    AGENT_DEFAULT_PORT
}

const fn default_request_timeout_secs() -> u64 {
    300
}

impl AgentClientConfig {
    /// Request deadline as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            port: default_agent_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Placement policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulingConfig {
    /// A resource is eligible while its load is below this value.
    #[serde(default = "default_max_load")]
    pub max_load: u32,
}

const fn default_max_load() -> u32 {
    crate::scheduler::MAX_LOAD
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            max_load: default_max_load(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ControlConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8083);
        assert_eq!(config.database.backend, DatabaseBackend::Postgres);
        assert_eq!(config.database.url, "postgres://localhost/kumulus");
        assert_eq!(config.agent.port, 8800);
        assert_eq!(config.agent.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.scheduling.max_load, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_toml_config() {
        let toml = r#"
            [server]
            listen_addr = "127.0.0.1:9000"

            [database]
            backend = "memory"

            [agent]
            port = 9800
            request_timeout_secs = 60

            [scheduling]
            max_load = 3
        "#;

        let config: ControlConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.database.backend, DatabaseBackend::Memory);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.agent.port, 9800);
        assert_eq!(config.agent.request_timeout_secs, 60);
        assert_eq!(config.scheduling.max_load, 3);
    }

    #[test]
    fn zero_max_load_is_rejected() {
        let config: ControlConfig = toml::from_str("[scheduling]\nmax_load = 0").unwrap();
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));
    }

    #[test]
    fn pool_bounds_are_checked_for_postgres_only() {
        let mut config: ControlConfig = toml::from_str(
            "[database]\nmax_connections = 1\nmin_connections = 4",
        )
        .unwrap();
        assert!(config.validate().is_err());

        config.database.backend = DatabaseBackend::Memory;
        assert!(config.validate().is_ok());
    }
}
