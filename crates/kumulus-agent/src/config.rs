//! Configuration for kumulus-agent.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use kumulus_proto::{AppType, AGENT_DEFAULT_PORT};
use serde::Deserialize;

use crate::error::{AgentError, AgentResult};

/// Top-level configuration for the agent.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Container runtime configuration.
    #[serde(default)]
    pub docker: DockerConfig,

    /// Host port ranges.
    #[serde(default)]
    pub ports: PortConfig,

    /// Periodic pruning of unused host resources.
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
}

impl AgentConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `agent.toml` in the current directory (if present)
    /// 3. Environment variables with `KUMULUS_AGENT_` prefix
    pub fn load() -> AgentResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file("agent.toml")))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> AgentResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file(path.as_ref())))
    }

    fn from_figment(figment: Figment) -> AgentResult<Self> {
        let config: Self = figment
            .merge(Env::prefixed("KUMULUS_AGENT_").split("__"))
            .extract()
            .map_err(|e| AgentError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the agent cannot run safely with.
    pub fn validate(&self) -> AgentResult<()> {
        self.ports.validate()?;
        if self.housekeeping.enabled && self.housekeeping.interval_secs == 0 {
            return Err(AgentError::Config(
                "housekeeping.interval_secs must be positive".into(),
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
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), AGENT_DEFAULT_PORT)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Container runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    /// Path or name of the docker binary.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// DNS servers given to VM containers.
    #[serde(default = "default_dns_servers")]
    pub dns_servers: Vec<String>,

    /// Directory under which per-VM build contexts are created.
    #[serde(default = "default_build_root")]
    pub build_root: PathBuf,

    /// Base image for VM containers.
    #[serde(default = "default_vm_base_image")]
    pub vm_base_image: String,

    /// Pass the requested disk size as `--storage-opt size=`.
    ///
    /// Only works on storage drivers with quota support.
    #[serde(default)]
    pub enforce_disk_quota: bool,
}

fn default_binary() -> PathBuf {
    PathBuf::from("docker")
}

fn default_dns_servers() -> Vec<String> {
    vec!["8.8.8.8".to_owned(), "8.8.4.4".to_owned()]
}

fn default_build_root() -> PathBuf {
    std::env::temp_dir()
}

fn default_vm_base_image() -> String {
    "ubuntu:22.04".to_owned()
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            dns_servers: default_dns_servers(),
            build_root: default_build_root(),
            vm_base_image: default_vm_base_image(),
            enforce_disk_quota: false,
        }
    }
}

/// An inclusive range of host ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PortRange {
    /// First port.
    pub start: u16,
    /// Last port (inclusive).
    pub end: u16,
}

impl PortRange {
    /// Create a new port range.
    #[must_use]
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Whether `port` falls inside the range.
    #[must_use]
    pub const fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Whether two ranges share at least one port.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Iterate the ports in ascending order.
    #[must_use]
    pub const fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Host port ranges for VMs and for each application type.
#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    /// SSH ports for VMs.
    #[serde(default = "default_vm_range")]
    pub vm: PortRange,

    /// Odoo main containers.
    #[serde(default = "default_odoo_range")]
    pub odoo: PortRange,

    /// WordPress main containers.
    #[serde(default = "default_wordpress_range")]
    pub wordpress: PortRange,

    /// Collabora Online main containers.
    #[serde(default = "default_libreoffice_range")]
    pub libreoffice: PortRange,

    /// Nextcloud main containers.
    #[serde(default = "default_nextcloud_range")]
    pub nextcloud: PortRange,
}

const fn default_vm_range() -> PortRange {
    PortRange::new(2222, 2322)
}

const fn default_odoo_range() -> PortRange {
    PortRange::new(8069, 8169)
}

const fn default_wordpress_range() -> PortRange {
    PortRange::new(8180, 8280)
}

const fn default_libreoffice_range() -> PortRange {
    PortRange::new(9980, 10080)
}

const fn default_nextcloud_range() -> PortRange {
    PortRange::new(7000, 7100)
}

impl PortConfig {
    /// Port range for an application type.
    #[must_use]
    pub const fn for_app(&self, app: AppType) -> PortRange {
        match app {
            AppType::Odoo => self.odoo,
            AppType::Wordpress => self.wordpress,
            AppType::Libreoffice => self.libreoffice,
            AppType::Nextcloud => self.nextcloud,
        }
    }

    fn named_ranges(&self) -> [(&'static str, PortRange); 5] {
        [
            ("vm", self.vm),
            ("odoo", self.odoo),
            ("wordpress", self.wordpress),
            ("libreoffice", self.libreoffice),
            ("nextcloud", self.nextcloud),
        ]
    }

    /// Ranges must be well-formed and pairwise disjoint.
    pub fn validate(&self) -> AgentResult<()> {
        let ranges = self.named_ranges();

        for (name, range) in &ranges {
            if range.start == 0 || range.start > range.end {
                return Err(AgentError::Config(format!(
                    "port range '{name}' ({range}) is empty or starts at 0"
                )));
            }
        }

        for (i, (name_a, a)) in ranges.iter().enumerate() {
            for (name_b, b) in ranges.iter().skip(i + 1) {
                if a.overlaps(b) {
                    return Err(AgentError::Config(format!(
                        "port ranges '{name_a}' ({a}) and '{name_b}' ({b}) overlap"
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            vm: default_vm_range(),
            odoo: default_odoo_range(),
            wordpress: default_wordpress_range(),
            libreoffice: default_libreoffice_range(),
            nextcloud: default_nextcloud_range(),
        }
    }
}

/// Periodic pruning configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HousekeepingConfig {
    /// Run the prune task.
    #[serde(default = "default_housekeeping_enabled")]
    pub enabled: bool,

    /// Seconds between prune runs.
    #[serde(default = "default_prune_interval_secs")]
    pub interval_secs: u64,
}

const fn default_housekeeping_enabled() -> bool {
    true
}

const fn default_prune_interval_secs() -> u64 {
    24 * 60 * 60
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            enabled: default_housekeeping_enabled(),
            interval_secs: default_prune_interval_secs(),
        }
    }
}
