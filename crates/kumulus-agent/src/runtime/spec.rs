//! `docker run` argument builder.

use std::collections::BTreeMap;

use kumulus_proto::Size;

/// Builder for a detached `docker run` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    name: String,
    image: String,
    network: Option<String>,
    network_alias: Option<String>,
    env: BTreeMap<String, String>,
    cpus: Option<u32>,
    memory: Option<Size>,
    storage: Option<Size>,
    publish: Vec<(u16, u16)>,
    dns: Vec<String>,
    volumes: Vec<String>,
}

impl RunSpec {
    /// Create a spec for a named container running `image`.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            network: None,
            network_alias: None,
            env: BTreeMap::new(),
            cpus: None,
            memory: None,
            storage: None,
            publish: Vec::new(),
            dns: Vec::new(),
            volumes: Vec::new(),
        }
    }

    /// Attach to a network.
    #[must_use]
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Hostname other containers on the network use to reach this one.
    #[must_use]
    pub fn network_alias(mut self, alias: impl Into<String>) -> Self {
        self.network_alias = Some(alias.into());
        self
    }

    /// Set several environment variables.
    #[must_use]
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// CPU limit.
    #[must_use]
    pub const fn cpus(mut self, cpus: u32) -> Self {
        self.cpus = Some(cpus);
        self
    }

    /// Memory limit.
    #[must_use]
    pub const fn memory(mut self, memory: Size) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Root filesystem quota.
    #[must_use]
    pub const fn storage(mut self, storage: Size) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Publish `container_port` on `host_port`.
    #[must_use]
    pub fn publish(mut self, host_port: u16, container_port: u16) -> Self {
        self.publish.push((host_port, container_port));
        self
    }

    /// Add a DNS server.
    #[must_use]
    pub fn dns(mut self, server: impl Into<String>) -> Self {
        self.dns.push(server.into());
        self
    }

    /// Bind a volume (`host:container`).
    #[must_use]
    pub fn volume(mut self, binding: impl Into<String>) -> Self {
        self.volumes.push(binding.into());
        self
    }

    /// Container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Environment variables.
    #[must_use]
    pub const fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Volume bindings.
    #[must_use]
    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    /// Published port pairs `(host, container)`.
    #[must_use]
    pub fn published_ports(&self) -> &[(u16, u16)] {
        &self.publish
    }

    /// Arguments following the docker binary.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_owned(), "-d".to_owned()];

        for server in &self.dns {
            args.push("--dns".to_owned());
            args.push(server.clone());
        }

        if let Some(network) = &self.network {
            args.push("--network".to_owned());
            args.push(network.clone());
        }

        if let Some(alias) = &self.network_alias {
            args.push("--network-alias".to_owned());
            args.push(alias.clone());
        }

        args.push("--name".to_owned());
        args.push(self.name.clone());

        for (key, value) in &self.env {
            args.push("-e".to_owned());
            args.push(format!("{key}={value}"));
        }

        for binding in &self.volumes {
            args.push("-v".to_owned());
            args.push(binding.clone());
        }

        if let Some(cpus) = self.cpus {
            args.push(format!("--cpus={cpus}"));
        }

        if let Some(memory) = self.memory {
            args.push(format!("--memory={}", memory.docker_arg()));
        }

        if let Some(storage) = self.storage {
            args.push("--storage-opt".to_owned());
            args.push(format!("size={}", storage.docker_arg()));
        }

        for (host, container) in &self.publish {
            args.push("-p".to_owned());
            args.push(format!("{host}:{container}"));
        }

        args.push(self.image.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_run_arguments() {
        let args = RunSpec::new("vm-1", "kumulus-vm-vm-1")
            .dns("8.8.8.8")
            .dns("8.8.4.4")
            .cpus(2)
            .memory(Size::from_megabytes(512))
            .publish(2222, 22)
            .to_args();

        assert_eq!(
            args,
            [
                "run",
                "-d",
                "--dns",
                "8.8.8.8",
                "--dns",
                "8.8.4.4",
                "--name",
                "vm-1",
                "--cpus=2",
                "--memory=512m",
                "-p",
                "2222:22",
                "kumulus-vm-vm-1",
            ]
        );
    }

    #[test]
    fn database_run_arguments() {
        let args = RunSpec::new("d1-db", "postgres:13")
            .network("d1-network")
            .network_alias("db")
            .envs([("POSTGRES_USER", "odoo"), ("POSTGRES_DB", "postgres")])
            .to_args();

        let joined = args.join(" ");
        assert!(joined.contains("--network d1-network --network-alias db"));
        assert!(joined.contains("-e POSTGRES_DB=postgres -e POSTGRES_USER=odoo"));
        assert_eq!(args.last().map(String::as_str), Some("postgres:13"));
        assert!(!joined.contains("-p "));
    }

    #[test]
    fn published_ports_keep_order() {
        let spec = RunSpec::new("d1-main", "wordpress:latest")
            .publish(8180, 80)
            .publish(8443, 443);
        assert_eq!(spec.published_ports(), [(8180, 80), (8443, 443)]);
        assert!(RunSpec::new("d1-db", "mysql:5.7").published_ports().is_empty());
    }

    #[test]
    fn storage_quota_is_optional() {
        let args = RunSpec::new("vm", "img")
            .storage(Size::from_gigabytes(1))
            .to_args();
        assert!(args.windows(2).any(|w| w[0] == "--storage-opt" && w[1] == "size=1g"));
    }
}
