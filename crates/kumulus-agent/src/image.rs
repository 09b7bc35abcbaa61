//! Typed template for VM container images.
//!
//! A VM is an Ubuntu container running `sshd` with a single sudo-capable
//! login. The username and key are validated against allow-lists before they
//! are interpolated, and the key is embedded base64-encoded so no shell
//! metacharacter from it ever reaches a `RUN` line.
//!
//! The rendered text must stay stable byte for byte, since docker keys its
//! layer cache on it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use kumulus_proto::validate::{validate_ssh_public_key, validate_username};

use crate::error::AgentResult;

/// Default base image for VMs.
pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:22.04";

/// Builder for a VM image definition.
#[derive(Debug, Clone)]
pub struct VmImageBuilder {
    base_image: String,
    username: String,
    ssh_public_key: String,
}

impl VmImageBuilder {
    /// Start a definition for `username` authorised by `ssh_public_key`.
    #[must_use]
    pub fn new(username: impl Into<String>, ssh_public_key: impl Into<String>) -> Self {
        Self {
            base_image: DEFAULT_BASE_IMAGE.to_owned(),
            username: username.into(),
            ssh_public_key: ssh_public_key.into(),
        }
    }

    /// Override the base image.
    #[must_use]
    pub fn base_image(mut self, image: impl Into<String>) -> Self {
        self.base_image = image.into();
        self
    }

    /// Validate the inputs and render the Dockerfile.
    pub fn render(&self) -> AgentResult<String> {
        validate_username(&self.username)?;
        validate_ssh_public_key(&self.ssh_public_key)?;

        let user = &self.username;
        let encoded_key = STANDARD.encode(&self.ssh_public_key);
        let base = &self.base_image;

        Ok(format!(
            r#"
      FROM {base}
      
      # Configure apt for faster downloads
      ENV DEBIAN_FRONTEND=noninteractive
      
      # Configure apt to retry and use multiple mirrors
      RUN echo 'Acquire::Retries "3";' > /etc/apt/apt.conf.d/80-retries && \
          echo 'Acquire::http::Pipeline-Depth "5";' >> /etc/apt/apt.conf.d/80-retries && \
          echo 'Acquire::http::Timeout "30";' >> /etc/apt/apt.conf.d/80-retries && \
          echo 'APT::Install-Recommends "false";' >> /etc/apt/apt.conf.d/80-retries && \
          echo "deb mirror://mirrors.ubuntu.com/mirrors.txt jammy main restricted universe multiverse" > /etc/apt/sources.list && \
          echo "deb mirror://mirrors.ubuntu.com/mirrors.txt jammy-updates main restricted universe multiverse" >> /etc/apt/sources.list && \
          echo "deb mirror://mirrors.ubuntu.com/mirrors.txt jammy-security main restricted universe multiverse" >> /etc/apt/sources.list
      
      # Install necessary packages with retries
      RUN apt-get update -y && \
          apt-get install -y --no-install-recommends openssh-server sudo ca-certificates && \
          apt-get clean && \
          rm -rf /var/lib/apt/lists/*
      
      # Ensure privilege separation directory exists for SSH
      RUN mkdir -p /run/sshd && chmod 0755 /run/sshd
      
      # Create a new user with sudo privileges
      RUN useradd -m -s /bin/bash {user} && \
          usermod -aG sudo {user} && \
          mkdir -p /home/{user}/.ssh
      
      # Set up SSH key for the user
      RUN echo "{encoded_key}" | base64 -d > /home/{user}/.ssh/authorized_keys && \
          chmod 700 /home/{user}/.ssh && \
          chmod 600 /home/{user}/.ssh/authorized_keys && \
          chown -R {user}:{user} /home/{user}/.ssh
      
      # Configure SSH server
      RUN sed -i 's/#PubkeyAuthentication yes/PubkeyAuthentication yes/' /etc/ssh/sshd_config && \
          sed -i 's/#PasswordAuthentication yes/PasswordAuthentication no/' /etc/ssh/sshd_config && \
          sed -i 's/#PermitRootLogin yes/PermitRootLogin no/' /etc/ssh/sshd_config && \
          echo "AllowUsers {user}" >> /etc/ssh/sshd_config
      
      # Expose SSH port
      EXPOSE 22
      
      # Start SSH service
      CMD ["/usr/sbin/sshd", "-D"]
      "#
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIMx9lG3kJ0hZrjmN4cQ2bqk8b0Zf1J9t2GfP6mHcXy3p dev@laptop";

    const ALICE_DOCKERFILE: &str = r#"
      FROM ubuntu:22.04
      
      # Configure apt for faster downloads
      ENV DEBIAN_FRONTEND=noninteractive
      
      # Configure apt to retry and use multiple mirrors
      RUN echo 'Acquire::Retries "3";' > /etc/apt/apt.conf.d/80-retries && \
          echo 'Acquire::http::Pipeline-Depth "5";' >> /etc/apt/apt.conf.d/80-retries && \
          echo 'Acquire::http::Timeout "30";' >> /etc/apt/apt.conf.d/80-retries && \
          echo 'APT::Install-Recommends "false";' >> /etc/apt/apt.conf.d/80-retries && \
          echo "deb mirror://mirrors.ubuntu.com/mirrors.txt jammy main restricted universe multiverse" > /etc/apt/sources.list && \
          echo "deb mirror://mirrors.ubuntu.com/mirrors.txt jammy-updates main restricted universe multiverse" >> /etc/apt/sources.list && \
          echo "deb mirror://mirrors.ubuntu.com/mirrors.txt jammy-security main restricted universe multiverse" >> /etc/apt/sources.list
      
      # Install necessary packages with retries
      RUN apt-get update -y && \
          apt-get install -y --no-install-recommends openssh-server sudo ca-certificates && \
          apt-get clean && \
          rm -rf /var/lib/apt/lists/*
      
      # Ensure privilege separation directory exists for SSH
      RUN mkdir -p /run/sshd && chmod 0755 /run/sshd
      
      # Create a new user with sudo privileges
      RUN useradd -m -s /bin/bash alice && \
          usermod -aG sudo alice && \
          mkdir -p /home/alice/.ssh
      
      # Set up SSH key for the user
      RUN echo "c3NoLWVkMjU1MTkgQUFBQUMzTnphQzFsWkRJMU5URTVBQUFBSU14OWxHM2tKMGhacmptTjRjUTJicWs4YjBaZjFKOXQyR2ZQNm1IY1h5M3AgZGV2QGxhcHRvcA==" | base64 -d > /home/alice/.ssh/authorized_keys && \
          chmod 700 /home/alice/.ssh && \
          chmod 600 /home/alice/.ssh/authorized_keys && \
          chown -R alice:alice /home/alice/.ssh
      
      # Configure SSH server
      RUN sed -i 's/#PubkeyAuthentication yes/PubkeyAuthentication yes/' /etc/ssh/sshd_config && \
          sed -i 's/#PasswordAuthentication yes/PasswordAuthentication no/' /etc/ssh/sshd_config && \
          sed -i 's/#PermitRootLogin yes/PermitRootLogin no/' /etc/ssh/sshd_config && \
          echo "AllowUsers alice" >> /etc/ssh/sshd_config
      
      # Expose SSH port
      EXPOSE 22
      
      # Start SSH service
      CMD ["/usr/sbin/sshd", "-D"]
      "#;

    #[test]
    fn renders_exact_dockerfile() {
        let dockerfile = VmImageBuilder::new("alice", KEY).render().unwrap();
        assert_eq!(dockerfile, ALICE_DOCKERFILE);
    }

    #[test]
    fn renders_hardened_sshd() {
        let dockerfile = VmImageBuilder::new("alice", KEY).render().unwrap();

        assert!(dockerfile.contains("FROM ubuntu:22.04\n"));
        assert!(dockerfile.contains("useradd -m -s /bin/bash alice"));
        assert!(dockerfile.contains("PasswordAuthentication no"));
        assert!(dockerfile.contains("PermitRootLogin no"));
        assert!(dockerfile.contains("AllowUsers alice"));
        assert!(dockerfile.contains(r#"CMD ["/usr/sbin/sshd", "-D"]"#));
    }

    #[test]
    fn key_is_embedded_encoded() {
        let dockerfile = VmImageBuilder::new("alice", KEY).render().unwrap();
        assert!(!dockerfile.contains("dev@laptop"));
        assert!(dockerfile.contains(&STANDARD.encode(KEY)));
    }

    #[test]
    fn rejects_unsafe_inputs() {
        assert!(VmImageBuilder::new("alice && reboot", KEY).render().is_err());
        assert!(VmImageBuilder::new("alice", "not a key").render().is_err());
    }

    #[test]
    fn base_image_override() {
        let dockerfile = VmImageBuilder::new("bob", KEY)
            .base_image("ubuntu:24.04")
            .render()
            .unwrap();
        assert!(dockerfile.contains("FROM ubuntu:24.04\n"));
        assert_eq!(
            dockerfile.replace("ubuntu:24.04", "ubuntu:22.04").replace("bob", "alice"),
            ALICE_DOCKERFILE
        );
    }
}
