//! Common test utilities for agent integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kumulus_agent::config::{DockerConfig, PortConfig};
use kumulus_agent::ports::PortProbe;
use kumulus_agent::runtime::{ContainerSummary, PruneReport};
use kumulus_agent::{AgentError, AgentResult, ContainerRuntime, Provisioner, RunSpec};
use tempfile::TempDir;

pub const ED25519_KEY: &str =
    "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIMx9lG3kJ0hZrjmN4cQ2bqk8b0Zf1J9t2GfP6mHcXy3p dev@laptop";

/// Host operation kinds that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Build,
    Run,
    Start,
    Stop,
    Remove,
    CreateNetwork,
    RemoveNetwork,
}

/// A mutating call observed by the fake runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Build(String),
    Run(String),
    Start(String),
    Stop(String),
    Remove(String),
    CreateNetwork(String),
    RemoveNetwork(String),
    Prune,
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub image: String,
    pub running: bool,
    pub args: Vec<String>,
}

#[derive(Debug, Default)]
struct HostState {
    calls: Vec<Call>,
    containers: BTreeMap<String, FakeContainer>,
    networks: BTreeSet<String>,
    images: BTreeSet<String>,
    failures: Vec<(Op, String)>,
    leave_container_on_failed_run: bool,
    build_contexts: Vec<bool>,
}

/// In-memory stand-in for the docker daemon.
#[derive(Debug, Default, Clone)]
pub struct FakeRuntime {
    state: Arc<Mutex<HostState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail for any target whose name contains `needle`.
    pub fn fail(&self, op: Op, needle: &str) -> &Self {
        self.state.lock().unwrap().failures.push((op, needle.to_owned()));
        self
    }

    /// Simulate `docker run` creating the container before failing.
    pub fn leave_container_on_failed_run(&self) -> &Self {
        self.state.lock().unwrap().leave_container_on_failed_run = true;
        self
    }

    pub fn add_container(&self, name: &str, running: bool) {
        self.state.lock().unwrap().containers.insert(
            name.to_owned(),
            FakeContainer {
                image: "test:latest".to_owned(),
                running,
                args: Vec::new(),
            },
        );
    }

    pub fn add_network(&self, name: &str) {
        self.state.lock().unwrap().networks.insert(name.to_owned());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state.lock().unwrap().containers.get(name).cloned()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state.lock().unwrap().containers.keys().cloned().collect()
    }

    pub fn networks(&self) -> Vec<String> {
        self.state.lock().unwrap().networks.iter().cloned().collect()
    }

    /// Whether each build saw a Dockerfile in its context directory.
    pub fn build_contexts(&self) -> Vec<bool> {
        self.state.lock().unwrap().build_contexts.clone()
    }

    /// Whether anything named after `prefix` is left on the host.
    pub fn has_leftovers(&self, prefix: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.containers.keys().any(|n| n.starts_with(prefix))
            || state.networks.iter().any(|n| n.starts_with(prefix))
    }

    fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    /// Index of `first` in the call log is strictly before `second`.
    pub fn called_before(&self, first: &Call, second: &Call) -> bool {
        match (self.position(first), self.position(second)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    fn check(state: &HostState, op: Op, target: &str) -> AgentResult<()> {
        if state
            .failures
            .iter()
            .any(|(o, needle)| *o == op && target.contains(needle.as_str()))
        {
            return Err(AgentError::command_failed(
                format!("failed to {op:?} {target}"),
                "partial output".to_owned(),
                "simulated failure".to_owned(),
            ));
        }
        Ok(())
    }

    fn no_such(target: &str) -> AgentError {
        AgentError::command_failed(
            format!("no such container {target}"),
            String::new(),
            format!("Error: No such container: {target}"),
        )
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn build_image(&self, tag: &str, context_dir: &Path) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Build(tag.to_owned()));
        state
            .build_contexts
            .push(context_dir.join("Dockerfile").is_file());
        Self::check(&state, Op::Build, tag)?;
        state.images.insert(tag.to_owned());
        Ok(())
    }

    async fn run(&self, spec: &RunSpec) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        let name = spec.name().to_owned();
        state.calls.push(Call::Run(name.clone()));
        let container = FakeContainer {
            image: spec.image().to_owned(),
            running: true,
            args: spec.to_args(),
        };
        if let Err(e) = Self::check(&state, Op::Run, &name) {
            if state.leave_container_on_failed_run {
                state.containers.insert(
                    name,
                    FakeContainer {
                        running: false,
                        ..container
                    },
                );
            }
            return Err(e);
        }
        state.containers.insert(name, container);
        Ok(())
    }

    async fn container_exists(&self, name: &str) -> AgentResult<bool> {
        Ok(self.state.lock().unwrap().containers.contains_key(name))
    }

    async fn start(&self, name: &str) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Start(name.to_owned()));
        Self::check(&state, Op::Start, name)?;
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| Self::no_such(name))?;
        container.running = true;
        Ok(())
    }

    async fn stop(&self, name: &str) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Stop(name.to_owned()));
        Self::check(&state, Op::Stop, name)?;
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| Self::no_such(name))?;
        container.running = false;
        Ok(())
    }

    async fn remove(&self, name: &str) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Remove(name.to_owned()));
        Self::check(&state, Op::Remove, name)?;
        state
            .containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Self::no_such(name))
    }

    async fn containers_with_prefix(&self, prefix: &str) -> AgentResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .keys()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn list_containers(&self) -> AgentResult<Vec<ContainerSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .map(|(name, c)| ContainerSummary {
                id: String::new(),
                names: name.clone(),
                image: c.image.clone(),
                state: if c.running { "running" } else { "exited" }.to_owned(),
                status: String::new(),
                ports: String::new(),
            })
            .collect())
    }

    async fn create_network(&self, name: &str) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateNetwork(name.to_owned()));
        Self::check(&state, Op::CreateNetwork, name)?;
        state.networks.insert(name.to_owned());
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> AgentResult<bool> {
        Ok(self.state.lock().unwrap().networks.contains(name))
    }

    async fn remove_network(&self, name: &str) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::RemoveNetwork(name.to_owned()));
        Self::check(&state, Op::RemoveNetwork, name)?;
        state.networks.remove(name);
        Ok(())
    }

    async fn prune(&self) -> AgentResult<PruneReport> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Prune);
        state.containers.retain(|_, c| c.running);
        Ok(PruneReport {
            containers: "Total reclaimed space: 0B".to_owned(),
            images: String::new(),
            networks: String::new(),
        })
    }
}

/// Port probe with a fixed set of taken ports.
#[derive(Debug, Default)]
pub struct FixedPorts {
    taken: Vec<u16>,
}

impl FixedPorts {
    pub fn with_taken(taken: impl Into<Vec<u16>>) -> Self {
        Self {
            taken: taken.into(),
        }
    }
}

impl PortProbe for FixedPorts {
    fn is_free(&self, port: u16) -> bool {
        !self.taken.contains(&port)
    }
}

/// Provisioner wired to a fake runtime and a private build directory.
pub struct TestAgent {
    pub runtime: FakeRuntime,
    pub provisioner: Arc<Provisioner>,
    pub build_root: TempDir,
}

impl TestAgent {
    pub fn new() -> Self {
        Self::with_ports(FixedPorts::default())
    }

    pub fn with_ports(ports: FixedPorts) -> Self {
        Self::with_runtime(FakeRuntime::new(), ports)
    }

    pub fn with_runtime(runtime: FakeRuntime, ports: FixedPorts) -> Self {
        let build_root = TempDir::new().expect("failed to create build root");
        let docker = DockerConfig {
            build_root: build_root.path().to_path_buf(),
            ..DockerConfig::default()
        };
        let provisioner = Arc::new(Provisioner::new(
            Arc::new(runtime.clone()),
            Arc::new(ports),
            docker,
            PortConfig::default(),
        ));

        Self {
            runtime,
            provisioner,
            build_root,
        }
    }

    /// Whether any per-VM build context is still on disk.
    pub fn build_root_is_empty(&self) -> bool {
        std::fs::read_dir(self.build_root.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
    }
}
