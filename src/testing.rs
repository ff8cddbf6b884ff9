//! Test support: an in-memory container engine.
//!
//! [`FakeEngine`] implements [`ContainerEngine`] with Docker-like semantics
//! (404 for unknown containers, stopping a stopped container is a no-op, 409
//! when removing a running one without force) and records every call so
//! tests can assert on the protocol.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ephemeral::config::EngineConfig;
//! use ephemeral::lifecycle::{ContainerLifecycleManager, ServiceDefinition};
//! use ephemeral::testing::FakeEngine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(FakeEngine::new());
//! let manager = ContainerLifecycleManager::with_engine(engine.clone(), EngineConfig::default()).await?;
//! let instance = manager.start(&ServiceDefinition::single_port("nginx:alpine", 80)?).await?;
//! assert!(engine.contains(instance.container_id()));
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

use async_trait::async_trait;
use bollard::container::Config;
use bollard::errors::Error as DockerError;
use bollard::models::{
    ContainerCreateResponse, ContainerInspectResponse, ContainerState, ContainerStateStatusEnum,
    NetworkSettings, PortBinding, PortMap, SystemInfo,
};

use crate::lifecycle::ContainerEngine;

/// First host port handed out, matching Docker's ephemeral range start.
const FIRST_HOST_PORT: u16 = 49153;

/// Engine operations, for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Ping,
    Info,
    Create,
    Start,
    Inspect,
    Stop,
    Remove,
}

/// A recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Ping,
    Info,
    Create { image: String },
    Start(String),
    Inspect(String),
    Stop(String),
    Remove { id: String, force: bool },
}

impl EngineCall {
    pub fn op(&self) -> EngineOp {
        match self {
            EngineCall::Ping => EngineOp::Ping,
            EngineCall::Info => EngineOp::Info,
            EngineCall::Create { .. } => EngineOp::Create,
            EngineCall::Start(_) => EngineOp::Start,
            EngineCall::Inspect(_) => EngineOp::Inspect,
            EngineCall::Stop(_) => EngineOp::Stop,
            EngineCall::Remove { .. } => EngineOp::Remove,
        }
    }
}

#[derive(Debug, Clone)]
struct FakeContainer {
    config: Config<String>,
    running: bool,
    ports: PortMap,
}

/// In-memory [`ContainerEngine`] for tests.
pub struct FakeEngine {
    containers: Mutex<HashMap<String, FakeContainer>>,
    calls: Mutex<Vec<EngineCall>>,
    failures: Mutex<HashMap<EngineOp, (u16, String)>>,
    unbound_ports: Mutex<HashSet<u16>>,
    extra_bindings: Mutex<PortMap>,
    exit_on_start: std::sync::atomic::AtomicBool,
    next_id: AtomicU32,
    next_host_port: AtomicU16,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            unbound_ports: Mutex::new(HashSet::new()),
            extra_bindings: Mutex::new(PortMap::new()),
            exit_on_start: std::sync::atomic::AtomicBool::new(false),
            next_id: AtomicU32::new(1),
            next_host_port: AtomicU16::new(FIRST_HOST_PORT),
        }
    }

    /// Make every future call of `op` fail with the given HTTP status.
    pub fn fail_on(&self, op: EngineOp, status_code: u16, message: impl Into<String>) {
        self.failures
            .lock()
            .expect("fake engine lock poisoned")
            .insert(op, (status_code, message.into()));
    }

    /// Stop injecting failures for `op`.
    pub fn clear_failure(&self, op: EngineOp) {
        self.failures
            .lock()
            .expect("fake engine lock poisoned")
            .remove(&op);
    }

    /// Leave `container_port` unbound when containers start, as if the
    /// engine had not finished wiring the network yet.
    pub fn leave_unbound(&self, container_port: u16) {
        self.unbound_ports
            .lock()
            .expect("fake engine lock poisoned")
            .insert(container_port);
    }

    /// Report an extra binding table entry on every inspect.
    pub fn add_binding(&self, key: impl Into<String>, bindings: Option<Vec<PortBinding>>) {
        self.extra_bindings
            .lock()
            .expect("fake engine lock poisoned")
            .insert(key.into(), bindings);
    }

    /// Containers exit right after starting.
    pub fn exit_on_start(&self, exit: bool) {
        self.exit_on_start.store(exit, Ordering::SeqCst);
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().expect("fake engine lock poisoned").clone()
    }

    /// Operations called so far, in order, ignoring arguments.
    pub fn ops(&self) -> Vec<EngineOp> {
        self.calls().iter().map(EngineCall::op).collect()
    }

    /// Whether the engine still knows the container.
    pub fn contains(&self, id: &str) -> bool {
        self.containers
            .lock()
            .expect("fake engine lock poisoned")
            .contains_key(id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.containers
            .lock()
            .expect("fake engine lock poisoned")
            .get(id)
            .is_some_and(|c| c.running)
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().expect("fake engine lock poisoned").len()
    }

    /// The create request the container was made from.
    pub fn created_config(&self, id: &str) -> Option<Config<String>> {
        self.containers
            .lock()
            .expect("fake engine lock poisoned")
            .get(id)
            .map(|c| c.config.clone())
    }

    fn record(&self, call: EngineCall) -> Result<(), DockerError> {
        let op = call.op();
        self.calls
            .lock()
            .expect("fake engine lock poisoned")
            .push(call);
        match self
            .failures
            .lock()
            .expect("fake engine lock poisoned")
            .get(&op)
        {
            Some((status_code, message)) => Err(server_error(*status_code, message)),
            None => Ok(()),
        }
    }

    fn allocate_ports(&self, config: &Config<String>) -> PortMap {
        let unbound = self
            .unbound_ports
            .lock()
            .expect("fake engine lock poisoned")
            .clone();
        let requested = config
            .host_config
            .as_ref()
            .and_then(|hc| hc.port_bindings.clone())
            .unwrap_or_default();

        let mut keys: Vec<String> = requested.into_keys().collect();
        keys.sort();

        keys.into_iter()
            .map(|key| {
                let container_port = key
                    .split('/')
                    .next()
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or_default();
                if unbound.contains(&container_port) {
                    return (key, None);
                }
                let host_port = self.next_host_port.fetch_add(1, Ordering::SeqCst);
                let bindings = vec![
                    PortBinding {
                        host_ip: Some("0.0.0.0".to_string()),
                        host_port: Some(host_port.to_string()),
                    },
                    PortBinding {
                        host_ip: Some("::".to_string()),
                        host_port: Some(host_port.to_string()),
                    },
                ];
                (key, Some(bindings))
            })
            .collect()
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn server_error(status_code: u16, message: &str) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code,
        message: message.to_string(),
    }
}

fn no_such_container(id: &str) -> DockerError {
    server_error(404, &format!("No such container: {id}"))
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> Result<(), DockerError> {
        self.record(EngineCall::Ping)
    }

    async fn info(&self) -> Result<SystemInfo, DockerError> {
        self.record(EngineCall::Info)?;
        Ok(SystemInfo {
            name: Some("fake-engine".to_string()),
            server_version: Some("0.0.0-test".to_string()),
            ..Default::default()
        })
    }

    async fn create_container(
        &self,
        config: Config<String>,
    ) -> Result<ContainerCreateResponse, DockerError> {
        self.record(EngineCall::Create {
            image: config.image.clone().unwrap_or_default(),
        })?;
        let id = format!("fake{:08x}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().expect("fake engine lock poisoned").insert(
            id.clone(),
            FakeContainer {
                config,
                running: false,
                ports: PortMap::new(),
            },
        );
        Ok(ContainerCreateResponse {
            id,
            warnings: Vec::new(),
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.record(EngineCall::Start(id.to_string()))?;
        let config = self
            .created_config(id)
            .ok_or_else(|| no_such_container(id))?;
        let ports = self.allocate_ports(&config);
        let mut containers = self.containers.lock().expect("fake engine lock poisoned");
        if let Some(container) = containers.get_mut(id) {
            container.running = !self.exit_on_start.load(Ordering::SeqCst);
            container.ports = ports;
        }
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError> {
        self.record(EngineCall::Inspect(id.to_string()))?;
        let container = self
            .containers
            .lock()
            .expect("fake engine lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| no_such_container(id))?;

        let mut ports = container.ports;
        ports.extend(
            self.extra_bindings
                .lock()
                .expect("fake engine lock poisoned")
                .clone(),
        );

        Ok(ContainerInspectResponse {
            id: Some(id.to_string()),
            state: Some(ContainerState {
                running: Some(container.running),
                status: Some(if container.running {
                    ContainerStateStatusEnum::RUNNING
                } else {
                    ContainerStateStatusEnum::EXITED
                }),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn stop_container(&self, id: &str, _timeout_secs: i64) -> Result<(), DockerError> {
        self.record(EngineCall::Stop(id.to_string()))?;
        let mut containers = self.containers.lock().expect("fake engine lock poisoned");
        let container = containers.get_mut(id).ok_or_else(|| no_such_container(id))?;
        // Docker answers 304 here, which bollard surfaces as success.
        container.running = false;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError> {
        self.record(EngineCall::Remove {
            id: id.to_string(),
            force,
        })?;
        let mut containers = self.containers.lock().expect("fake engine lock poisoned");
        let container = containers.get(id).ok_or_else(|| no_such_container(id))?;
        if container.running && !force {
            return Err(server_error(
                409,
                "You cannot remove a running container. Stop the container before attempting removal or force remove",
            ));
        }
        containers.remove(id);
        Ok(())
    }
}
