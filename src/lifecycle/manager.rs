//! Container lifecycle management.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bollard::container::Config;
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerInspectResponse, HostConfig, PortBinding, PortMap};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::lifecycle::definition::ServiceDefinition;
use crate::lifecycle::engine::{ContainerEngine, DockerEngine, status_code};
use crate::lifecycle::error::{EnginePhase, LifecycleError, Result};
use crate::lifecycle::instance::ServiceInstance;
use crate::lifecycle::ports::{resolve_port_bindings, tcp_key};

/// Drives containers from a [`ServiceDefinition`] to a running
/// [`ServiceInstance`] and back down.
///
/// Holds one engine handle shared by all calls. There is no client-side
/// locking: concurrent `start`/`stop` calls act on distinct, engine-assigned
/// containers and rely on the engine for isolation.
pub struct ContainerLifecycleManager {
    engine: Arc<dyn ContainerEngine>,
    config: EngineConfig,
}

impl ContainerLifecycleManager {
    /// Connect to the Docker engine described by `config` and verify it answers.
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        let engine = DockerEngine::connect(&config).await?;
        Self::with_engine(Arc::new(engine), config).await
    }

    /// Use an already constructed engine. Connectivity is still checked
    /// eagerly so environment problems surface here, not on first `start`.
    pub async fn with_engine(engine: Arc<dyn ContainerEngine>, config: EngineConfig) -> Result<Self> {
        engine
            .ping()
            .await
            .map_err(|e| LifecycleError::EngineUnavailable {
                reason: e.to_string(),
            })?;

        match engine.info().await {
            Ok(info) => tracing::info!(
                daemon = info.name.as_deref().unwrap_or("unknown"),
                version = info.server_version.as_deref().unwrap_or("unknown"),
                endpoint = %config.endpoint,
                "Container engine connected"
            ),
            Err(e) => tracing::warn!("Container engine answered ping but not info: {}", e),
        }

        Ok(Self { engine, config })
    }

    /// The shared engine handle.
    pub fn engine(&self) -> Arc<dyn ContainerEngine> {
        Arc::clone(&self.engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create, start and inspect a container for `definition`.
    ///
    /// On success the container was running when inspected. Ports the engine
    /// had not bound yet are missing from the instance's map; treat a partial
    /// map as "not ready" rather than as a failure.
    ///
    /// If anything fails after the container was created, it is force-removed
    /// before the error is returned (unless `cleanup_on_failure` is off).
    pub async fn start(&self, definition: &ServiceDefinition) -> Result<ServiceInstance> {
        tracing::info!(image = definition.image(), "Starting container");

        let response = self
            .engine
            .create_container(self.container_config(definition))
            .await
            .map_err(|e| LifecycleError::EngineOperation {
                phase: EnginePhase::Create,
                container_id: None,
                source: e,
            })?;
        let container_id = response.id;
        for warning in &response.warnings {
            tracing::warn!(container_id = %container_id, "Engine warning: {}", warning);
        }
        tracing::info!(container_id = %container_id, "Container created");

        match self.run_created(&container_id, definition).await {
            Ok(instance) => Ok(instance),
            Err(e) => {
                self.discard(&container_id, &e).await;
                Err(e)
            }
        }
    }

    /// Start and inspect an already created container.
    async fn run_created(
        &self,
        container_id: &str,
        definition: &ServiceDefinition,
    ) -> Result<ServiceInstance> {
        self.engine
            .start_container(container_id)
            .await
            .map_err(|e| operation_error(EnginePhase::Start, container_id, e))?;
        tracing::info!(container_id = %container_id, "Container started");

        let inspected = self
            .engine
            .inspect_container(container_id)
            .await
            .map_err(|e| operation_error(EnginePhase::Inspect, container_id, e))?;

        ensure_running(container_id, &inspected)?;

        let mapped_ports = self.mapped_ports(container_id, definition, inspected)?;
        tracing::info!(container_id = %container_id, ports = ?mapped_ports, "Container ports mapped");

        Ok(ServiceInstance::new(
            container_id.to_string(),
            definition.clone(),
            mapped_ports,
            self.config.host_address.clone(),
        ))
    }

    /// Resolved bindings restricted to the ports the definition asked for.
    fn mapped_ports(
        &self,
        container_id: &str,
        definition: &ServiceDefinition,
        inspected: ContainerInspectResponse,
    ) -> Result<BTreeMap<u16, u16>> {
        let table = inspected
            .network_settings
            .and_then(|ns| ns.ports)
            .unwrap_or_default();

        let mut mapped = resolve_port_bindings(&table)?;
        mapped.retain(|port, _| {
            let requested = definition.exposed_ports().contains(port);
            if !requested {
                tracing::debug!(
                    container_id = %container_id,
                    port = *port,
                    "Ignoring unrequested port binding"
                );
            }
            requested
        });

        let missing: Vec<u16> = definition
            .exposed_ports()
            .iter()
            .copied()
            .filter(|p| !mapped.contains_key(p))
            .collect();
        if !missing.is_empty() {
            tracing::debug!(container_id = %container_id, ?missing, "Ports not bound yet");
        }

        Ok(mapped)
    }

    /// Translate a definition into an engine create request.
    ///
    /// Every exposed port is published over TCP with no fixed host port, so
    /// the engine picks one.
    fn container_config(&self, definition: &ServiceDefinition) -> Config<String> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = definition
            .exposed_ports()
            .iter()
            .map(|p| (tcp_key(*p), HashMap::new()))
            .collect();

        let port_bindings: PortMap = definition
            .exposed_ports()
            .iter()
            .map(|p| {
                (
                    tcp_key(*p),
                    Some(vec![PortBinding {
                        host_ip: self.config.bind_ip.clone(),
                        host_port: None,
                    }]),
                )
            })
            .collect();

        let env = definition.env_strings();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            // Removal is explicit in `stop`.
            auto_remove: Some(false),
            ..Default::default()
        };

        Config {
            image: Some(definition.image().to_string()),
            env: if env.is_empty() { None } else { Some(env) },
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    /// Compensate for a failed `start` by removing the created container.
    async fn discard(&self, container_id: &str, cause: &LifecycleError) {
        if !self.config.cleanup_on_failure {
            tracing::warn!(
                container_id = %container_id,
                "Start failed ({}); leaving container in place (cleanup_on_failure=false)",
                cause
            );
            return;
        }

        tracing::info!(container_id = %container_id, "Start failed, removing container: {}", cause);
        if let Err(e) = self.engine.remove_container(container_id, true).await {
            tracing::warn!(
                container_id = %container_id,
                "Could not remove container after failed start: {}",
                e
            );
        }
    }

    /// Stop and remove a container.
    ///
    /// Never fails: each sub-step's outcome is reported in the returned
    /// [`StopReport`] and failures are logged as warnings, so this is safe to
    /// call from teardown paths. Calling it for a container that no longer
    /// exists reports [`StepOutcome::NotFound`].
    pub async fn stop(&self, container_id: &str) -> StopReport {
        tracing::info!(container_id = %container_id, "Stopping container");

        let stop = match self
            .engine
            .stop_container(container_id, self.config.stop_timeout_secs())
            .await
        {
            Ok(()) => StepOutcome::Done,
            Err(e) => classify(&e),
        };
        if let StepOutcome::Failed(reason) = &stop {
            tracing::warn!(container_id = %container_id, "Could not stop container: {}", reason);
        }

        // A container that refused to stop is killed by the forced removal.
        let force = matches!(stop, StepOutcome::Failed(_));
        let remove = match self.engine.remove_container(container_id, force).await {
            Ok(()) => StepOutcome::Done,
            Err(e) => classify(&e),
        };
        match &remove {
            StepOutcome::Done => tracing::info!(container_id = %container_id, "Container removed"),
            StepOutcome::Failed(reason) => tracing::warn!(
                container_id = %container_id,
                "Could not remove container: {}",
                reason
            ),
            _ => tracing::debug!(container_id = %container_id, "Container already gone"),
        }

        StopReport {
            container_id: container_id.to_string(),
            stop,
            remove,
        }
    }

    /// Stop and remove the container behind `instance`.
    pub async fn stop_instance(&self, instance: &ServiceInstance) -> StopReport {
        self.stop(instance.container_id()).await
    }
}

fn operation_error(phase: EnginePhase, container_id: &str, source: DockerError) -> LifecycleError {
    LifecycleError::EngineOperation {
        phase,
        container_id: Some(container_id.to_string()),
        source,
    }
}

fn ensure_running(container_id: &str, inspected: &ContainerInspectResponse) -> Result<()> {
    let Some(state) = inspected.state.as_ref() else {
        return Ok(());
    };
    if state.running == Some(false) {
        return Err(LifecycleError::NotRunning {
            container_id: container_id.to_string(),
            status: state
                .status
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        });
    }
    Ok(())
}

/// The engine answers "not modified" for stopping a stopped container and
/// bollard reports that as success, so only 404 needs special handling.
fn classify(err: &DockerError) -> StepOutcome {
    match status_code(err) {
        Some(404) => StepOutcome::NotFound,
        _ => StepOutcome::Failed(err.to_string()),
    }
}

/// Outcome of one teardown sub-step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The engine carried out the request.
    Done,
    /// The engine does not know the container.
    NotFound,
    /// The engine rejected the request.
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// What happened during [`ContainerLifecycleManager::stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub container_id: String,
    pub stop: StepOutcome,
    pub remove: StepOutcome,
}

impl StopReport {
    /// The container no longer exists on the engine.
    pub fn is_removed(&self) -> bool {
        matches!(self.remove, StepOutcome::Done | StepOutcome::NotFound)
    }

    /// Neither sub-step failed.
    pub fn is_clean(&self) -> bool {
        !self.stop.is_failed() && !self.remove.is_failed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;

    async fn manager(engine: Arc<FakeEngine>) -> ContainerLifecycleManager {
        ContainerLifecycleManager::with_engine(engine, EngineConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_container_config_publishes_ports_dynamically() {
        let manager = manager(Arc::new(FakeEngine::new())).await;
        let definition = ServiceDefinition::builder("postgres:16")
            .ports([5432, 8080])
            .env("POSTGRES_PASSWORD", "pw")
            .build()
            .unwrap();

        let config = manager.container_config(&definition);
        assert_eq!(config.image.as_deref(), Some("postgres:16"));
        assert_eq!(config.env, Some(vec!["POSTGRES_PASSWORD=pw".to_string()]));

        let exposed = config.exposed_ports.unwrap();
        assert!(exposed.contains_key("5432/tcp"));
        assert!(exposed.contains_key("8080/tcp"));

        let bindings = config.host_config.unwrap().port_bindings.unwrap();
        let binding = &bindings["5432/tcp"].as_ref().unwrap()[0];
        assert_eq!(binding.host_port, None);
        assert_eq!(binding.host_ip, None);
    }

    #[tokio::test]
    async fn test_container_config_omits_empty_env() {
        let manager = manager(Arc::new(FakeEngine::new())).await;
        let definition = ServiceDefinition::image_only("busybox").unwrap();
        let config = manager.container_config(&definition);
        assert!(config.env.is_none());
        assert!(config.exposed_ports.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bind_ip_is_applied() {
        let config = EngineConfig {
            bind_ip: Some("127.0.0.1".to_string()),
            ..Default::default()
        };
        let manager = ContainerLifecycleManager::with_engine(Arc::new(FakeEngine::new()), config)
            .await
            .unwrap();
        let definition = ServiceDefinition::single_port("nginx:alpine", 80).unwrap();
        let bindings = manager
            .container_config(&definition)
            .host_config
            .unwrap()
            .port_bindings
            .unwrap();
        assert_eq!(
            bindings["80/tcp"].as_ref().unwrap()[0].host_ip.as_deref(),
            Some("127.0.0.1")
        );
    }

    #[test]
    fn test_stop_report_flags() {
        let report = StopReport {
            container_id: "c".to_string(),
            stop: StepOutcome::NotFound,
            remove: StepOutcome::NotFound,
        };
        assert!(report.is_removed());
        assert!(report.is_clean());

        let report = StopReport {
            container_id: "c".to_string(),
            stop: StepOutcome::Failed("timeout".to_string()),
            remove: StepOutcome::Done,
        };
        assert!(report.is_removed());
        assert!(!report.is_clean());

        let report = StopReport {
            container_id: "c".to_string(),
            stop: StepOutcome::Done,
            remove: StepOutcome::Failed("conflict".to_string()),
        };
        assert!(!report.is_removed());
    }

    #[test]
    fn test_classify_status_codes() {
        let err = |status_code| DockerError::DockerResponseServerError {
            status_code,
            message: "m".to_string(),
        };
        assert_eq!(classify(&err(404)), StepOutcome::NotFound);
        assert!(classify(&err(409)).is_failed());
        assert!(classify(&err(500)).is_failed());
    }
}
