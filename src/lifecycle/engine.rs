//! The container-engine capability the lifecycle manager drives.
//!
//! [`ContainerEngine`] is the seam between the lifecycle protocol and the
//! Docker daemon. [`DockerEngine`] is the real implementation over bollard;
//! tests inject [`crate::testing::FakeEngine`].

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, InspectContainerOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerCreateResponse, ContainerInspectResponse, SystemInfo};

use crate::config::{EngineConfig, EngineEndpoint};
use crate::lifecycle::error::{LifecycleError, Result};

/// Operations the lifecycle manager needs from a container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check that the daemon answers.
    async fn ping(&self) -> std::result::Result<(), DockerError>;

    /// Daemon-wide information (name, version, ...).
    async fn info(&self) -> std::result::Result<SystemInfo, DockerError>;

    /// Create a container; the engine assigns the ID.
    async fn create_container(
        &self,
        config: Config<String>,
    ) -> std::result::Result<ContainerCreateResponse, DockerError>;

    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError>;

    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, DockerError>;

    /// Stop a container, giving it `timeout_secs` before it is killed.
    async fn stop_container(&self, id: &str, timeout_secs: i64)
    -> std::result::Result<(), DockerError>;

    async fn remove_container(&self, id: &str, force: bool) -> std::result::Result<(), DockerError>;
}

/// [`ContainerEngine`] backed by a bollard Docker client.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Wrap an existing bollard client.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the engine described by `config`.
    ///
    /// With [`EngineEndpoint::LocalDefaults`], bollard's default connection is
    /// tried first (it honours `DOCKER_HOST`). If that does not answer a ping,
    /// each existing socket in `config.fallback_sockets` is tried in order.
    /// Liveness is not guaranteed on return; the manager pings again before
    /// use.
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let timeout_secs = config.request_timeout.as_secs();

        let docker = match &config.endpoint {
            EngineEndpoint::LocalDefaults => connect_local(config).await?,
            EngineEndpoint::Unix(path) => connect_unix(path, timeout_secs)?,
            EngineEndpoint::Http(url) => {
                Docker::connect_with_http(url, timeout_secs, bollard::API_DEFAULT_VERSION)
                    .map_err(unavailable)?
            }
        };

        Ok(Self::new(docker))
    }
}

fn unavailable(e: DockerError) -> LifecycleError {
    LifecycleError::EngineUnavailable {
        reason: e.to_string(),
    }
}

async fn connect_local(config: &EngineConfig) -> Result<Docker> {
    let docker = Docker::connect_with_local_defaults()
        .map_err(unavailable)?
        .with_timeout(config.request_timeout);

    if docker.ping().await.is_ok() {
        return Ok(docker);
    }

    for socket in &config.fallback_sockets {
        if !socket.exists() {
            continue;
        }
        let Ok(candidate) = connect_unix(socket, config.request_timeout.as_secs()) else {
            continue;
        };
        if candidate.ping().await.is_ok() {
            tracing::debug!(socket = %socket.display(), "Using fallback Docker socket");
            return Ok(candidate);
        }
    }

    // Let the caller's ping report the original failure.
    Ok(docker)
}

#[cfg(unix)]
fn connect_unix(path: &std::path::Path, timeout_secs: u64) -> Result<Docker> {
    Docker::connect_with_unix(
        &path.to_string_lossy(),
        timeout_secs,
        bollard::API_DEFAULT_VERSION,
    )
    .map_err(unavailable)
}

#[cfg(not(unix))]
fn connect_unix(path: &std::path::Path, _timeout_secs: u64) -> Result<Docker> {
    Err(LifecycleError::EngineUnavailable {
        reason: format!(
            "unix socket {} is not supported on this platform",
            path.display()
        ),
    })
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> std::result::Result<(), DockerError> {
        self.docker.ping().await.map(|_| ())
    }

    async fn info(&self) -> std::result::Result<SystemInfo, DockerError> {
        self.docker.info().await
    }

    async fn create_container(
        &self,
        config: Config<String>,
    ) -> std::result::Result<ContainerCreateResponse, DockerError> {
        self.docker
            .create_container(None::<bollard::container::CreateContainerOptions<String>>, config)
            .await
    }

    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, DockerError> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
    }

    async fn stop_container(
        &self,
        id: &str,
        timeout_secs: i64,
    ) -> std::result::Result<(), DockerError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: timeout_secs }))
            .await
    }

    async fn remove_container(&self, id: &str, force: bool) -> std::result::Result<(), DockerError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
    }
}

/// HTTP status carried by an engine error, if the daemon answered at all.
pub(crate) fn status_code(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// Whether the engine reported that the container does not exist.
pub fn is_not_found(err: &DockerError) -> bool {
    status_code(err) == Some(404)
}
