//! Error types for container lifecycle management.

use thiserror::Error;

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Which engine call failed during `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Create,
    Start,
    Inspect,
}

impl EnginePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnginePhase::Create => "create",
            EnginePhase::Start => "start",
            EnginePhase::Inspect => "inspect",
        }
    }
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while driving a container through its lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The engine could not be reached or did not answer a ping.
    #[error("Container engine not available: {reason}")]
    EngineUnavailable {
        /// Reason why the engine is unavailable.
        reason: String,
    },

    /// A create/start/inspect call failed.
    #[error("Container {phase} failed{}: {source}", container_suffix(.container_id))]
    EngineOperation {
        /// Phase that failed.
        phase: EnginePhase,
        /// Container ID, once the engine has assigned one.
        container_id: Option<String>,
        /// Underlying engine error.
        #[source]
        source: bollard::errors::Error,
    },

    /// The container exited before `start` could hand it back.
    #[error("Container {container_id} is not running (status: {status})")]
    NotRunning {
        container_id: String,
        status: String,
    },

    /// The caller asked for a container port that has no host binding.
    #[error("Port {port} is not mapped for container {container_id}")]
    PortNotMapped { port: u16, container_id: String },

    /// The engine reported a port value that is not a valid port number.
    #[error(transparent)]
    PortParse(#[from] PortResolveError),

    /// The service definition failed validation.
    #[error("Invalid service definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),
}

fn container_suffix(container_id: &Option<String>) -> String {
    container_id
        .as_deref()
        .map(|id| format!(" for container {id}"))
        .unwrap_or_default()
}

impl LifecycleError {
    /// Whether the caller can reasonably re-check later instead of giving up.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LifecycleError::PortNotMapped { .. })
    }
}

/// The engine's port binding table broke its contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Engine returned malformed port '{value}': {reason}")]
pub struct PortResolveError {
    /// The offending raw value.
    pub value: String,
    /// What was wrong with it.
    pub reason: String,
}

/// Service definition validation errors.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("image reference must not be empty")]
    EmptyImage,

    #[error("invalid container port {0}")]
    InvalidPort(u16),

    #[error("invalid environment variable name '{0}'")]
    InvalidEnvKey(String),

    #[error("failed to parse service definition: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
