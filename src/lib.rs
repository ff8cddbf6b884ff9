//! Ephemeral containers for tests and development environments.
//!
//! Start a container from an image with published ports and environment,
//! discover the host ports the engine picked, and tear it down again.
//! See [`lifecycle`] for the core API.

pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod testing;

pub use config::EngineConfig;
pub use lifecycle::{
    ContainerLifecycleManager, LifecycleError, ServiceDefinition, ServiceInstance, StopReport,
};
