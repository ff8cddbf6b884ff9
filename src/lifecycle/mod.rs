//! Lifecycle management for ephemeral service containers.
//!
//! Takes a declarative [`ServiceDefinition`], brings it up as a running
//! container with dynamically published ports, reports where those ports
//! landed on the host, and tears the container down again.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                      ContainerLifecycleManager                             │
//! │                                                                            │
//! │   start(definition)                                                        │
//! │         │                                                                  │
//! │         ▼                                                                  │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Create       │────▶│ Start        │────▶│ Inspect & Resolve Ports  │  │
//! │   │ Container    │     │ Container    │     │ (first TCP binding wins) │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! │                              │ failure             │                       │
//! │                              ▼                     ▼                       │
//! │                       ┌──────────────┐     ┌──────────────────────────┐   │
//! │                       │ Force Remove │     │ ServiceInstance          │   │
//! │                       └──────────────┘     └──────────────────────────┘   │
//! │                                                                            │
//! │   stop(container_id)  ──▶  Stop  ──▶  Remove  ──▶  StopReport             │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use ephemeral::config::EngineConfig;
//! use ephemeral::lifecycle::{ContainerLifecycleManager, ServiceDefinition};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ContainerLifecycleManager::connect(EngineConfig::resolve()?).await?;
//!
//! let definition = ServiceDefinition::builder("postgres:16-alpine")
//!     .port(5432)
//!     .env("POSTGRES_PASSWORD", "test")
//!     .build()?;
//!
//! let instance = manager.start(&definition).await?;
//! let port = instance.get_mapped_port(5432)?;
//! println!("postgres at 127.0.0.1:{}", port);
//!
//! let report = manager.stop_instance(&instance).await;
//! assert!(report.is_removed());
//! # Ok(())
//! # }
//! ```

pub mod definition;
pub mod engine;
pub mod error;
pub mod instance;
pub mod manager;
pub mod ports;

pub use definition::{ServiceDefinition, ServiceDefinitionBuilder};
pub use engine::{ContainerEngine, DockerEngine, is_not_found};
pub use error::{DefinitionError, EnginePhase, LifecycleError, PortResolveError, Result};
pub use instance::{ServiceEndpoint, ServiceInstance};
pub use manager::{ContainerLifecycleManager, StepOutcome, StopReport};
pub use ports::resolve_port_bindings;
