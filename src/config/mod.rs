//! Configuration for the lifecycle manager.
//!
//! Settings are resolved from environment variables (after the binary loads
//! `.env` through dotenvy). Library callers can also build [`EngineConfig`]
//! directly.

mod engine;
pub(crate) mod helpers;

pub use engine::{EngineConfig, EngineEndpoint};
