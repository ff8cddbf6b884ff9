//! CLI command handling.
//!
//! Provides subcommands for:
//! - Starting a service container and printing its port mappings (`up`)
//! - Stopping and removing containers (`down`)
//! - Checking that the container engine is reachable (`check`)

mod down;
mod up;

pub use down::run_down_command;
pub use up::{UpArgs, run_up_command};

use clap::{ColorChoice, Parser, Subcommand};

use crate::config::EngineConfig;
use crate::lifecycle::ContainerLifecycleManager;

#[derive(Parser, Debug)]
#[command(name = "ephemeral")]
#[command(about = "Run throwaway service containers for tests and local development")]
#[command(
    long_about = "Starts containers with dynamically published ports and tears them down again.\nExamples:\n  ephemeral up nginx:alpine -p 80\n  ephemeral down <container-id>"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a service container
    #[command(
        about = "Start a service container",
        long_about = "Creates and starts a container, prints where its ports landed, and removes it on Ctrl-C.\nExamples:\n  ephemeral up nginx:alpine -p 80\n  ephemeral up postgres:16-alpine -p 5432 -e POSTGRES_PASSWORD=test\n  ephemeral up --file service.toml --detach"
    )]
    Up(UpArgs),

    /// Stop and remove containers
    #[command(
        about = "Stop and remove containers",
        long_about = "Stops and removes each container, reporting what happened per step.\nExample: ephemeral down 3f2a9c1b"
    )]
    Down {
        /// Container IDs to tear down
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Check that the container engine is reachable
    Check,
}

/// Connect to the engine using environment configuration.
pub(crate) async fn connect() -> anyhow::Result<ContainerLifecycleManager> {
    let config = EngineConfig::resolve()?;
    Ok(ContainerLifecycleManager::connect(config).await?)
}

/// Run the `check` command.
pub async fn run_check_command(json: bool) -> anyhow::Result<()> {
    let config = EngineConfig::resolve()?;
    let endpoint = config.endpoint.to_string();
    ContainerLifecycleManager::connect(config).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "status": "available", "endpoint": endpoint })
        );
    } else {
        println!("Container engine available ({})", endpoint);
    }
    Ok(())
}
