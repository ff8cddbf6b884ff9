//! ephemeral - main entry point.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ephemeral::cli::{Cli, Command, run_check_command, run_down_command, run_up_command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    let _ = dotenvy::dotenv();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ephemeral=info"));

    // Logs go to stderr so stdout stays parseable with --json.
    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    match cli.command {
        Command::Up(args) => run_up_command(args, cli.json).await,
        Command::Down { ids } => run_down_command(ids, cli.json).await,
        Command::Check => run_check_command(cli.json).await,
    }
}
