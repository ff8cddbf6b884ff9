//! `ephemeral down`: stop and remove containers.

use crate::cli::connect;
use crate::cli::up::print_report;

/// Run the `down` command. Every container is attempted; the command fails
/// afterwards if any teardown step failed.
pub async fn run_down_command(ids: Vec<String>, json: bool) -> anyhow::Result<()> {
    let manager = connect().await?;

    let mut failed = Vec::new();
    for id in &ids {
        let report = manager.stop(id).await;
        print_report(&report, json)?;
        if !report.is_clean() {
            failed.push(report.container_id);
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("teardown failed for: {}", failed.join(", "));
    }
    Ok(())
}
