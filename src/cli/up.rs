//! `ephemeral up`: start a service container.

use std::path::PathBuf;

use clap::Args;

use crate::cli::connect;
use crate::lifecycle::{ServiceDefinition, ServiceInstance, StopReport};

#[derive(Args, Debug, Clone)]
pub struct UpArgs {
    /// Image to run (e.g. "nginx:alpine")
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub image: Option<String>,

    /// Container port to publish on a random host port (repeatable)
    #[arg(short, long = "port", value_name = "PORT")]
    pub ports: Vec<u16>,

    /// Environment variable as KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Load the service definition from a TOML file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Leave the container running and exit after printing its details
    #[arg(short, long)]
    pub detach: bool,
}

impl UpArgs {
    fn definition(&self) -> anyhow::Result<ServiceDefinition> {
        if let Some(path) = &self.file {
            return Ok(ServiceDefinition::load(path)?);
        }
        let image = self
            .image
            .clone()
            .ok_or_else(|| anyhow::anyhow!("an image or --file is required"))?;
        Ok(ServiceDefinition::new(
            image,
            self.ports.iter().copied(),
            self.env.iter().cloned(),
        )?)
    }
}

/// Run the `up` command.
pub async fn run_up_command(args: UpArgs, json: bool) -> anyhow::Result<()> {
    let definition = args.definition()?;
    let manager = connect().await?;

    let instance = manager.start(&definition).await?;
    print_instance(&instance, json)?;

    if !instance.is_fully_mapped() {
        tracing::warn!(
            container_id = instance.container_id(),
            "Not every requested port was bound when the container was inspected"
        );
    }

    if args.detach {
        return Ok(());
    }

    if !json {
        println!("Press Ctrl-C to stop and remove the container.");
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Could not listen for Ctrl-C, tearing down now: {}", e);
    }

    let report = manager.stop_instance(&instance).await;
    print_report(&report, json)?;
    if !report.is_clean() {
        anyhow::bail!("teardown of {} did not complete cleanly", report.container_id);
    }
    Ok(())
}

fn print_instance(instance: &ServiceInstance, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(instance)?);
        return Ok(());
    }

    println!("Container: {}", instance.container_id());
    println!("Image:     {}", instance.definition().image());
    if instance.mapped_ports().is_empty() {
        println!("Ports:     (none)");
    }
    for (container_port, host_port) in instance.mapped_ports() {
        println!("Port:      {} -> {}:{}", container_port, instance.host(), host_port);
    }
    Ok(())
}

pub(crate) fn print_report(report: &StopReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!(
            "{}: stop={:?} remove={:?}",
            report.container_id, report.stop, report.remove
        );
    }
    Ok(())
}

/// Parse `KEY=VALUE`. Only the first `=` splits, so values may contain `=`.
fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("missing variable name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(image: Option<&str>) -> UpArgs {
        UpArgs {
            image: image.map(str::to_string),
            ports: vec![80, 80],
            env: vec![("A".to_string(), "1".to_string())],
            file: None,
            detach: false,
        }
    }

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("URL=postgres://u:p@h/db?x=1"),
            Ok(("URL".to_string(), "postgres://u:p@h/db?x=1".to_string()))
        );
        assert_eq!(parse_env_pair("EMPTY="), Ok(("EMPTY".to_string(), String::new())));
        assert!(parse_env_pair("NOEQUALS").is_err());
        assert!(parse_env_pair("=value").is_err());
    }

    #[test]
    fn test_definition_from_flags() {
        let def = args(Some("nginx:alpine")).definition().unwrap();
        assert_eq!(def.image(), "nginx:alpine");
        assert_eq!(def.exposed_ports(), &[80]);
        assert_eq!(def.env_strings(), vec!["A=1".to_string()]);
    }

    #[test]
    fn test_definition_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "image = \"redis:7-alpine\"\nexposed_ports = [6379]").unwrap();

        let mut up = args(None);
        up.file = Some(file.path().to_path_buf());
        let def = up.definition().unwrap();
        assert_eq!(def.image(), "redis:7-alpine");
        assert_eq!(def.exposed_ports(), &[6379]);
    }

    #[test]
    fn test_definition_requires_image_or_file() {
        assert!(args(None).definition().is_err());
    }
}
