use std::path::PathBuf;
use std::time::Duration;

use crate::config::helpers::{optional_env, parse_bool_env, parse_optional_env};
use crate::error::ConfigError;

/// Where the Docker engine lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EngineEndpoint {
    /// Let bollard pick the platform default (local socket or named pipe).
    #[default]
    LocalDefaults,
    /// Unix domain socket at the given path.
    Unix(PathBuf),
    /// Plain HTTP endpoint, e.g. `http://10.0.0.5:2375`.
    Http(String),
}

impl std::fmt::Display for EngineEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalDefaults => write!(f, "local defaults"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Http(url) => write!(f, "{url}"),
        }
    }
}

impl std::str::FromStr for EngineEndpoint {
    type Err = String;

    /// Parse a `DOCKER_HOST`-style address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err("unix endpoint is missing a socket path".to_string());
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp://").or_else(|| s.strip_prefix("http://")) {
            if addr.is_empty() {
                return Err("tcp endpoint is missing host:port".to_string());
            }
            return Ok(Self::Http(format!("http://{addr}")));
        }
        if s.starts_with("npipe://") {
            // bollard reads DOCKER_HOST itself for named pipes.
            return Ok(Self::LocalDefaults);
        }
        Err(format!(
            "unsupported engine address '{s}', expected unix://, tcp:// or http://"
        ))
    }
}

/// Explicit configuration for talking to the container engine.
///
/// The lifecycle core never reads the environment on its own; callers build
/// this (usually via [`EngineConfig::resolve`]) and hand it over.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine address.
    pub endpoint: EngineEndpoint,
    /// Per-request timeout for engine calls.
    pub request_timeout: Duration,
    /// Grace period given to a container before the engine kills it on stop.
    pub stop_timeout: Duration,
    /// Address the published host ports are reachable on.
    pub host_address: String,
    /// Host interface to bind published ports to (engine default when `None`).
    pub bind_ip: Option<String>,
    /// Force-remove a created container when `start` fails part way.
    pub cleanup_on_failure: bool,
    /// Sockets tried, in order, when the local default does not answer.
    /// Only consulted for [`EngineEndpoint::LocalDefaults`].
    pub fallback_sockets: Vec<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: EngineEndpoint::LocalDefaults,
            request_timeout: Duration::from_secs(120),
            stop_timeout: Duration::from_secs(10),
            host_address: "127.0.0.1".to_string(),
            bind_ip: None,
            cleanup_on_failure: true,
            fallback_sockets: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Resolve engine configuration from the environment.
    pub fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let endpoint = match optional_env("DOCKER_HOST")? {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "DOCKER_HOST".to_string(),
                message: e,
            })?,
            None => defaults.endpoint,
        };

        let request_timeout_secs = parse_optional_env(
            "EPHEMERAL_DOCKER_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EPHEMERAL_DOCKER_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            endpoint,
            request_timeout: Duration::from_secs(request_timeout_secs),
            stop_timeout: Duration::from_secs(parse_optional_env(
                "EPHEMERAL_STOP_TIMEOUT_SECS",
                defaults.stop_timeout.as_secs(),
            )?),
            host_address: optional_env("EPHEMERAL_HOST_ADDRESS")?
                .unwrap_or(defaults.host_address),
            bind_ip: optional_env("EPHEMERAL_BIND_IP")?,
            cleanup_on_failure: parse_bool_env(
                "EPHEMERAL_CLEANUP_ON_FAILURE",
                defaults.cleanup_on_failure,
            )?,
            fallback_sockets: fallback_sockets()?,
        })
    }

    /// Stop grace period in whole seconds, as the engine API expects it.
    pub fn stop_timeout_secs(&self) -> i64 {
        i64::try_from(self.stop_timeout.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Socket locations used by Docker Desktop (`~/.docker/run`) and rootless
/// Docker (`$XDG_RUNTIME_DIR`).
fn fallback_sockets() -> Result<Vec<PathBuf>, ConfigError> {
    let mut sockets = Vec::new();
    if let Some(home) = optional_env("HOME")? {
        sockets.push(PathBuf::from(home).join(".docker/run/docker.sock"));
    }
    if let Some(runtime_dir) = optional_env("XDG_RUNTIME_DIR")? {
        sockets.push(PathBuf::from(runtime_dir).join("docker.sock"));
    }
    Ok(sockets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes env-mutating tests to prevent parallel races.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 6] = [
        "DOCKER_HOST",
        "EPHEMERAL_DOCKER_TIMEOUT_SECS",
        "EPHEMERAL_STOP_TIMEOUT_SECS",
        "EPHEMERAL_HOST_ADDRESS",
        "EPHEMERAL_BIND_IP",
        "EPHEMERAL_CLEANUP_ON_FAILURE",
    ];

    fn clear_engine_env() {
        // SAFETY: Only called under ENV_MUTEX in tests.
        unsafe {
            for var in VARS {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_endpoint_parsing() {
        assert_eq!(
            "unix:///var/run/docker.sock".parse::<EngineEndpoint>(),
            Ok(EngineEndpoint::Unix(PathBuf::from("/var/run/docker.sock")))
        );
        assert_eq!(
            "tcp://10.0.0.5:2375".parse::<EngineEndpoint>(),
            Ok(EngineEndpoint::Http("http://10.0.0.5:2375".to_string()))
        );
        assert_eq!(
            "http://localhost:2375".parse::<EngineEndpoint>(),
            Ok(EngineEndpoint::Http("http://localhost:2375".to_string()))
        );
        assert_eq!(
            "npipe:////./pipe/docker_engine".parse::<EngineEndpoint>(),
            Ok(EngineEndpoint::LocalDefaults)
        );
        assert!("ssh://me@host".parse::<EngineEndpoint>().is_err());
        assert!("unix://".parse::<EngineEndpoint>().is_err());
    }

    #[test]
    fn test_resolve_defaults() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_engine_env();

        let config = EngineConfig::resolve().expect("resolve should succeed");
        assert_eq!(config.endpoint, EngineEndpoint::LocalDefaults);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.stop_timeout_secs(), 10);
        assert_eq!(config.host_address, "127.0.0.1");
        assert!(config.bind_ip.is_none());
        assert!(config.cleanup_on_failure);
        assert!(EngineConfig::default().fallback_sockets.is_empty());
    }

    #[test]
    fn test_resolve_fallback_sockets_from_home_and_runtime_dir() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_engine_env();
        let saved: Vec<_> = ["HOME", "XDG_RUNTIME_DIR"]
            .into_iter()
            .map(|var| (var, std::env::var_os(var)))
            .collect();

        // SAFETY: Under ENV_MUTEX.
        unsafe {
            std::env::set_var("HOME", "/home/dev");
            std::env::set_var("XDG_RUNTIME_DIR", "/run/user/1000");
        }
        let config = EngineConfig::resolve().expect("resolve should succeed");
        assert_eq!(
            config.fallback_sockets,
            vec![
                PathBuf::from("/home/dev/.docker/run/docker.sock"),
                PathBuf::from("/run/user/1000/docker.sock"),
            ]
        );

        // SAFETY: Under ENV_MUTEX.
        unsafe {
            std::env::remove_var("HOME");
            std::env::remove_var("XDG_RUNTIME_DIR");
        }
        let config = EngineConfig::resolve().expect("resolve should succeed");
        assert!(config.fallback_sockets.is_empty());

        // SAFETY: Under ENV_MUTEX.
        unsafe {
            for (var, value) in saved {
                match value {
                    Some(value) => std::env::set_var(var, value),
                    None => std::env::remove_var(var),
                }
            }
        }
    }

    #[test]
    fn test_resolve_from_env() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_engine_env();

        // SAFETY: Under ENV_MUTEX.
        unsafe {
            std::env::set_var("DOCKER_HOST", "tcp://docker.internal:2375");
            std::env::set_var("EPHEMERAL_STOP_TIMEOUT_SECS", "3");
            std::env::set_var("EPHEMERAL_HOST_ADDRESS", "docker.internal");
            std::env::set_var("EPHEMERAL_CLEANUP_ON_FAILURE", "false");
        }

        let config = EngineConfig::resolve().expect("resolve should succeed");
        assert_eq!(
            config.endpoint,
            EngineEndpoint::Http("http://docker.internal:2375".to_string())
        );
        assert_eq!(config.stop_timeout_secs(), 3);
        assert_eq!(config.host_address, "docker.internal");
        assert!(!config.cleanup_on_failure);

        clear_engine_env();
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_engine_env();

        // SAFETY: Under ENV_MUTEX.
        unsafe {
            std::env::set_var("EPHEMERAL_DOCKER_TIMEOUT_SECS", "soon");
        }
        assert!(EngineConfig::resolve().is_err());

        // SAFETY: Under ENV_MUTEX.
        unsafe {
            std::env::set_var("EPHEMERAL_DOCKER_TIMEOUT_SECS", "0");
        }
        assert!(EngineConfig::resolve().is_err());

        clear_engine_env();
        // SAFETY: Under ENV_MUTEX.
        unsafe {
            std::env::set_var("DOCKER_HOST", "ssh://me@remote");
        }
        let err = EngineConfig::resolve().unwrap_err();
        assert!(err.to_string().contains("DOCKER_HOST"));

        clear_engine_env();
    }
}
