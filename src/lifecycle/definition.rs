//! Declarative description of a service container.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::lifecycle::error::DefinitionError;

/// What to run: image, published container ports, environment.
///
/// Immutable once built. Construction validates the image reference, port
/// numbers and environment variable names; duplicate ports are collapsed
/// keeping the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDefinition")]
pub struct ServiceDefinition {
    image: String,
    exposed_ports: Vec<u16>,
    env: BTreeMap<String, String>,
}

/// Unvalidated shape used for deserialization.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    image: String,
    #[serde(default)]
    exposed_ports: Vec<u16>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

impl TryFrom<RawDefinition> for ServiceDefinition {
    type Error = DefinitionError;

    fn try_from(raw: RawDefinition) -> Result<Self, Self::Error> {
        Self::new(raw.image, raw.exposed_ports, raw.env)
    }
}

impl ServiceDefinition {
    /// Create a validated definition.
    pub fn new(
        image: impl Into<String>,
        exposed_ports: impl IntoIterator<Item = u16>,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, DefinitionError> {
        let image = image.into();
        if image.trim().is_empty() {
            return Err(DefinitionError::EmptyImage);
        }

        let mut ports: Vec<u16> = Vec::new();
        for port in exposed_ports {
            if port == 0 {
                return Err(DefinitionError::InvalidPort(port));
            }
            if !ports.contains(&port) {
                ports.push(port);
            }
        }

        let env: BTreeMap<String, String> = env.into_iter().collect();
        if let Some(bad) = env
            .keys()
            .find(|k| k.is_empty() || k.contains('=') || k.contains('\0'))
        {
            return Err(DefinitionError::InvalidEnvKey(bad.clone()));
        }

        Ok(Self {
            image,
            exposed_ports: ports,
            env,
        })
    }

    /// A service with no published ports and an empty environment.
    pub fn image_only(image: impl Into<String>) -> Result<Self, DefinitionError> {
        Self::new(image, Vec::new(), no_env())
    }

    /// A service publishing a single port with an empty environment.
    pub fn single_port(image: impl Into<String>, port: u16) -> Result<Self, DefinitionError> {
        Self::new(image, [port], no_env())
    }

    /// Start a builder for the given image.
    pub fn builder(image: impl Into<String>) -> ServiceDefinitionBuilder {
        ServiceDefinitionBuilder {
            image: image.into(),
            ports: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Parse a definition from TOML.
    ///
    /// ```toml
    /// image = "postgres:16-alpine"
    /// exposed_ports = [5432]
    ///
    /// [env]
    /// POSTGRES_PASSWORD = "test"
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self, DefinitionError> {
        toml::from_str(s).map_err(|e| DefinitionError::Parse(e.to_string()))
    }

    /// Load a TOML definition file.
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Container ports to publish, in declaration order.
    pub fn exposed_ports(&self) -> &[u16] {
        &self.exposed_ports
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Environment encoded as `KEY=VALUE` strings, sorted by key.
    pub fn env_strings(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

fn no_env() -> std::iter::Empty<(String, String)> {
    std::iter::empty()
}

/// Builder for [`ServiceDefinition`]. Validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ServiceDefinitionBuilder {
    image: String,
    ports: Vec<u16>,
    env: Vec<(String, String)>,
}

impl ServiceDefinitionBuilder {
    /// Publish a container port.
    pub fn port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    /// Publish several container ports.
    pub fn ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports.extend(ports);
        self
    }

    /// Set an environment variable. Later values win for repeated keys.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<ServiceDefinition, DefinitionError> {
        ServiceDefinition::new(self.image, self.ports, self.env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convenience_constructors() {
        let bare = ServiceDefinition::image_only("redis:7").unwrap();
        assert_eq!(bare.image(), "redis:7");
        assert!(bare.exposed_ports().is_empty());
        assert!(bare.env().is_empty());

        let web = ServiceDefinition::single_port("nginx:alpine", 80).unwrap();
        assert_eq!(web.exposed_ports(), &[80]);
        assert!(web.env().is_empty());
    }

    #[test]
    fn test_rejects_empty_image() {
        assert!(matches!(
            ServiceDefinition::image_only(""),
            Err(DefinitionError::EmptyImage)
        ));
        assert!(matches!(
            ServiceDefinition::single_port("   ", 80),
            Err(DefinitionError::EmptyImage)
        ));
    }

    #[test]
    fn test_rejects_port_zero() {
        assert!(matches!(
            ServiceDefinition::single_port("nginx:alpine", 0),
            Err(DefinitionError::InvalidPort(0))
        ));
    }

    #[test]
    fn test_duplicate_ports_collapse_in_order() {
        let def = ServiceDefinition::builder("app:latest")
            .port(8080)
            .ports([9090, 8080, 80])
            .port(9090)
            .build()
            .unwrap();
        assert_eq!(def.exposed_ports(), &[8080, 9090, 80]);
    }

    #[test]
    fn test_env_strings_are_sorted_key_value_pairs() {
        let def = ServiceDefinition::builder("postgres:16")
            .env("POSTGRES_USER", "app")
            .env("POSTGRES_PASSWORD", "secret=with=equals")
            .build()
            .unwrap();
        assert_eq!(
            def.env_strings(),
            vec![
                "POSTGRES_PASSWORD=secret=with=equals".to_string(),
                "POSTGRES_USER=app".to_string(),
            ]
        );
    }

    #[test]
    fn test_builder_later_env_value_wins() {
        let def = ServiceDefinition::builder("app")
            .env("MODE", "dev")
            .env("MODE", "test")
            .build()
            .unwrap();
        assert_eq!(def.env().get("MODE").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_rejects_bad_env_keys() {
        for key in ["", "A=B", "A\0B"] {
            let result = ServiceDefinition::builder("app").env(key, "x").build();
            assert!(
                matches!(result, Err(DefinitionError::InvalidEnvKey(_))),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_toml() {
        let def = ServiceDefinition::from_toml_str(
            r#"
            image = "postgres:16-alpine"
            exposed_ports = [5432, 5432]

            [env]
            POSTGRES_PASSWORD = "test"
            "#,
        )
        .unwrap();
        assert_eq!(def.image(), "postgres:16-alpine");
        assert_eq!(def.exposed_ports(), &[5432]);
        assert_eq!(def.env_strings(), vec!["POSTGRES_PASSWORD=test".to_string()]);
    }

    #[test]
    fn test_toml_goes_through_validation() {
        let err = ServiceDefinition::from_toml_str(r#"image = """#).unwrap_err();
        assert!(err.to_string().contains("image reference"), "{err}");

        assert!(ServiceDefinition::from_toml_str(r#"exposed_ports = [80]"#).is_err());
        assert!(
            ServiceDefinition::from_toml_str("image = \"a\"\nrestart = \"always\"").is_err()
        );
    }

    #[test]
    fn test_json_round_trip_preserves_definition() {
        let def = ServiceDefinition::builder("nginx:alpine")
            .port(80)
            .env("NGINX_PORT", "80")
            .build()
            .unwrap();
        let json = serde_json::to_string(&def).unwrap();
        let back: ServiceDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
    }
}
