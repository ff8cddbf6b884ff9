//! Runtime record of a started container.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::lifecycle::definition::ServiceDefinition;
use crate::lifecycle::error::{LifecycleError, Result};

/// A running service produced by a successful
/// [`start`](crate::lifecycle::ContainerLifecycleManager::start).
///
/// Plain data: dropping it does not touch the container. Once the container
/// has been stopped the record is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInstance {
    container_id: String,
    definition: ServiceDefinition,
    mapped_ports: BTreeMap<u16, u16>,
    host: String,
}

impl ServiceInstance {
    pub(crate) fn new(
        container_id: String,
        definition: ServiceDefinition,
        mapped_ports: BTreeMap<u16, u16>,
        host: String,
    ) -> Self {
        Self {
            container_id,
            definition,
            mapped_ports,
            host,
        }
    }

    /// Engine-assigned container ID.
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// The definition this instance was started from.
    pub fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    /// Container port → host port, only for ports the engine bound.
    pub fn mapped_ports(&self) -> &BTreeMap<u16, u16> {
        &self.mapped_ports
    }

    /// Address the host ports are reachable on.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host port bound to `container_port`.
    ///
    /// Fails with [`LifecycleError::PortNotMapped`] when the engine did not
    /// (yet) bind that port.
    pub fn get_mapped_port(&self, container_port: u16) -> Result<u16> {
        self.mapped_ports
            .get(&container_port)
            .copied()
            .ok_or_else(|| LifecycleError::PortNotMapped {
                port: container_port,
                container_id: self.container_id.clone(),
            })
    }

    /// Connection endpoint for `container_port`.
    pub fn endpoint(&self, container_port: u16) -> Result<ServiceEndpoint> {
        Ok(ServiceEndpoint {
            host: self.host.clone(),
            port: self.get_mapped_port(container_port)?,
            container_port,
        })
    }

    /// True when every requested port has a host binding.
    ///
    /// A partial map usually means the engine had not finished wiring the
    /// network when the container was inspected.
    pub fn is_fully_mapped(&self) -> bool {
        self.definition
            .exposed_ports()
            .iter()
            .all(|p| self.mapped_ports.contains_key(p))
    }
}

/// Where a published container port can be reached from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEndpoint {
    /// Host address.
    pub host: String,
    /// Port on the host.
    pub port: u16,
    /// Port inside the container.
    pub container_port: u16,
}

impl ServiceEndpoint {
    /// HTTP URL for this endpoint.
    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(ports: &[(u16, u16)]) -> ServiceInstance {
        let definition = ServiceDefinition::builder("nginx:alpine")
            .ports([80, 443])
            .build()
            .unwrap();
        ServiceInstance::new(
            "c0ffee".to_string(),
            definition,
            ports.iter().copied().collect(),
            "127.0.0.1".to_string(),
        )
    }

    #[test]
    fn test_get_mapped_port_hit() {
        let inst = instance(&[(80, 49153)]);
        assert_eq!(inst.get_mapped_port(80).unwrap(), 49153);
    }

    #[test]
    fn test_get_mapped_port_miss_is_an_error() {
        let inst = instance(&[(80, 49153)]);
        match inst.get_mapped_port(443) {
            Err(LifecycleError::PortNotMapped { port, container_id }) => {
                assert_eq!(port, 443);
                assert_eq!(container_id, "c0ffee");
            }
            other => panic!("expected PortNotMapped, got {other:?}"),
        }
        assert!(inst.get_mapped_port(8080).is_err());
    }

    #[test]
    fn test_endpoint() {
        let inst = instance(&[(80, 49153)]);
        let ep = inst.endpoint(80).unwrap();
        assert_eq!(ep.container_port, 80);
        assert_eq!(ep.to_string(), "127.0.0.1:49153");
        assert_eq!(ep.http_url(), "http://127.0.0.1:49153");
        assert!(inst.endpoint(443).is_err());
    }

    #[test]
    fn test_is_fully_mapped() {
        assert!(!instance(&[(80, 49153)]).is_fully_mapped());
        assert!(instance(&[(80, 49153), (443, 49154)]).is_fully_mapped());
    }
}
