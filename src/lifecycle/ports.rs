//! Resolution of engine-reported port bindings.
//!
//! The engine reports published ports as a table keyed by `"<port>/<proto>"`
//! with a list of host bindings per key. Only TCP entries are kept. When the
//! engine lists several host bindings for one container port (typically one
//! per address family) the first one in the engine's list order that carries
//! a host port wins.

use std::collections::BTreeMap;

use bollard::models::{PortBinding, PortMap};

use crate::lifecycle::error::PortResolveError;

/// Build the container-port → host-port map from an engine binding table.
///
/// Non-TCP entries are ignored. Entries without a usable binding (no list,
/// empty list, empty or zero host port) are omitted rather than mapped to a
/// default. A malformed port number in either the key or a host binding is a
/// contract violation and is returned as an error.
pub fn resolve_port_bindings(ports: &PortMap) -> Result<BTreeMap<u16, u16>, PortResolveError> {
    let mut mapped = BTreeMap::new();

    for (key, bindings) in ports {
        let Some(container_port) = parse_tcp_key(key)? else {
            continue;
        };

        let Some(bindings) = bindings else {
            continue;
        };

        if let Some(host_port) = first_host_port(bindings)? {
            mapped.insert(container_port, host_port);
        }
    }

    Ok(mapped)
}

/// The engine key for a TCP container port.
pub fn tcp_key(port: u16) -> String {
    format!("{}/tcp", port)
}

/// Parse `"80/tcp"` into `Some(80)`; non-TCP keys yield `None`.
/// A key with no protocol suffix uses the engine default, TCP.
fn parse_tcp_key(key: &str) -> Result<Option<u16>, PortResolveError> {
    let (port, proto) = key.split_once('/').unwrap_or((key, "tcp"));
    if !proto.eq_ignore_ascii_case("tcp") {
        return Ok(None);
    }
    parse_port(port, key).map(Some)
}

fn first_host_port(bindings: &[PortBinding]) -> Result<Option<u16>, PortResolveError> {
    for binding in bindings {
        let Some(raw) = binding.host_port.as_deref() else {
            continue;
        };
        if raw.trim().is_empty() {
            continue;
        }
        let port = parse_port(raw, raw)?;
        // Zero means the engine has not allocated a port yet.
        if port != 0 {
            return Ok(Some(port));
        }
    }
    Ok(None)
}

fn parse_port(raw: &str, context: &str) -> Result<u16, PortResolveError> {
    raw.trim().parse::<u16>().map_err(|e| PortResolveError {
        value: context.to_string(),
        reason: e.to_string(),
    })
}
