//! Crate-level error types.
//!
//! Lifecycle errors live next to the lifecycle code in
//! [`crate::lifecycle::error`]; this module holds the errors shared by the
//! configuration layer.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_names_the_key() {
        let err = ConfigError::InvalidValue {
            key: "EPHEMERAL_BIND_IP".to_string(),
            message: "not an address".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for EPHEMERAL_BIND_IP: not an address"
        );
    }
}
