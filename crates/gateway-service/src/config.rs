//! Gateway configuration.
//!
//! Configuration is loaded from environment variables. The ACL itself lives
//! in a JSON file named by `GATEWAY_ACL_PATH`; it is read and validated at
//! startup, never reloaded.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default gRPC listen address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8082";

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// gRPC listen address (default: "127.0.0.1:8082").
    pub listen_address: String,

    /// Path to the ACL JSON document.
    pub acl_path: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when `GATEWAY_ACL_PATH` is
    /// not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when `GATEWAY_ACL_PATH` is
    /// not present.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let acl_path = vars
            .get("GATEWAY_ACL_PATH")
            .ok_or_else(|| ConfigError::MissingEnvVar("GATEWAY_ACL_PATH".to_string()))?
            .clone();

        let listen_address = vars
            .get("GATEWAY_LISTEN_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string());

        Ok(Config {
            listen_address,
            acl_path,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "GATEWAY_ACL_PATH".to_string(),
            "/etc/gateway/acl.json".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.acl_path, "/etc/gateway/acl.json");
        assert_eq!(config.listen_address, DEFAULT_LISTEN_ADDRESS);
    }

    #[test]
    fn test_from_vars_custom_listen_address() {
        let mut vars = base_vars();
        vars.insert(
            "GATEWAY_LISTEN_ADDRESS".to_string(),
            "0.0.0.0:9090".to_string(),
        );

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.listen_address, "0.0.0.0:9090");
    }

    #[test]
    fn test_from_vars_missing_acl_path() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "GATEWAY_ACL_PATH"));
    }
}
