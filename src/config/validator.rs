//! Config validation.

use super::ControllerConfig;
use crate::error::ConfigError;

/// Validate a port number (non-zero).
pub fn validate_port(name: &str, port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::ValidationFailed(format!("{} must be in 1..=65535", name)));
    }
    Ok(())
}

pub fn validate_config(config: &ControllerConfig) -> Result<(), ConfigError> {
    validate_port("chaos_daemon_port", config.chaos_daemon_port)?;
    validate_port("fault_server_port", config.fault_server_port)?;

    if config.rpc_timeout_secs == 0 {
        return Err(ConfigError::ValidationFailed(
            "rpc_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if config.resync_period_secs == 0 {
        return Err(ConfigError::ValidationFailed(
            "resync_period_secs must be greater than zero".to_string(),
        ));
    }
    if !config.cluster_scoped && config.target_namespace.trim().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "target_namespace is required when cluster_scoped is false".to_string(),
        ));
    }
    if config.watched_kinds.is_empty() {
        return Err(ConfigError::ValidationFailed(
            "watched_kinds cannot be empty".to_string(),
        ));
    }

    // Patterns must compile.
    config.namespace_policy()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ControllerConfig {
            rpc_timeout_secs: 0,
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_bad_namespace_pattern_rejected() {
        let config = ControllerConfig {
            allowed_namespaces: "app-(".into(),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_namespaced_requires_target() {
        let config = ControllerConfig {
            cluster_scoped: false,
            target_namespace: " ".into(),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        assert!(validate_port("chaos_daemon_port", 0).is_err());
        assert!(validate_port("chaos_daemon_port", 31767).is_ok());
    }
}
