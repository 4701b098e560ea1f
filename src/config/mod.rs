//! Controller configuration.
//!
//! # Module Structure
//!
//! - `loader`: reads a JSON config file and layers environment overrides on top
//! - `validator`: checks ports, timeouts and namespace patterns
//!
//! # Configuration Flow
//!
//! 1. Start from `ControllerConfig::default()` or a JSON file
//! 2. Apply environment overrides
//! 3. Validate
//! 4. Derive the selector policy and dispatcher settings

pub mod loader;
pub mod validator;

use std::path::PathBuf;
use std::time::Duration;

use crate::chaos::{DispatchSettings, DEFAULT_FAULT_SERVER_PORT, DEFAULT_POD_FAILURE_IMAGE};
use crate::daemon::DEFAULT_DAEMON_PORT;
use crate::error::ConfigError;
use crate::models::ChaosKind;
use crate::selector::NamespacePolicy;

pub use loader::{apply_env_overrides, apply_overrides, load_config, load_config_from_file};
pub use validator::validate_config;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    // Daemon & fault server
    pub chaos_daemon_port: u16,
    pub rpc_timeout_secs: u64,
    pub fault_server_port: u16,
    pub dns_server_address: String,
    pub pod_failure_image: String,

    // Namespace policy, comma-separated regexes
    pub allowed_namespaces: String,
    pub ignored_namespaces: String,

    // Scope
    pub cluster_scoped: bool,
    pub target_namespace: String,

    // Runtime
    pub resync_period_secs: u64,
    pub log_dir: Option<PathBuf>,
    pub watched_kinds: Vec<ChaosKind>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            chaos_daemon_port: DEFAULT_DAEMON_PORT,
            rpc_timeout_secs: 60,
            fault_server_port: DEFAULT_FAULT_SERVER_PORT,
            dns_server_address: String::new(),
            pod_failure_image: DEFAULT_POD_FAILURE_IMAGE.to_string(),
            allowed_namespaces: String::new(),
            ignored_namespaces: String::new(),
            cluster_scoped: true,
            target_namespace: "default".to_string(),
            resync_period_secs: 30,
            log_dir: None,
            watched_kinds: ChaosKind::ALL.to_vec(),
        }
    }
}

impl ControllerConfig {
    /// Defaults with the process environment layered on top.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ControllerConfig::default();
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    pub fn namespace_policy(&self) -> Result<NamespacePolicy, ConfigError> {
        NamespacePolicy::new(&self.allowed_namespaces, &self.ignored_namespaces)
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            fault_server_port: self.fault_server_port,
            dns_server_address: self.dns_server_address.clone(),
            pod_failure_image: self.pod_failure_image.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.chaos_daemon_port, 31767);
        assert_eq!(config.fault_server_port, 65534);
        assert_eq!(config.rpc_timeout(), Duration::from_secs(60));
        assert_eq!(config.watched_kinds.len(), 6);
        assert!(config.cluster_scoped);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"chaos_daemon_port": 4000, "watched_kinds": ["PodChaos"]}"#).unwrap();
        assert_eq!(config.chaos_daemon_port, 4000);
        assert_eq!(config.watched_kinds, vec![ChaosKind::PodChaos]);
        assert_eq!(config.target_namespace, "default");
    }

    #[test]
    fn test_dispatch_settings() {
        let config = ControllerConfig {
            dns_server_address: "10.0.0.53".into(),
            ..Default::default()
        };
        let settings = config.dispatch_settings();
        assert_eq!(settings.dns_server_address, "10.0.0.53");
        assert_eq!(settings.pod_failure_image, DEFAULT_POD_FAILURE_IMAGE);
    }
}
