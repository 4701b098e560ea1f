//! Config file loader and environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::{validate_config, ControllerConfig};
use crate::error::ConfigError;

/// Load config from a JSON file.
pub fn load_config_from_file(path: &Path) -> Result<ControllerConfig, ConfigError> {
    validate_config_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(format!("Configuration file not found at: {}", path.display()))
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let config: ControllerConfig = serde_json::from_str(&content)?;
    log::debug!("[Config] Loaded {}", path.display());
    Ok(config)
}

/// File (when given) + environment + validation.
pub fn load_config(path: Option<&Path>) -> Result<ControllerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config_from_file(path)?,
        None => ControllerConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate config path (.json extension required).
pub fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Configuration path cannot be empty".to_string(),
        ));
    }

    match path.extension() {
        Some(ext) if ext == "json" => Ok(()),
        Some(ext) => Err(ConfigError::ValidationFailed(format!(
            "Configuration file must have .json extension, got .{}",
            ext.to_string_lossy()
        ))),
        None => Err(ConfigError::ValidationFailed(
            "Configuration file must have .json extension".to_string(),
        )),
    }
}

pub fn apply_env_overrides(config: &mut ControllerConfig) -> Result<(), ConfigError> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

/// Layer overrides from `lookup` (an environment stand-in) onto `config`.
pub fn apply_overrides<F>(config: &mut ControllerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = parsed(&lookup, "CHAOS_DAEMON_PORT")? {
        config.chaos_daemon_port = v;
    }
    if let Some(v) = lookup("ALLOWED_NAMESPACES") {
        config.allowed_namespaces = v;
    }
    if let Some(v) = lookup("IGNORED_NAMESPACES") {
        config.ignored_namespaces = v;
    }
    if let Some(v) = lookup("RPC_TIMEOUT") {
        config.rpc_timeout_secs = seconds("RPC_TIMEOUT", &v)?;
    }
    if let Some(v) = parsed(&lookup, "FAULT_SERVER_PORT")? {
        config.fault_server_port = v;
    }
    if let Some(v) = lookup("CHAOS_DNS_SERVICE_ADDRESS") {
        config.dns_server_address = v;
    }
    if let Some(v) = parsed(&lookup, "CLUSTER_SCOPED")? {
        config.cluster_scoped = v;
    }
    if let Some(v) = lookup("TARGET_NAMESPACE") {
        config.target_namespace = v;
    }
    if let Some(v) = lookup("RESYNC_PERIOD") {
        config.resync_period_secs = seconds("RESYNC_PERIOD", &v)?;
    }
    if let Some(v) = lookup("LOG_DIR") {
        config.log_dir = (!v.is_empty()).then(|| PathBuf::from(v));
    }
    if let Some(v) = lookup("POD_FAILURE_IMAGE") {
        config.pod_failure_image = v;
    }
    Ok(())
}

fn parsed<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidEnv {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Plain seconds (`60`) or a humantime duration (`1m`).
fn seconds(name: &str, raw: &str) -> Result<u64, ConfigError> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(raw)
        .map(|d| d.as_secs())
        .map_err(|e| ConfigError::InvalidEnv {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("controller.json");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"target_namespace": "chaos-testing", "cluster_scoped": false}}"#).unwrap();

        let config = load_config_from_file(&path).unwrap();
        assert_eq!(config.target_namespace, "chaos-testing");
        assert!(!config.cluster_scoped);
        assert_eq!(config.resync_period_secs, 30);
    }

    #[test]
    fn test_rejects_non_json_extension() {
        let err = load_config_from_file(Path::new("/tmp/controller.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ControllerConfig::default();
        apply_overrides(
            &mut config,
            env(&[
                ("CHAOS_DAEMON_PORT", "4000"),
                ("RPC_TIMEOUT", "2m"),
                ("RESYNC_PERIOD", "10"),
                ("CLUSTER_SCOPED", "false"),
                ("IGNORED_NAMESPACES", "kube-.*"),
                ("LOG_DIR", "/var/log/chaos"),
            ]),
        )
        .unwrap();

        assert_eq!(config.chaos_daemon_port, 4000);
        assert_eq!(config.rpc_timeout_secs, 120);
        assert_eq!(config.resync_period_secs, 10);
        assert!(!config.cluster_scoped);
        assert_eq!(config.ignored_namespaces, "kube-.*");
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/chaos")));
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = ControllerConfig::default();
        let err = apply_overrides(&mut config, env(&[("CHAOS_DAEMON_PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "CHAOS_DAEMON_PORT"));
    }
}
