//! Chaos Mesh core
//!
//! Drives chaos experiments against a Kubernetes cluster: picks target pods,
//! injects a fault on each of them through the per-node chaos daemon, keeps
//! a crash-safe record of every injection, and recovers on pause, window end
//! or deletion.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Chaos objects, selector specs, status and pod records
//! - **actions**: Fault actions and their parameters
//! - **orchestrator**: State machine, reconcilers, fan-out executor, controller runtime
//! - **selector**: Pod selection, namespace policy and mode sampling
//! - **chaos**: One dispatcher per fault family
//! - **daemon**: Chaos daemon RPC client and test double
//! - **faultserver**: In-pod IO fault server
//! - **dns**: Chaos DNS resolver client
//! - **store**: Cluster store (kube-rs backed and in-memory)
//! - **events**: Experiment event sink
//! - **config**: Controller configuration
//! - **log_collector**: `log` backend with a background writer thread

// Core foundational modules
pub mod error;
pub mod models;
pub mod actions;

// Reconcile path
pub mod orchestrator;
pub mod selector;
pub mod chaos;
pub mod events;

// RPC surfaces
pub mod pb;
pub mod daemon;
pub mod faultserver;
pub mod dns;

// Cluster access
pub mod store;

// Ambient
pub mod config;
pub mod log_collector;

// Re-export the log crate for macro usage
pub use log;

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{ChaosError, ConfigError, MultiError, Result, SelectionError, ValidationError};

pub use models::{ChaosKind, ChaosObject, ChaosSpec, ObjectKey, PodMode, SelectorSpec};

pub use actions::Action;

pub use config::ControllerConfig;

pub use events::{EventKind, EventRecorder, LogEventRecorder};

pub use log_collector::{init_global_logger, LogCollector, LogLine};

pub use orchestrator::{ChaosController, ChaosReconciler, Phase, Reconciled};

pub use store::{ClusterStore, KubeStore, MemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_error_reexport() {
        let _: Result<i32> = Ok(42);
    }

    #[test]
    fn test_phase_reexport() {
        assert_eq!(Phase::default(), Phase::Uninitialized);
    }
}
