//! Unified error type hierarchy for the chaos controller.
//!
//! Each concern gets its own enum (validation, selection, store, RPC,
//! scheduler, config). `ChaosError` is the umbrella type returned by every
//! reconcile-path operation; `MultiError` aggregates per-target failures
//! collected during a fan-out.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::orchestrator::state::Phase;

/// Malformed chaos specs. Never mutate phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("scheduler and duration should be omitted or defined at the same time")]
    SchedulerDurationMismatch,

    #[error("invalid duration {value:?}: {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("action {action} is not supported by {kind}")]
    UnsupportedAction { kind: String, action: String },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("unknown clock id {0}")]
    UnknownClockId(String),

    #[error("invalid finalizer key {0:?}")]
    InvalidFinalizerKey(String),
}

/// Target resolution failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no pod is selected")]
    NoPodSelected,

    #[error("invalid value {value:?} for mode {mode}: {reason}")]
    InvalidModeValue {
        mode: String,
        value: String,
        reason: String,
    },

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("namespace {0} is outside of the controller's target namespace")]
    NamespaceOutOfScope(String),
}

/// Cluster store failures. `Conflict` is the compare-and-swap miss.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },

    #[error("operation cannot be fulfilled on {0}: the object has been modified; please apply your changes to the latest version and try again")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Daemon, fault-server and DNS server RPC failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("rpc {method} failed: {message}")]
    Status { method: String, message: String },

    #[error("rpc {method} timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("node {0} has no published address")]
    NoNodeAddress(String),

    #[error("pod {0} is not scheduled on any node")]
    Unscheduled(String),
}

/// Cron parsing and window iteration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("fail to parse runner rule {expr}: {reason}")]
    Parse { expr: String, reason: String },

    #[error("misdefined scheduler")]
    Misdefined,

    #[error("the number of iterations exceeded {limit} while {context}")]
    IterationsExceeded { limit: usize, context: String },
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid environment override {name}: {reason}")]
    InvalidEnv { name: String, reason: String },

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Umbrella error for reconcile, dispatch and RPC paths.
#[derive(Error, Debug)]
pub enum ChaosError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Per-target injection failure (missing container, bad target state).
    #[error("{0}")]
    Inject(String),

    /// A reconcile task died before returning (panic or abort).
    #[error("reconcile task failed: {0}")]
    Task(String),

    #[error("turn from {from} into {to} is unexpected")]
    UnexpectedTransition { from: Phase, to: Phase },

    #[error(transparent)]
    Multi(#[from] MultiError),
}

impl ChaosError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChaosError::Store(StoreError::NotFound { .. }))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ChaosError::Store(StoreError::Conflict(_)))
    }

    /// Scheduler overruns stop retries until a human intervenes.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChaosError::Scheduler(SchedulerError::IterationsExceeded { .. })
        )
    }

    /// Connection-level RPC failures (target unreachable, as opposed to a
    /// server-side rejection).
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ChaosError::Rpc(RpcError::Connect { .. }) | ChaosError::Rpc(RpcError::Timeout { .. })
        )
    }

    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        ChaosError::Store(StoreError::NotFound {
            kind: kind.into(),
            key: key.into(),
        })
    }
}

/// Accumulated failures from a fan-out. Display mirrors the familiar
/// "N errors occurred" listing.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<ChaosError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: ChaosError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ChaosError] {
        &self.errors
    }

    pub fn first(&self) -> Option<&ChaosError> {
        self.errors.first()
    }

    /// First collected error, dropping the rest.
    pub fn into_first(self) -> Option<ChaosError> {
        self.errors.into_iter().next()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ChaosError::Multi(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "1 error occurred:\n\t* {}", self.errors[0]),
            n => {
                write!(f, "{} errors occurred:", n)?;
                for err in &self.errors {
                    write!(f, "\n\t* {}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {}

impl From<Vec<ChaosError>> for MultiError {
    fn from(errors: Vec<ChaosError>) -> Self {
        MultiError { errors }
    }
}

/// Top-level result type for controller operations.
pub type Result<T, E = ChaosError> = std::result::Result<T, E>;
