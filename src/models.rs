//! Core data structures for chaos experiments.
//!
//! A `ChaosObject` is the controller's view of one chaos resource: metadata
//! (identity, annotations, finalizers, deletion marker), the declarative spec
//! and the observed status the state machine maintains.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::actions::Action;
use crate::error::{ChaosError, ValidationError};
use crate::orchestrator::finalizers::Finalizers;
use crate::orchestrator::scheduler::{format_duration, parse_duration, CronSchedule};
use crate::orchestrator::state::Phase;

// ============================================================================
// ANNOTATIONS
// ============================================================================

/// `"true"` pauses the experiment.
pub const ANNOTATION_PAUSE: &str = "chaos-mesh.org/pause";

/// `"forced"` skips recovery on deletion and drops every finalizer.
pub const ANNOTATION_CLEAN_FINALIZER: &str = "chaos-mesh.org/clean-finalizer";
pub const ANNOTATION_CLEAN_FINALIZER_FORCED: &str = "forced";

/// Requests sidecar injection by the admission webhook.
pub const ANNOTATION_WEBHOOK_REQUEST: &str = "admission-webhook.chaos-mesh.org/request";

/// Prefix of the per-container original-image annotation written by pod-failure.
pub const ANNOTATION_IMAGE_PREFIX: &str = "chaos-mesh";

/// Namespace + name of a namespaced object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a k8s object, empty namespace if unset.
    pub fn of(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> Self {
        ObjectKey {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Chaos resource kinds served by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChaosKind {
    PodChaos,
    NetworkChaos,
    IoChaos,
    StressChaos,
    TimeChaos,
    DnsChaos,
}

impl ChaosKind {
    pub const ALL: [ChaosKind; 6] = [
        ChaosKind::PodChaos,
        ChaosKind::NetworkChaos,
        ChaosKind::IoChaos,
        ChaosKind::StressChaos,
        ChaosKind::TimeChaos,
        ChaosKind::DnsChaos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChaosKind::PodChaos => "PodChaos",
            ChaosKind::NetworkChaos => "NetworkChaos",
            ChaosKind::IoChaos => "IoChaos",
            ChaosKind::StressChaos => "StressChaos",
            ChaosKind::TimeChaos => "TimeChaos",
            ChaosKind::DnsChaos => "DNSChaos",
        }
    }

    /// Resource plural under `chaos-mesh.org/v1alpha1`.
    pub fn plural(&self) -> &'static str {
        match self {
            ChaosKind::PodChaos => "podchaos",
            ChaosKind::NetworkChaos => "networkchaos",
            ChaosKind::IoChaos => "iochaos",
            ChaosKind::StressChaos => "stresschaos",
            ChaosKind::TimeChaos => "timechaos",
            ChaosKind::DnsChaos => "dnschaos",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ChaosKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(name) || k.plural() == name)
    }
}

impl fmt::Display for ChaosKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule reducing the selector output to the final target list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PodMode {
    #[default]
    One,
    All,
    Fixed,
    FixedPercent,
    RandomMaxPercent,
}

impl PodMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodMode::One => "one",
            PodMode::All => "all",
            PodMode::Fixed => "fixed",
            PodMode::FixedPercent => "fixed-percent",
            PodMode::RandomMaxPercent => "random-max-percent",
        }
    }
}

impl fmt::Display for PodMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set-based label requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRequirement {
    pub key: String,
    pub operator: LabelOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Structured pod filter; all present options combine by conjunction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorSpec {
    /// namespace -> pod names
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub pods: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub label_selectors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expression_selectors: Vec<LabelRequirement>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub field_selectors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotation_selectors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pod_phase_selectors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selectors: BTreeMap<String, String>,
}

/// A selector together with its sampling mode, used for secondary target
/// sets such as the far side of a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PodSelectorSpec {
    pub selector: SelectorSpec,
    pub mode: PodMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSpec {
    pub cron: String,
}

/// Declarative part of a chaos resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosSpec {
    #[serde(default)]
    pub selector: SelectorSpec,
    #[serde(default)]
    pub mode: PodMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerSpec>,
    /// Containers to target; empty means the first container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_names: Vec<String>,
}

impl ChaosSpec {
    pub fn new(action: Action) -> Self {
        ChaosSpec {
            selector: SelectorSpec::default(),
            mode: PodMode::One,
            value: None,
            action,
            duration: None,
            scheduler: None,
            container_names: Vec::new(),
        }
    }

    /// The primary selector with its mode.
    pub fn pod_selector(&self) -> PodSelectorSpec {
        PodSelectorSpec {
            selector: self.selector.clone(),
            mode: self.mode,
            value: self.value.clone(),
        }
    }
}

/// Per-target observation for the last injection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PodRecord {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    #[serde(rename = "hostIP")]
    pub host_ip: String,
    #[serde(rename = "podIP")]
    pub pod_ip: String,
    pub action: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// A running stress-ng process on a target's node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressInstance {
    pub uid: String,
    pub start_time: DateTime<Utc>,
}

/// Observed state maintained by the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ChaosStatus {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_recover: Option<DateTime<Utc>>,
    pub pod_records: Vec<PodRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_message: Option<String>,
    /// `<namespace>/<name>` -> stress instance
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub instances: BTreeMap<String, StressInstance>,
    /// Set by a scheduler overrun. The experiment stays Failed until a
    /// human clears it or deletes the object.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub halted: bool,
}

/// Identity and bookkeeping metadata of a chaos resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ChaosMeta {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub finalizers: Finalizers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

/// One chaos experiment as seen by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosObject {
    pub kind: ChaosKind,
    pub metadata: ChaosMeta,
    pub spec: ChaosSpec,
    #[serde(default)]
    pub status: ChaosStatus,
}

impl ChaosObject {
    pub fn new(
        kind: ChaosKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: ChaosSpec,
    ) -> Self {
        ChaosObject {
            kind,
            metadata: ChaosMeta {
                namespace: namespace.into(),
                name: name.into(),
                ..Default::default()
            },
            spec,
            status: ChaosStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_paused(&self) -> bool {
        self.metadata
            .annotations
            .get(ANNOTATION_PAUSE)
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    pub fn is_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn is_forced_cleanup(&self) -> bool {
        self.metadata
            .annotations
            .get(ANNOTATION_CLEAN_FINALIZER)
            .map(|v| v == ANNOTATION_CLEAN_FINALIZER_FORCED)
            .unwrap_or(false)
    }

    /// Parsed injection window length.
    pub fn duration(&self) -> Result<Option<Duration>, ValidationError> {
        match &self.spec.duration {
            None => Ok(None),
            Some(raw) => {
                let d = parse_duration(raw)?;
                if d < Duration::zero() {
                    return Err(ValidationError::InvalidDuration {
                        value: raw.clone(),
                        reason: "duration must not be negative".to_string(),
                    });
                }
                Ok(Some(d))
            }
        }
    }

    pub fn schedule(&self) -> Result<Option<CronSchedule>, ChaosError> {
        match &self.spec.scheduler {
            None => Ok(None),
            Some(s) => Ok(Some(CronSchedule::parse(&s.cron)?)),
        }
    }

    /// Recurring experiments carry both a scheduler and a duration.
    pub fn is_scheduled(&self) -> bool {
        self.spec.scheduler.is_some() && self.spec.duration.is_some()
    }

    /// Check that scheduler, duration and action agree before touching any target.
    pub fn validate(&self) -> Result<(), ChaosError> {
        if self.spec.scheduler.is_some() != self.spec.duration.is_some() {
            return Err(ValidationError::SchedulerDurationMismatch.into());
        }
        self.duration()?;
        self.schedule()?;
        self.spec.action.validate(self.kind)?;
        Ok(())
    }

    /// Find the recorded UID for a pod key in the last injection.
    pub fn recorded_uid(&self, pod: &ObjectKey) -> Option<&str> {
        self.status
            .pod_records
            .iter()
            .find(|r| r.namespace == pod.namespace && r.name == pod.name)
            .map(|r| r.uid.as_str())
            .filter(|uid| !uid.is_empty())
    }

    /// Stamp the status duration string from a parsed duration.
    pub fn set_status_duration(&mut self, d: Duration) {
        self.status.duration = Some(format_duration(d));
    }
}
