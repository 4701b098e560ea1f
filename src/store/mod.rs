//! Cluster object store.
//!
//! The reconciler sees the cluster through `ClusterStore`: chaos objects
//! with compare-and-swap updates keyed on the resource version, plus the pod,
//! node and namespace operations the dispatchers need.

pub mod k8s;
pub mod memory;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{ChaosKind, ChaosObject, ObjectKey};

pub use self::k8s::KubeStore;
pub use self::memory::MemoryStore;

/// Filter passed to `list_pods`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodListFilter {
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
}

impl PodListFilter {
    pub fn label_selector(&self) -> String {
        join_selector(&self.labels)
    }

    pub fn field_selector(&self) -> String {
        join_selector(&self.fields)
    }
}

fn join_selector(map: &BTreeMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_chaos(&self, kind: ChaosKind, key: &ObjectKey) -> Result<ChaosObject>;

    async fn list_chaos(&self, kind: ChaosKind, namespace: Option<&str>) -> Result<Vec<ChaosObject>>;

    /// Write metadata, spec and status. Fails with `StoreError::Conflict`
    /// when `chaos.metadata.resource_version` is stale.
    async fn update_chaos(&self, chaos: &ChaosObject) -> Result<ChaosObject>;

    async fn get_pod(&self, key: &ObjectKey) -> Result<Pod>;

    async fn list_pods(&self, filter: &PodListFilter) -> Result<Vec<Pod>>;

    async fn update_pod(&self, pod: &Pod) -> Result<Pod>;

    async fn update_pod_status(&self, pod: &Pod) -> Result<Pod>;

    async fn delete_pod(&self, key: &ObjectKey, grace_period_secs: i64) -> Result<()>;

    async fn get_node(&self, name: &str) -> Result<Node>;

    async fn list_nodes(&self, labels: &BTreeMap<String, String>) -> Result<Vec<Node>>;

    /// Set (`Some`) or remove (`None`) one namespace annotation.
    async fn annotate_namespace(&self, namespace: &str, key: &str, value: Option<&str>) -> Result<()>;
}

/// Read accessors over a pod snapshot.
pub trait PodExt {
    fn key(&self) -> ObjectKey;
    fn uid(&self) -> &str;
    fn labels(&self) -> Option<&BTreeMap<String, String>>;
    fn annotations(&self) -> Option<&BTreeMap<String, String>>;
    fn phase(&self) -> &str;
    fn node_name(&self) -> Option<&str>;
    fn pod_ip(&self) -> &str;
    fn host_ip(&self) -> &str;
}

impl PodExt for Pod {
    fn key(&self) -> ObjectKey {
        ObjectKey::of(&self.metadata)
    }

    fn uid(&self) -> &str {
        self.metadata.uid.as_deref().unwrap_or("")
    }

    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }

    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }

    fn phase(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("")
    }

    fn node_name(&self) -> Option<&str> {
        self.spec
            .as_ref()
            .and_then(|s| s.node_name.as_deref())
            .filter(|n| !n.is_empty())
    }

    fn pod_ip(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.pod_ip.as_deref())
            .unwrap_or("")
    }

    fn host_ip(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.host_ip.as_deref())
            .unwrap_or("")
    }
}

/// `true` when every `k=v` of `selector` is present in `labels`.
pub fn labels_match(labels: Option<&BTreeMap<String, String>>, selector: &BTreeMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}

/// Evaluate the field selectors a store understands on a pod snapshot.
/// Unknown fields never match.
pub fn fields_match(pod: &Pod, fields: &BTreeMap<String, String>) -> bool {
    fields.iter().all(|(field, want)| {
        let have = match field.as_str() {
            "metadata.name" => pod.metadata.name.as_deref().unwrap_or(""),
            "metadata.namespace" => pod.metadata.namespace.as_deref().unwrap_or(""),
            "spec.nodeName" => pod.node_name().unwrap_or(""),
            "status.phase" => pod.phase(),
            _ => return false,
        };
        have == want
    })
}
