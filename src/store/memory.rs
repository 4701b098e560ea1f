//! In-memory `ClusterStore`.
//!
//! Resource versions come from one monotonically increasing counter. Chaos
//! updates are compare-and-swap on that version; pending conflicts can be
//! injected to exercise the retry path. A chaos object marked deleted
//! disappears once its finalizer list is empty, as on a real API server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{fields_match, labels_match, ClusterStore, PodExt, PodListFilter};
use crate::error::{ChaosError, Result, StoreError};
use crate::models::{ChaosKind, ChaosObject, ObjectKey};

#[derive(Default)]
struct Inner {
    chaos: BTreeMap<(ChaosKind, ObjectKey), ChaosObject>,
    pods: BTreeMap<ObjectKey, Pod>,
    nodes: BTreeMap<String, Node>,
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
    version: u64,
    pending_conflicts: usize,
    deleted_pods: Vec<ObjectKey>,
    chaos_writes: usize,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a chaos object, assigning uid and resource version.
    pub fn insert_chaos(&self, mut chaos: ChaosObject) -> ChaosObject {
        let mut inner = self.lock();
        if chaos.metadata.uid.is_empty() {
            chaos.metadata.uid = uuid::Uuid::new_v4().to_string();
        }
        chaos.metadata.resource_version = Some(inner.next_version());
        inner
            .chaos
            .insert((chaos.kind, chaos.key()), chaos.clone());
        chaos
    }

    /// Peek at a stored chaos object.
    pub fn chaos(&self, kind: ChaosKind, key: &ObjectKey) -> Option<ChaosObject> {
        self.lock().chaos.get(&(kind, key.clone())).cloned()
    }

    /// Edit a stored chaos object outside the reconciler (a user `kubectl edit`).
    pub fn edit_chaos<F>(&self, kind: ChaosKind, key: &ObjectKey, edit: F) -> Result<ChaosObject>
    where
        F: FnOnce(&mut ChaosObject),
    {
        let mut inner = self.lock();
        let version = inner.next_version();
        let chaos = inner
            .chaos
            .get_mut(&(kind, key.clone()))
            .ok_or_else(|| ChaosError::not_found(kind.as_str(), key.to_string()))?;
        edit(chaos);
        chaos.metadata.resource_version = Some(version);
        Ok(chaos.clone())
    }

    /// Set the deletion marker. Objects without finalizers vanish at once.
    pub fn mark_chaos_deleted(&self, kind: ChaosKind, key: &ObjectKey, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.lock();
        let version = inner.next_version();
        let map_key = (kind, key.clone());
        let chaos = inner
            .chaos
            .get_mut(&map_key)
            .ok_or_else(|| ChaosError::not_found(kind.as_str(), key.to_string()))?;
        chaos.metadata.deletion_timestamp.get_or_insert(at);
        chaos.metadata.resource_version = Some(version);
        if chaos.metadata.finalizers.is_empty() {
            inner.chaos.remove(&map_key);
        }
        Ok(())
    }

    /// The next `n` chaos updates fail with a conflict, each bumping the
    /// stored version as if a concurrent writer won.
    pub fn inject_conflicts(&self, n: usize) {
        self.lock().pending_conflicts = n;
    }

    /// Successful chaos writes so far.
    pub fn chaos_writes(&self) -> usize {
        self.lock().chaos_writes
    }

    pub fn insert_pod(&self, mut pod: Pod) -> Pod {
        let mut inner = self.lock();
        if pod.metadata.uid.is_none() {
            pod.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        pod.metadata.resource_version = Some(inner.next_version());
        inner.pods.insert(pod.key(), pod.clone());
        pod
    }

    pub fn pod(&self, key: &ObjectKey) -> Option<Pod> {
        self.lock().pods.get(key).cloned()
    }

    pub fn remove_pod(&self, key: &ObjectKey) -> Option<Pod> {
        self.lock().pods.remove(key)
    }

    /// Pods removed through `delete_pod`, in order.
    pub fn deleted_pods(&self) -> Vec<ObjectKey> {
        self.lock().deleted_pods.clone()
    }

    pub fn insert_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.lock().nodes.insert(name, node);
    }

    pub fn namespace_annotations(&self, namespace: &str) -> BTreeMap<String, String> {
        self.lock()
            .namespaces
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_chaos(&self, kind: ChaosKind, key: &ObjectKey) -> Result<ChaosObject> {
        self.chaos(kind, key)
            .ok_or_else(|| ChaosError::not_found(kind.as_str(), key.to_string()))
    }

    async fn list_chaos(&self, kind: ChaosKind, namespace: Option<&str>) -> Result<Vec<ChaosObject>> {
        Ok(self
            .lock()
            .chaos
            .iter()
            .filter(|((k, key), _)| *k == kind && namespace.map_or(true, |ns| key.namespace == ns))
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn update_chaos(&self, chaos: &ChaosObject) -> Result<ChaosObject> {
        let mut inner = self.lock();
        let map_key = (chaos.kind, chaos.key());
        let stored_version = inner
            .chaos
            .get(&map_key)
            .ok_or_else(|| ChaosError::not_found(chaos.kind.as_str(), chaos.key().to_string()))?
            .metadata
            .resource_version
            .clone();

        if inner.pending_conflicts > 0 {
            inner.pending_conflicts -= 1;
            let version = inner.next_version();
            if let Some(stored) = inner.chaos.get_mut(&map_key) {
                stored.metadata.resource_version = Some(version);
            }
            return Err(StoreError::Conflict(chaos.key().to_string()).into());
        }
        if stored_version != chaos.metadata.resource_version {
            return Err(StoreError::Conflict(chaos.key().to_string()).into());
        }

        let mut updated = chaos.clone();
        updated.metadata.resource_version = Some(inner.next_version());
        inner.chaos_writes += 1;
        if updated.is_deleted() && updated.metadata.finalizers.is_empty() {
            inner.chaos.remove(&map_key);
        } else {
            inner.chaos.insert(map_key, updated.clone());
        }
        Ok(updated)
    }

    async fn get_pod(&self, key: &ObjectKey) -> Result<Pod> {
        self.pod(key)
            .ok_or_else(|| ChaosError::not_found("Pod", key.to_string()))
    }

    async fn list_pods(&self, filter: &PodListFilter) -> Result<Vec<Pod>> {
        Ok(self
            .lock()
            .pods
            .iter()
            .filter(|(key, _)| {
                filter
                    .namespace
                    .as_deref()
                    .map_or(true, |ns| key.namespace == ns)
            })
            .filter(|(_, pod)| labels_match(pod.labels(), &filter.labels))
            .filter(|(_, pod)| fields_match(pod, &filter.fields))
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn update_pod(&self, pod: &Pod) -> Result<Pod> {
        let mut inner = self.lock();
        let key = pod.key();
        if !inner.pods.contains_key(&key) {
            return Err(ChaosError::not_found("Pod", key.to_string()));
        }
        let mut updated = pod.clone();
        updated.metadata.resource_version = Some(inner.next_version());
        inner.pods.insert(key, updated.clone());
        Ok(updated)
    }

    async fn update_pod_status(&self, pod: &Pod) -> Result<Pod> {
        let mut inner = self.lock();
        let key = pod.key();
        let version = inner.next_version();
        let stored = inner
            .pods
            .get_mut(&key)
            .ok_or_else(|| ChaosError::not_found("Pod", key.to_string()))?;
        stored.status = pod.status.clone();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn delete_pod(&self, key: &ObjectKey, _grace_period_secs: i64) -> Result<()> {
        let mut inner = self.lock();
        if inner.pods.remove(key).is_none() {
            return Err(ChaosError::not_found("Pod", key.to_string()));
        }
        inner.deleted_pods.push(key.clone());
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        self.lock()
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| ChaosError::not_found("Node", name))
    }

    async fn list_nodes(&self, labels: &BTreeMap<String, String>) -> Result<Vec<Node>> {
        Ok(self
            .lock()
            .nodes
            .values()
            .filter(|n| labels_match(n.metadata.labels.as_ref(), labels))
            .cloned()
            .collect())
    }

    async fn annotate_namespace(&self, namespace: &str, key: &str, value: Option<&str>) -> Result<()> {
        let mut inner = self.lock();
        let annotations = inner.namespaces.entry(namespace.to_string()).or_default();
        match value {
            Some(v) => {
                annotations.insert(key.to_string(), v.to_string());
            }
            None => {
                annotations.remove(key);
            }
        }
        Ok(())
    }
}

/// Builders for pod and node snapshots.
pub mod fixtures {
    use k8s_openapi::api::core::v1::{
        Container, ContainerStatus, Node, NodeAddress, NodeStatus, Pod, PodCondition,
        PodReadinessGate, PodSpec, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    pub struct PodFixture {
        pod: Pod,
    }

    /// A running pod with no containers yet; add them with `container`.
    pub fn pod(namespace: &str, name: &str) -> PodFixture {
        PodFixture {
            pod: Pod {
                metadata: ObjectMeta {
                    namespace: Some(namespace.to_string()),
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                spec: Some(PodSpec::default()),
                status: Some(PodStatus {
                    phase: Some("Running".to_string()),
                    ..Default::default()
                }),
            },
        }
    }

    impl PodFixture {
        pub fn uid(mut self, uid: &str) -> Self {
            self.pod.metadata.uid = Some(uid.to_string());
            self
        }

        pub fn label(mut self, key: &str, value: &str) -> Self {
            self.pod
                .metadata
                .labels
                .get_or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.to_string());
            self
        }

        pub fn annotation(mut self, key: &str, value: &str) -> Self {
            self.pod
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.to_string());
            self
        }

        pub fn phase(mut self, phase: &str) -> Self {
            if let Some(status) = self.pod.status.as_mut() {
                status.phase = Some(phase.to_string());
            }
            self
        }

        pub fn node(mut self, node: &str) -> Self {
            if let Some(spec) = self.pod.spec.as_mut() {
                spec.node_name = Some(node.to_string());
            }
            self
        }

        pub fn ip(mut self, ip: &str) -> Self {
            if let Some(status) = self.pod.status.as_mut() {
                status.pod_ip = Some(ip.to_string());
            }
            self
        }

        pub fn host_ip(mut self, ip: &str) -> Self {
            if let Some(status) = self.pod.status.as_mut() {
                status.host_ip = Some(ip.to_string());
            }
            self
        }

        /// A container with a matching running status carrying `container_id`.
        pub fn container(mut self, name: &str, image: &str, container_id: &str) -> Self {
            if let Some(spec) = self.pod.spec.as_mut() {
                spec.containers.push(Container {
                    name: name.to_string(),
                    image: Some(image.to_string()),
                    ..Default::default()
                });
            }
            if let Some(status) = self.pod.status.as_mut() {
                status
                    .container_statuses
                    .get_or_insert_with(Vec::new)
                    .push(ContainerStatus {
                        name: name.to_string(),
                        image: image.to_string(),
                        container_id: Some(container_id.to_string()),
                        ready: true,
                        ..Default::default()
                    });
            }
            self
        }

        pub fn readiness_gate(mut self, condition_type: &str) -> Self {
            if let Some(spec) = self.pod.spec.as_mut() {
                spec.readiness_gates
                    .get_or_insert_with(Vec::new)
                    .push(PodReadinessGate {
                        condition_type: condition_type.to_string(),
                    });
            }
            self
        }

        pub fn condition(mut self, condition_type: &str, status: &str) -> Self {
            if let Some(st) = self.pod.status.as_mut() {
                st.conditions.get_or_insert_with(Vec::new).push(PodCondition {
                    type_: condition_type.to_string(),
                    status: status.to_string(),
                    ..Default::default()
                });
            }
            self
        }

        pub fn build(self) -> Pod {
            self.pod
        }
    }

    /// A node publishing one internal address.
    pub fn node(name: &str, address: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: None,
            status: Some(NodeStatus {
                addresses: Some(vec![NodeAddress {
                    type_: "InternalIP".to_string(),
                    address: address.to_string(),
                }]),
                ..Default::default()
            }),
        }
    }

    pub fn labeled_node(name: &str, address: &str, labels: &[(&str, &str)]) -> Node {
        let mut n = node(name, address);
        n.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, PodKillParams};
    use crate::models::ChaosSpec;

    fn chaos() -> ChaosObject {
        ChaosObject::new(
            ChaosKind::PodChaos,
            "default",
            "p",
            ChaosSpec::new(Action::PodKill(PodKillParams::default())),
        )
    }

    #[tokio::test]
    async fn test_cas_conflict_on_stale_version() {
        let store = MemoryStore::new();
        let stored = store.insert_chaos(chaos());
        let key = stored.key();

        let mut first = store.get_chaos(ChaosKind::PodChaos, &key).await.unwrap();
        let stale = first.clone();
        first.status.failed_message = Some("x".into());
        store.update_chaos(&first).await.unwrap();

        let err = store.update_chaos(&stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.chaos_writes(), 1);
    }

    #[tokio::test]
    async fn test_injected_conflicts() {
        let store = MemoryStore::new();
        let stored = store.insert_chaos(chaos());
        store.inject_conflicts(2);

        assert!(store.update_chaos(&stored).await.unwrap_err().is_conflict());
        let fresh = store.get_chaos(ChaosKind::PodChaos, &stored.key()).await.unwrap();
        assert!(store.update_chaos(&fresh).await.unwrap_err().is_conflict());
        let fresh = store.get_chaos(ChaosKind::PodChaos, &stored.key()).await.unwrap();
        assert!(store.update_chaos(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_deleted_chaos_vanishes_without_finalizers() {
        let store = MemoryStore::new();
        let mut c = chaos();
        c.metadata.finalizers.insert("default/p0");
        let stored = store.insert_chaos(c);
        let key = stored.key();

        store
            .mark_chaos_deleted(ChaosKind::PodChaos, &key, Utc::now())
            .unwrap();
        let mut fetched = store.get_chaos(ChaosKind::PodChaos, &key).await.unwrap();
        assert!(fetched.is_deleted());

        fetched.metadata.finalizers.clear();
        store.update_chaos(&fetched).await.unwrap();
        assert!(store
            .get_chaos(ChaosKind::PodChaos, &key)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_pod_listing_and_delete() {
        let store = MemoryStore::new();
        store.insert_pod(fixtures::pod("default", "a").label("app", "web").build());
        store.insert_pod(fixtures::pod("default", "b").label("app", "db").build());
        store.insert_pod(fixtures::pod("other", "c").label("app", "web").build());

        let mut filter = PodListFilter::default();
        filter.labels.insert("app".into(), "web".into());
        assert_eq!(store.list_pods(&filter).await.unwrap().len(), 2);
        filter.namespace = Some("default".into());
        assert_eq!(store.list_pods(&filter).await.unwrap().len(), 1);

        let key = ObjectKey::new("default", "a");
        store.delete_pod(&key, 0).await.unwrap();
        assert!(store.delete_pod(&key, 0).await.unwrap_err().is_not_found());
        assert_eq!(store.deleted_pods(), vec![key]);
    }

    #[tokio::test]
    async fn test_namespace_annotations() {
        let store = MemoryStore::new();
        store
            .annotate_namespace("default", "k", Some("v"))
            .await
            .unwrap();
        assert_eq!(store.namespace_annotations("default").get("k").unwrap(), "v");
        store.annotate_namespace("default", "k", None).await.unwrap();
        assert!(store.namespace_annotations("default").is_empty());
    }
}
