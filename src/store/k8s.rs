//! `ClusterStore` backed by the Kubernetes API through kube-rs.
//!
//! Chaos resources are served as dynamic objects under
//! `chaos-mesh.org/v1alpha1`; spec and status are (de)serialized from the
//! object's free-form data. Status lives in a subresource, so an update is a
//! replace of the main resource followed by a replace of `/status`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use serde_json::json;
use std::collections::BTreeMap;

use super::{ClusterStore, PodExt, PodListFilter};
use crate::error::{ChaosError, Result, StoreError};
use crate::models::{ChaosKind, ChaosMeta, ChaosObject, ChaosSpec, ChaosStatus, ObjectKey};

pub const CHAOS_GROUP: &str = "chaos-mesh.org";
pub const CHAOS_VERSION: &str = "v1alpha1";

fn map_kube_err(kind: &str, key: &str, err: kube::Error) -> ChaosError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => ChaosError::not_found(kind, key),
        kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict(key.to_string()).into(),
        other => StoreError::Backend(other.to_string()).into(),
    }
}

fn backend(err: impl std::fmt::Display) -> ChaosError {
    StoreError::Backend(err.to_string()).into()
}

fn list_params(labels: &BTreeMap<String, String>, fields: &BTreeMap<String, String>) -> ListParams {
    let filter = PodListFilter {
        namespace: None,
        labels: labels.clone(),
        fields: fields.clone(),
    };
    let mut lp = ListParams::default();
    if !labels.is_empty() {
        lp = lp.labels(&filter.label_selector());
    }
    if !fields.is_empty() {
        lp = lp.fields(&filter.field_selector());
    }
    lp
}

pub struct KubeStore {
    client: kube::Client,
}

impl KubeStore {
    pub fn new(client: kube::Client) -> Self {
        KubeStore { client }
    }

    /// Connect with the ambient kubeconfig or in-cluster service account.
    pub async fn try_default() -> Result<Self> {
        let client = kube::Client::try_default().await.map_err(backend)?;
        Ok(Self::new(client))
    }

    fn resource(kind: ChaosKind) -> ApiResource {
        let gvk = GroupVersionKind::gvk(CHAOS_GROUP, CHAOS_VERSION, kind.as_str());
        ApiResource::from_gvk_with_plural(&gvk, kind.plural())
    }

    fn chaos_api(&self, kind: ChaosKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = Self::resource(kind);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn pod_api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn from_dynamic(kind: ChaosKind, obj: DynamicObject) -> Result<ChaosObject> {
        let spec_value = obj.data.get("spec").cloned().unwrap_or(serde_json::Value::Null);
        let spec: ChaosSpec = serde_json::from_value(spec_value).map_err(backend)?;
        let status: ChaosStatus = match obj.data.get("status") {
            Some(v) if !v.is_null() => serde_json::from_value(v.clone()).map_err(backend)?,
            _ => ChaosStatus::default(),
        };

        let meta = obj.metadata;
        Ok(ChaosObject {
            kind,
            metadata: ChaosMeta {
                namespace: meta.namespace.unwrap_or_default(),
                name: meta.name.unwrap_or_default(),
                uid: meta.uid.unwrap_or_default(),
                resource_version: meta.resource_version,
                annotations: meta.annotations.unwrap_or_default(),
                finalizers: meta.finalizers.unwrap_or_default().into(),
                deletion_timestamp: meta.deletion_timestamp.map(|t| t.0),
            },
            spec,
            status,
        })
    }

    fn to_dynamic(chaos: &ChaosObject) -> Result<DynamicObject> {
        let ar = Self::resource(chaos.kind);
        let mut obj = DynamicObject::new(&chaos.metadata.name, &ar).within(&chaos.metadata.namespace);
        obj.metadata.resource_version = chaos.metadata.resource_version.clone();
        obj.metadata.uid = Some(chaos.metadata.uid.clone()).filter(|u| !u.is_empty());
        obj.metadata.annotations = Some(chaos.metadata.annotations.clone());
        obj.metadata.finalizers = Some(chaos.metadata.finalizers.to_vec());
        obj.data = json!({
            "spec": serde_json::to_value(&chaos.spec).map_err(backend)?,
            "status": serde_json::to_value(&chaos.status).map_err(backend)?,
        });
        Ok(obj)
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_chaos(&self, kind: ChaosKind, key: &ObjectKey) -> Result<ChaosObject> {
        let obj = self
            .chaos_api(kind, Some(&key.namespace))
            .get(&key.name)
            .await
            .map_err(|e| map_kube_err(kind.as_str(), &key.to_string(), e))?;
        Self::from_dynamic(kind, obj)
    }

    async fn list_chaos(&self, kind: ChaosKind, namespace: Option<&str>) -> Result<Vec<ChaosObject>> {
        let list = self
            .chaos_api(kind, namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_err(kind.as_str(), namespace.unwrap_or(""), e))?;
        list.items
            .into_iter()
            .map(|obj| Self::from_dynamic(kind, obj))
            .collect()
    }

    async fn update_chaos(&self, chaos: &ChaosObject) -> Result<ChaosObject> {
        let key = chaos.key().to_string();
        let api = self.chaos_api(chaos.kind, Some(&chaos.metadata.namespace));
        let mut obj = Self::to_dynamic(chaos)?;
        let pp = PostParams::default();

        let replaced = api
            .replace(&chaos.metadata.name, &pp, &obj)
            .await
            .map_err(|e| map_kube_err(chaos.kind.as_str(), &key, e))?;

        // The object is gone once a deleted chaos drops its last finalizer.
        if chaos.is_deleted() && chaos.metadata.finalizers.is_empty() {
            return Self::from_dynamic(chaos.kind, replaced);
        }

        obj.metadata.resource_version = replaced.metadata.resource_version.clone();
        let body = serde_json::to_vec(&obj).map_err(backend)?;
        let updated = api
            .replace_status(&chaos.metadata.name, &pp, body)
            .await
            .map_err(|e| map_kube_err(chaos.kind.as_str(), &key, e))?;
        Self::from_dynamic(chaos.kind, updated)
    }

    async fn get_pod(&self, key: &ObjectKey) -> Result<Pod> {
        self.pod_api(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| map_kube_err("Pod", &key.to_string(), e))
    }

    async fn list_pods(&self, filter: &PodListFilter) -> Result<Vec<Pod>> {
        let api: Api<Pod> = match &filter.namespace {
            Some(ns) => self.pod_api(ns),
            None => Api::all(self.client.clone()),
        };
        let lp = list_params(&filter.labels, &filter.fields);
        let list = api
            .list(&lp)
            .await
            .map_err(|e| map_kube_err("Pod", filter.namespace.as_deref().unwrap_or(""), e))?;
        Ok(list.items)
    }

    async fn update_pod(&self, pod: &Pod) -> Result<Pod> {
        let key = pod.key();
        self.pod_api(&key.namespace)
            .replace(&key.name, &PostParams::default(), pod)
            .await
            .map_err(|e| map_kube_err("Pod", &key.to_string(), e))
    }

    async fn update_pod_status(&self, pod: &Pod) -> Result<Pod> {
        let key = pod.key();
        let body = serde_json::to_vec(pod).map_err(backend)?;
        self.pod_api(&key.namespace)
            .replace_status(&key.name, &PostParams::default(), body)
            .await
            .map_err(|e| map_kube_err("Pod", &key.to_string(), e))
    }

    async fn delete_pod(&self, key: &ObjectKey, grace_period_secs: i64) -> Result<()> {
        let dp = DeleteParams {
            grace_period_seconds: Some(u32::try_from(grace_period_secs.max(0)).unwrap_or(u32::MAX)),
            ..DeleteParams::default()
        };
        self.pod_api(&key.namespace)
            .delete(&key.name, &dp)
            .await
            .map_err(|e| map_kube_err("Pod", &key.to_string(), e))?;
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        Api::<Node>::all(self.client.clone())
            .get(name)
            .await
            .map_err(|e| map_kube_err("Node", name, e))
    }

    async fn list_nodes(&self, labels: &BTreeMap<String, String>) -> Result<Vec<Node>> {
        let lp = list_params(labels, &BTreeMap::new());
        let list = Api::<Node>::all(self.client.clone())
            .list(&lp)
            .await
            .map_err(|e| map_kube_err("Node", "", e))?;
        Ok(list.items)
    }

    async fn annotate_namespace(&self, namespace: &str, key: &str, value: Option<&str>) -> Result<()> {
        let patch = json!({ "metadata": { "annotations": { key: value } } });
        Api::<Namespace>::all(self.client.clone())
            .patch(namespace, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_err("Namespace", namespace, e))?;
        Ok(())
    }
}
