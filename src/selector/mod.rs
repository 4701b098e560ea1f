//! Target selection.
//!
//! `Selector::select` resolves a `SelectorSpec` into pod snapshots:
//! 1. explicit `pods` are fetched by name, otherwise pods are listed by
//!    label and field selectors
//! 2. namespace, label, expression, annotation, phase and node filters
//! 3. the cluster-wide namespace policy
//!
//! `select_and_filter` then applies the mode to the result.

pub mod mode;
pub mod namespace;

use k8s_openapi::api::core::v1::Pod;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::{Result, SelectionError};
use crate::models::{LabelOperator, LabelRequirement, PodSelectorSpec, SelectorSpec};
use crate::store::{fields_match, labels_match, ClusterStore, PodExt, PodListFilter};

pub use self::mode::filter_by_mode;
pub use self::namespace::NamespacePolicy;

/// Split `["a", "!b"]` into included and excluded sets.
fn split_negations(entries: &[String]) -> (HashSet<&str>, HashSet<&str>) {
    let mut include = HashSet::new();
    let mut exclude = HashSet::new();
    for e in entries {
        let e = e.trim();
        match e.strip_prefix('!') {
            Some(rest) => {
                exclude.insert(rest);
            }
            None => {
                include.insert(e);
            }
        }
    }
    (include, exclude)
}

fn include_exclude_match(value: &str, include: &HashSet<&str>, exclude: &HashSet<&str>) -> bool {
    if exclude.contains(value) {
        return false;
    }
    include.is_empty() || include.contains(value)
}

fn requirement_match(labels: Option<&BTreeMap<String, String>>, req: &LabelRequirement) -> bool {
    let value = labels.and_then(|l| l.get(&req.key));
    match req.operator {
        LabelOperator::In => value.map_or(false, |v| req.values.contains(v)),
        LabelOperator::NotIn => value.map_or(true, |v| !req.values.contains(v)),
        LabelOperator::Exists => value.is_some(),
        LabelOperator::DoesNotExist => value.is_none(),
    }
}

/// Every `k=v` annotation selector must be present on the pod.
fn annotations_match(pod: &Pod, selectors: &BTreeMap<String, String>) -> bool {
    labels_match(pod.annotations(), selectors)
}

pub struct Selector {
    store: Arc<dyn ClusterStore>,
    policy: NamespacePolicy,
    cluster_scoped: bool,
    target_namespace: String,
    rng: Mutex<StdRng>,
}

impl Selector {
    pub fn new(store: Arc<dyn ClusterStore>, policy: NamespacePolicy) -> Self {
        Selector {
            store,
            policy,
            cluster_scoped: true,
            target_namespace: String::new(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Restrict selection to one namespace.
    pub fn with_scope(mut self, cluster_scoped: bool, target_namespace: impl Into<String>) -> Self {
        self.cluster_scoped = cluster_scoped;
        self.target_namespace = target_namespace.into();
        self
    }

    /// Deterministic sampling for tests.
    pub fn with_seed(self, seed: u64) -> Self {
        Selector {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn policy(&self) -> &NamespacePolicy {
        &self.policy
    }

    fn in_scope(&self, namespace: &str) -> bool {
        self.cluster_scoped || namespace == self.target_namespace
    }

    /// Resolve a selector into pods. An empty result is `NoPodSelected`.
    pub async fn select(&self, spec: &SelectorSpec) -> Result<Vec<Pod>> {
        let candidates = if !spec.pods.is_empty() {
            self.fetch_named(spec).await?
        } else {
            self.list_candidates(spec).await?
        };

        let (ns_include, ns_exclude) = split_negations(&spec.namespaces);
        let (phase_include, phase_exclude) = split_negations(&spec.pod_phase_selectors);
        let nodes = self.resolve_nodes(spec).await?;

        let pods: Vec<Pod> = candidates
            .into_iter()
            .filter(|p| include_exclude_match(&p.key().namespace, &ns_include, &ns_exclude))
            .filter(|p| labels_match(p.labels(), &spec.label_selectors))
            .filter(|p| fields_match(p, &spec.field_selectors))
            .filter(|p| {
                spec.expression_selectors
                    .iter()
                    .all(|req| requirement_match(p.labels(), req))
            })
            .filter(|p| annotations_match(p, &spec.annotation_selectors))
            .filter(|p| include_exclude_match(p.phase(), &phase_include, &phase_exclude))
            .filter(|p| match &nodes {
                Some(names) => p.node_name().map_or(false, |n| names.contains(n)),
                None => true,
            })
            .filter(|p| {
                let ns = p.key().namespace;
                let allowed = self.policy.is_allowed(&ns);
                if !allowed {
                    log::debug!("[Selector] Namespace {} rejected by policy", ns);
                }
                allowed
            })
            .collect();

        if pods.is_empty() {
            return Err(SelectionError::NoPodSelected.into());
        }
        log::debug!("[Selector] Selected {} pods", pods.len());
        Ok(pods)
    }

    /// Select, then reduce by mode.
    pub async fn select_and_filter(&self, spec: &PodSelectorSpec) -> Result<Vec<Pod>> {
        let pods = self.select(&spec.selector).await?;
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(filter_by_mode(pods, spec.mode, spec.value.as_deref(), &mut *rng)?)
    }

    async fn fetch_named(&self, spec: &SelectorSpec) -> Result<Vec<Pod>> {
        let mut pods = Vec::new();
        for (ns, names) in &spec.pods {
            if !self.in_scope(ns) {
                log::warn!(
                    "[Selector] Skipping pods in namespace {} outside of target namespace {}",
                    ns,
                    self.target_namespace
                );
                continue;
            }
            for name in names {
                let key = crate::models::ObjectKey::new(ns, name);
                match self.store.get_pod(&key).await {
                    Ok(pod) => pods.push(pod),
                    Err(e) if e.is_not_found() => {
                        log::warn!("[Selector] Pod {} not found, skipping", key);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(pods)
    }

    async fn list_candidates(&self, spec: &SelectorSpec) -> Result<Vec<Pod>> {
        let (include, _) = split_negations(&spec.namespaces);

        let namespaces: Vec<Option<String>> = if !self.cluster_scoped {
            if include.len() > 1 || include.iter().any(|ns| *ns != self.target_namespace) {
                let named = include.iter().find(|ns| **ns != self.target_namespace);
                return Err(SelectionError::NamespaceOutOfScope(
                    named.map(|s| s.to_string()).unwrap_or_default(),
                )
                .into());
            }
            vec![Some(self.target_namespace.clone())]
        } else if include.is_empty() {
            vec![None]
        } else {
            let mut sorted: Vec<&str> = include.into_iter().collect();
            sorted.sort_unstable();
            sorted.into_iter().map(|ns| Some(ns.to_string())).collect()
        };

        let mut pods = Vec::new();
        for namespace in namespaces {
            let filter = PodListFilter {
                namespace,
                labels: spec.label_selectors.clone(),
                fields: spec.field_selectors.clone(),
            };
            pods.extend(self.store.list_pods(&filter).await?);
        }
        Ok(pods)
    }

    /// Node names allowed by `nodes` and `nodeSelectors`, or `None` when
    /// neither restricts placement.
    async fn resolve_nodes(&self, spec: &SelectorSpec) -> Result<Option<HashSet<String>>> {
        if spec.nodes.is_empty() && spec.node_selectors.is_empty() {
            return Ok(None);
        }
        let mut names: HashSet<String> = spec.nodes.iter().cloned().collect();
        if !spec.node_selectors.is_empty() {
            for node in self.store.list_nodes(&spec.node_selectors).await? {
                if let Some(name) = node.metadata.name {
                    names.insert(name);
                }
            }
        }
        Ok(Some(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChaosError;
    use crate::models::PodMode;
    use crate::store::memory::fixtures;
    use crate::store::MemoryStore;

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_pod(
            fixtures::pod("default", "web-0")
                .label("app", "web")
                .annotation("team", "a")
                .node("node-0")
                .build(),
        );
        store.insert_pod(
            fixtures::pod("default", "web-1")
                .label("app", "web")
                .phase("Pending")
                .node("node-1")
                .build(),
        );
        store.insert_pod(
            fixtures::pod("default", "db-0")
                .label("app", "db")
                .node("node-1")
                .build(),
        );
        store.insert_pod(
            fixtures::pod("other", "web-2")
                .label("app", "web")
                .node("node-0")
                .build(),
        );
        store.insert_node(fixtures::labeled_node("node-0", "10.1.0.1", &[("zone", "a")]));
        store.insert_node(fixtures::labeled_node("node-1", "10.1.0.2", &[("zone", "b")]));
        store
    }

    fn selector(store: Arc<MemoryStore>) -> Selector {
        Selector::new(store, NamespacePolicy::default()).with_seed(1)
    }

    fn names(pods: &[Pod]) -> Vec<String> {
        let mut n: Vec<String> = pods.iter().map(|p| p.key().to_string()).collect();
        n.sort();
        n
    }

    #[tokio::test]
    async fn test_label_selection_across_namespaces() {
        let sel = selector(store());
        let mut spec = SelectorSpec::default();
        spec.label_selectors.insert("app".into(), "web".into());
        let pods = sel.select(&spec).await.unwrap();
        assert_eq!(names(&pods), vec!["default/web-0", "default/web-1", "other/web-2"]);
    }

    #[tokio::test]
    async fn test_namespace_negation_and_phase() {
        let sel = selector(store());
        let mut spec = SelectorSpec::default();
        spec.namespaces = vec!["!other".into()];
        spec.pod_phase_selectors = vec!["Running".into()];
        let pods = sel.select(&spec).await.unwrap();
        assert_eq!(names(&pods), vec!["default/db-0", "default/web-0"]);

        spec.pod_phase_selectors = vec!["!Running".into()];
        let pods = sel.select(&spec).await.unwrap();
        assert_eq!(names(&pods), vec!["default/web-1"]);
    }

    #[tokio::test]
    async fn test_expressions_annotations_nodes() {
        let sel = selector(store());
        let mut spec = SelectorSpec::default();
        spec.expression_selectors.push(LabelRequirement {
            key: "app".into(),
            operator: LabelOperator::NotIn,
            values: vec!["db".into()],
        });
        spec.node_selectors.insert("zone".into(), "a".into());
        let pods = sel.select(&spec).await.unwrap();
        assert_eq!(names(&pods), vec!["default/web-0", "other/web-2"]);

        spec.annotation_selectors.insert("team".into(), "a".into());
        let pods = sel.select(&spec).await.unwrap();
        assert_eq!(names(&pods), vec!["default/web-0"]);
    }

    #[tokio::test]
    async fn test_named_pods_skip_missing() {
        let sel = selector(store());
        let mut spec = SelectorSpec::default();
        spec.pods.insert(
            "default".into(),
            vec!["web-0".into(), "gone".into(), "db-0".into()],
        );
        spec.label_selectors.insert("app".into(), "web".into());
        let pods = sel.select(&spec).await.unwrap();
        assert_eq!(names(&pods), vec!["default/web-0"]);
    }

    #[tokio::test]
    async fn test_empty_selection_is_selection_error() {
        let sel = selector(store());
        let mut spec = SelectorSpec::default();
        spec.label_selectors.insert("app".into(), "cache".into());
        let err = sel.select(&spec).await.unwrap_err();
        assert!(matches!(err, ChaosError::Selection(SelectionError::NoPodSelected)));
    }

    #[tokio::test]
    async fn test_namespace_scoped_selector() {
        let sel = selector(store()).with_scope(false, "default");
        let mut spec = SelectorSpec::default();
        spec.label_selectors.insert("app".into(), "web".into());
        let pods = sel.select(&spec).await.unwrap();
        assert_eq!(names(&pods), vec!["default/web-0", "default/web-1"]);

        spec.namespaces = vec!["other".into()];
        let err = sel.select(&spec).await.unwrap_err();
        assert!(matches!(
            err,
            ChaosError::Selection(SelectionError::NamespaceOutOfScope(_))
        ));
    }

    #[tokio::test]
    async fn test_policy_filter() {
        let policy = NamespacePolicy::new("", "other").unwrap();
        let sel = Selector::new(store(), policy);
        let mut spec = SelectorSpec::default();
        spec.label_selectors.insert("app".into(), "web".into());
        let pods = sel.select(&spec).await.unwrap();
        assert_eq!(names(&pods), vec!["default/web-0", "default/web-1"]);
    }

    #[tokio::test]
    async fn test_seeded_select_and_filter_is_deterministic() {
        let spec = PodSelectorSpec {
            selector: SelectorSpec::default(),
            mode: PodMode::Fixed,
            value: Some("2".into()),
        };
        let a = selector(store()).select_and_filter(&spec).await.unwrap();
        let b = selector(store()).select_and_filter(&spec).await.unwrap();
        assert_eq!(names(&a), names(&b));
        assert_eq!(a.len(), 2);
    }
}
