//! Shared wiring for the integration suites: an in-memory cluster, a
//! recording daemon, and the reconcile stack on top of them.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;

use chaos_mesh::chaos::{ChaosContext, DispatchSettings};
use chaos_mesh::daemon::{RecordingConnector, RecordingDaemon};
use chaos_mesh::dns::RecordingDnsClient;
use chaos_mesh::faultserver::LocalFaultServerConnector;
use chaos_mesh::actions::Action;
use chaos_mesh::models::{ChaosKind, ChaosObject, ChaosSpec, ObjectKey, PodMode, SelectorSpec};
use chaos_mesh::orchestrator::{ChaosReconciler, Executor, Reconciled, StateMachine};
use chaos_mesh::selector::{NamespacePolicy, Selector};
use chaos_mesh::store::memory::fixtures;
use chaos_mesh::store::MemoryStore;
use chaos_mesh::LogEventRecorder;

pub const DNS_SERVER: &str = "10.96.0.53";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub daemon: Arc<RecordingDaemon>,
    pub connector: Arc<RecordingConnector>,
    pub faults: Arc<LocalFaultServerConnector>,
    pub dns: Arc<RecordingDnsClient>,
    pub events: Arc<LogEventRecorder>,
    pub machine: StateMachine,
    pub reconciler: ChaosReconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(NamespacePolicy::default())
    }

    pub fn with_policy(policy: NamespacePolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let daemon = Arc::new(RecordingDaemon::new());
        let connector = Arc::new(RecordingConnector::new(Arc::clone(&daemon)));
        let faults = Arc::new(LocalFaultServerConnector::new());
        let dns = Arc::new(RecordingDnsClient::new());
        let events = Arc::new(LogEventRecorder::default());

        let selector = Selector::new(store.clone(), policy).with_seed(7);
        let ctx = ChaosContext {
            store: store.clone(),
            selector: Arc::new(selector),
            daemons: connector.clone(),
            fault_servers: faults.clone(),
            dns: dns.clone(),
            settings: DispatchSettings {
                dns_server_address: DNS_SERVER.to_string(),
                ..Default::default()
            },
        };
        let machine = StateMachine::new(Executor::new(Arc::new(ctx)), events.clone());

        Harness {
            store,
            daemon,
            connector,
            faults,
            dns,
            events,
            reconciler: ChaosReconciler::new(machine.clone()),
            machine,
        }
    }

    /// A scheduled pod labelled `app=web` with one container `docker://<name>`.
    pub fn add_pod(&self, namespace: &str, name: &str, ip: &str) -> Pod {
        self.store.insert_pod(
            fixtures::pod(namespace, name)
                .label("app", "web")
                .node("node-0")
                .ip(ip)
                .container("app", "nginx", &container_of(name))
                .build(),
        )
    }

    pub fn create(&self, chaos: ChaosObject) -> ChaosObject {
        self.store.insert_chaos(chaos)
    }

    pub async fn reconcile(&self, chaos: &ChaosObject, now: DateTime<Utc>) -> Reconciled {
        self.try_reconcile(chaos, now).await.expect("reconcile")
    }

    pub async fn try_reconcile(
        &self,
        chaos: &ChaosObject,
        now: DateTime<Utc>,
    ) -> chaos_mesh::Result<Reconciled> {
        self.reconciler.reconcile(chaos.kind, &chaos.key(), now).await
    }

    pub fn stored(&self, chaos: &ChaosObject) -> Option<ChaosObject> {
        self.store.chaos(chaos.kind, &chaos.key())
    }

    pub fn delete(&self, chaos: &ChaosObject, now: DateTime<Utc>) {
        self.store
            .mark_chaos_deleted(chaos.kind, &chaos.key(), now)
            .expect("mark deleted");
    }

    pub fn annotate(&self, chaos: &ChaosObject, key: &str, value: &str) {
        self.store
            .edit_chaos(chaos.kind, &chaos.key(), |c| {
                c.metadata.annotations.insert(key.to_string(), value.to_string());
            })
            .expect("edit");
    }

    pub fn set_paused(&self, chaos: &ChaosObject, paused: bool) {
        self.store
            .edit_chaos(chaos.kind, &chaos.key(), |c| {
                if paused {
                    c.metadata
                        .annotations
                        .insert(chaos_mesh::models::ANNOTATION_PAUSE.to_string(), "true".to_string());
                } else {
                    c.metadata.annotations.remove(chaos_mesh::models::ANNOTATION_PAUSE);
                }
            })
            .expect("edit");
    }
}

pub fn container_of(pod: &str) -> String {
    format!("docker://{}", pod)
}

pub fn key(namespace: &str, name: &str) -> ObjectKey {
    ObjectKey::new(namespace, name)
}

/// Selector matching every `app=web` pod.
pub fn web_selector() -> SelectorSpec {
    let mut selector = SelectorSpec::default();
    selector.label_selectors.insert("app".to_string(), "web".to_string());
    selector
}

/// A chaos object over `app=web` pods in `mode`.
pub fn chaos(kind: ChaosKind, name: &str, action: Action, mode: PodMode) -> ChaosObject {
    let mut spec = ChaosSpec::new(action);
    spec.selector = web_selector();
    spec.mode = mode;
    ChaosObject::new(kind, "default", name, spec)
}

/// A fixed instant on 2020-12-07.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 12, 7, h, m, 0).unwrap()
}
