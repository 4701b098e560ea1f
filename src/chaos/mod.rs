//! Fault dispatchers.
//!
//! A `Dispatcher` turns one chaos object into a `Plan` (targets with their
//! finalizer keys, plus any ipsets every target must carry) and applies or
//! recovers the fault on one target at a time. The executor owns the fan-out
//! and the finalizer bookkeeping; dispatchers only talk to the cluster and
//! the node agents.

pub mod clock;
pub mod containerkill;
pub mod dnschaos;
pub mod iochaos;
pub mod ipset;
pub mod netem;
pub mod netutils;
pub mod partition;
pub mod podfailure;
pub mod podkill;
pub mod podnotready;
pub mod stress;
pub mod tbf;
pub mod timechaos;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;

use crate::actions::Action;
use crate::daemon::{ChaosDaemon, DaemonConnector};
use crate::dns::DnsClient;
use crate::error::{ChaosError, Result};
use crate::faultserver::FaultServerConnector;
use crate::models::{ChaosObject, ObjectKey};
use crate::orchestrator::finalizers::FinalizerKey;
use crate::pb::chaosdaemon::IpSet;
use crate::selector::Selector;
use crate::store::{ClusterStore, PodExt};

/// Image pod-failure swaps in; it never becomes ready.
pub const DEFAULT_POD_FAILURE_IMAGE: &str = "gcr.io/google-containers/pause:latest";

/// Default fault server port inside an injected pod.
pub const DEFAULT_FAULT_SERVER_PORT: u16 = 65534;

/// Knobs the dispatchers read from the controller configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub fault_server_port: u16,
    pub dns_server_address: String,
    pub pod_failure_image: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        DispatchSettings {
            fault_server_port: DEFAULT_FAULT_SERVER_PORT,
            dns_server_address: String::new(),
            pod_failure_image: DEFAULT_POD_FAILURE_IMAGE.to_string(),
        }
    }
}

/// Everything a dispatcher may talk to.
pub struct ChaosContext {
    pub store: Arc<dyn ClusterStore>,
    pub selector: Arc<Selector>,
    pub daemons: Arc<dyn DaemonConnector>,
    pub fault_servers: Arc<dyn FaultServerConnector>,
    pub dns: Arc<dyn DnsClient>,
    pub settings: DispatchSettings,
}

impl ChaosContext {
    pub async fn daemon(&self, pod: &Pod) -> Result<Arc<dyn ChaosDaemon>> {
        self.daemons.connect(pod).await
    }
}

/// One pod a fault is applied to, with the finalizer key recording it.
#[derive(Debug, Clone)]
pub struct Target {
    pub pod: Pod,
    pub key: FinalizerKey,
}

impl Target {
    pub fn plain(pod: Pod) -> Self {
        let key = FinalizerKey::plain(pod.key());
        Target { pod, key }
    }

    pub fn new(pod: Pod, key: FinalizerKey) -> Self {
        Target { pod, key }
    }

    pub fn pod_key(&self) -> &ObjectKey {
        &self.key.pod
    }
}

/// Resolved work for one apply.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub targets: Vec<Target>,
    /// Flushed onto every distinct target pod before any target is applied.
    pub ipsets: Vec<IpSet>,
}

impl Plan {
    pub fn of(targets: Vec<Target>) -> Self {
        Plan {
            targets,
            ipsets: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Finalizer keys carry a `source`/`target` role prefix.
    fn directional(&self) -> bool {
        false
    }

    /// Select targets. The default takes the primary selector and mode.
    async fn plan(&self, ctx: &ChaosContext, chaos: &ChaosObject) -> Result<Plan> {
        let pods = ctx.selector.select_and_filter(&chaos.spec.pod_selector()).await?;
        Ok(Plan::of(pods.into_iter().map(Target::plain).collect()))
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()>;

    async fn recover(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()>;
}

/// Dispatcher for an action.
pub fn dispatcher_for(action: &Action) -> Arc<dyn Dispatcher> {
    match action {
        Action::PodKill(_) => Arc::new(podkill::PodKill),
        Action::PodFailure => Arc::new(podfailure::PodFailure),
        Action::ContainerKill => Arc::new(containerkill::ContainerKill),
        Action::PodNotReady => Arc::new(podnotready::PodNotReady),
        Action::Netem(_)
        | Action::Delay(_)
        | Action::Loss(_)
        | Action::Duplicate(_)
        | Action::Corrupt(_) => Arc::new(netem::NetemChaos),
        Action::Bandwidth(_) => Arc::new(tbf::TbfChaos),
        Action::Partition(_) => Arc::new(partition::Partition),
        Action::IoDelay(_) | Action::IoErrno(_) | Action::IoMixed(_) => Arc::new(iochaos::IoChaos),
        Action::Stress(_) => Arc::new(stress::StressChaos),
        Action::TimeOffset(_) => Arc::new(timechaos::TimeChaos),
        Action::DnsError(_) | Action::DnsRandom(_) => Arc::new(dnschaos::DnsChaos),
    }
}

/// Error for an action handed to the wrong dispatcher.
pub(crate) fn wrong_action(dispatcher: &str, action: &Action) -> ChaosError {
    ChaosError::Inject(format!(
        "{} dispatcher cannot handle action {}",
        dispatcher,
        action.name()
    ))
}

/// Container ids to act on: the first container, or those named in
/// `names`. Fails when the pod reports no container state.
pub fn container_ids(pod: &Pod, names: &[String]) -> Result<Vec<String>> {
    let key = pod.key();
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ChaosError::Inject(format!(
                "{} {} can't get the state of container",
                key.namespace, key.name
            ))
        })?;

    let ids: Vec<String> = if names.is_empty() {
        statuses
            .iter()
            .take(1)
            .filter_map(|s| s.container_id.clone())
            .collect()
    } else {
        statuses
            .iter()
            .filter(|s| names.contains(&s.name))
            .filter_map(|s| s.container_id.clone())
            .collect()
    };

    if ids.is_empty() {
        return Err(ChaosError::Inject(format!(
            "{} {} can't get the state of container",
            key.namespace, key.name
        )));
    }
    Ok(ids)
}

/// Network faults act on the pod's shared network namespace through a
/// single container.
pub fn first_container_id(pod: &Pod, names: &[String]) -> Result<String> {
    let mut ids = container_ids(pod, names)?;
    Ok(ids.swap_remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::fixtures;

    #[test]
    fn test_container_ids() {
        let pod = fixtures::pod("default", "p")
            .container("app", "nginx", "docker://a")
            .container("side", "envoy", "docker://b")
            .build();
        assert_eq!(container_ids(&pod, &[]).unwrap(), vec!["docker://a"]);
        assert_eq!(
            container_ids(&pod, &["side".to_string()]).unwrap(),
            vec!["docker://b"]
        );
        assert!(container_ids(&pod, &["missing".to_string()]).is_err());
    }

    #[test]
    fn test_no_container_state() {
        let pod = fixtures::pod("default", "p").build();
        let err = container_ids(&pod, &[]).unwrap_err();
        assert_eq!(err.to_string(), "default p can't get the state of container");
    }

    #[test]
    fn test_dispatcher_routing() {
        use crate::actions::{NetworkParams, PartitionParams};
        assert_eq!(dispatcher_for(&Action::PodFailure).name(), "pod-failure");
        assert_eq!(
            dispatcher_for(&Action::Loss(NetworkParams::default())).name(),
            "netem"
        );
        let partition = dispatcher_for(&Action::Partition(PartitionParams::default()));
        assert!(partition.directional());
    }
}
