//! Fan-out executor: apply or recover one chaos object on every target.
//!
//! Finalizer keys are inserted and checkpointed before any target is
//! touched, so a crash mid-apply leaves a recoverable record. Targets run as
//! sibling tasks that never cancel each other; the executor waits for all of
//! them before it writes pod records.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::chaos::{dispatcher_for, first_container_id, ChaosContext, Dispatcher, Plan, Target};
use crate::error::{ChaosError, MultiError, Result};
use crate::models::{ChaosObject, ObjectKey, PodRecord, StressInstance};
use crate::orchestrator::checkpoint;
use crate::orchestrator::finalizers::FinalizerKey;
use crate::pb::chaosdaemon::IpSet;
use crate::store::PodExt;

/// Result of one target's task.
struct Outcome {
    index: usize,
    target: Target,
    result: Result<()>,
}

#[derive(Clone)]
pub struct Executor {
    ctx: Arc<ChaosContext>,
}

impl Executor {
    pub fn new(ctx: Arc<ChaosContext>) -> Self {
        Executor { ctx }
    }

    pub fn context(&self) -> &Arc<ChaosContext> {
        &self.ctx
    }

    /// Inject the fault on every selected target.
    ///
    /// A target whose key is already present and whose last record carries
    /// no failure message is skipped. The first per-target error is returned
    /// after every sibling finished; finalizers of failed targets stay.
    pub async fn apply(&self, chaos: &mut ChaosObject) -> Result<()> {
        let dispatcher = dispatcher_for(&chaos.spec.action);
        let Plan { targets, ipsets } = dispatcher.plan(&self.ctx, chaos).await?;

        let (pending, injected): (Vec<Target>, Vec<Target>) = targets
            .into_iter()
            .partition(|t| !is_injected(chaos, t));
        if !injected.is_empty() {
            log::info!(
                "[Executor] {}: {} targets already injected, skipping",
                chaos.key(),
                injected.len()
            );
        }

        let mut inserted = false;
        for target in &pending {
            inserted |= chaos.metadata.finalizers.insert(target.key.to_string());
        }
        if inserted {
            checkpoint::persist(&*self.ctx.store, chaos).await?;
        }

        log::info!(
            "[Executor] Applying {} on {} targets of {}",
            dispatcher.name(),
            pending.len(),
            chaos.key()
        );

        let snapshot = Arc::new(chaos.clone());
        let ipsets = Arc::new(ipsets);
        let mut tasks = JoinSet::new();
        for (index, target) in pending.into_iter().enumerate() {
            let ctx = Arc::clone(&self.ctx);
            let dispatcher = Arc::clone(&dispatcher);
            let snapshot = Arc::clone(&snapshot);
            let ipsets = Arc::clone(&ipsets);
            tasks.spawn(async move {
                let result = apply_one(&ctx, &*dispatcher, &snapshot, &ipsets, &target).await;
                Outcome {
                    index,
                    target,
                    result,
                }
            });
        }
        let outcomes = join_all(tasks).await?;

        let action = chaos.spec.action.name();
        let mut records: Vec<PodRecord> = injected
            .iter()
            .map(|t| pod_record(&t.pod, action, ""))
            .collect();
        let mut errors = MultiError::new();
        for Outcome { target, result, .. } in outcomes {
            match result {
                Ok(()) => {
                    records.push(pod_record(&target.pod, action, ""));
                    if let Some(instance) = &target.key.instance {
                        chaos.status.instances.insert(
                            target.pod_key().to_string(),
                            StressInstance {
                                uid: instance.clone(),
                                start_time: Utc::now(),
                            },
                        );
                    }
                }
                Err(e) => {
                    log::error!("[Executor] Apply on {} failed: {}", target.key, e);
                    records.push(pod_record(&target.pod, action, &e.to_string()));
                    errors.push(e);
                }
            }
        }
        chaos.status.pod_records = records;

        match errors.into_first() {
            None => Ok(()),
            Some(first) => Err(first),
        }
    }

    /// Recover every target named by the finalizer set.
    ///
    /// Keys whose pod is gone are dropped; keys whose recovery fails stay
    /// for the next attempt and their errors are joined.
    pub async fn recover(&self, chaos: &mut ChaosObject) -> Result<()> {
        if chaos.is_deleted() && chaos.is_forced_cleanup() {
            log::warn!(
                "[Executor] Forced cleanup of {}: dropping {} finalizers without recovery",
                chaos.key(),
                chaos.metadata.finalizers.len()
            );
            chaos.metadata.finalizers.clear();
            chaos.status.instances.clear();
            return Ok(());
        }

        let dispatcher = dispatcher_for(&chaos.spec.action);
        let mut errors = MultiError::new();
        let mut targets = Vec::new();

        for raw in chaos.metadata.finalizers.to_vec() {
            let key = match FinalizerKey::parse(&raw, dispatcher.directional()) {
                Ok(key) => key,
                Err(e) => {
                    log::warn!("[Executor] Dropping unparsable finalizer {:?}: {}", raw, e);
                    chaos.metadata.finalizers.remove(&raw);
                    continue;
                }
            };

            match self.ctx.store.get_pod(&key.pod).await {
                Ok(pod) => {
                    if let Some(recorded) = chaos.recorded_uid(&key.pod) {
                        if recorded != pod.uid() {
                            log::warn!(
                                "[Executor] {} was re-created (uid {} -> {}), recovering anyway",
                                key.pod,
                                recorded,
                                pod.uid()
                            );
                        }
                    }
                    targets.push(Target::new(pod, key));
                }
                Err(e) if e.is_not_found() => {
                    log::info!("[Executor] {} is gone, dropping {}", key.pod, raw);
                    forget(chaos, &raw, &key.pod);
                }
                Err(e) => errors.push(e),
            }
        }

        log::info!(
            "[Executor] Recovering {} on {} targets of {}",
            dispatcher.name(),
            targets.len(),
            chaos.key()
        );

        let snapshot = Arc::new(chaos.clone());
        let mut tasks = JoinSet::new();
        for (index, target) in targets.into_iter().enumerate() {
            let ctx = Arc::clone(&self.ctx);
            let dispatcher = Arc::clone(&dispatcher);
            let snapshot = Arc::clone(&snapshot);
            tasks.spawn(async move {
                let result = dispatcher.recover(&ctx, &snapshot, &target).await;
                Outcome {
                    index,
                    target,
                    result,
                }
            });
        }

        for Outcome { target, result, .. } in join_all(tasks).await? {
            let raw = target.key.to_string();
            match result {
                Ok(()) => forget(chaos, &raw, target.pod_key()),
                Err(e) if e.is_not_found() => forget(chaos, &raw, target.pod_key()),
                Err(e) => {
                    log::error!("[Executor] Recover on {} failed: {}", raw, e);
                    errors.push(e);
                }
            }
        }

        errors.into_result()
    }
}

/// Already injected by an earlier, successful apply.
fn is_injected(chaos: &ChaosObject, target: &Target) -> bool {
    if !chaos.metadata.finalizers.contains(&target.key.to_string()) {
        return false;
    }
    let pod = target.pod_key();
    chaos
        .status
        .pod_records
        .iter()
        .rev()
        .find(|r| r.namespace == pod.namespace && r.name == pod.name)
        .map(|r| r.message.is_empty())
        .unwrap_or(false)
}

fn forget(chaos: &mut ChaosObject, raw: &str, pod: &ObjectKey) {
    chaos.metadata.finalizers.remove(raw);
    let still_keyed = chaos
        .metadata
        .finalizers
        .iter()
        .filter_map(|k| FinalizerKey::parse(k, false).ok())
        .any(|k| &k.pod == pod && k.instance.is_some());
    if !still_keyed {
        chaos.status.instances.remove(&pod.to_string());
    }
}

async fn apply_one(
    ctx: &ChaosContext,
    dispatcher: &dyn Dispatcher,
    chaos: &ChaosObject,
    ipsets: &[IpSet],
    target: &Target,
) -> Result<()> {
    if !ipsets.is_empty() {
        let container = first_container_id(&target.pod, &chaos.spec.container_names)?;
        let daemon = ctx.daemon(&target.pod).await?;
        for set in ipsets {
            daemon.flush_ipset(&container, set.clone()).await?;
        }
    }
    dispatcher.apply(ctx, chaos, target).await
}

/// Await every task; results come back in spawn order.
async fn join_all(mut tasks: JoinSet<Outcome>) -> Result<Vec<Outcome>> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| ChaosError::Inject(format!("target task panicked: {}", e)))?;
        outcomes.push(outcome);
    }
    outcomes.sort_by_key(|o| o.index);
    Ok(outcomes)
}

fn pod_record(pod: &k8s_openapi::api::core::v1::Pod, action: &str, message: &str) -> PodRecord {
    let key = pod.key();
    PodRecord {
        namespace: key.namespace,
        name: key.name,
        uid: pod.uid().to_string(),
        host_ip: pod.host_ip().to_string(),
        pod_ip: pod.pod_ip().to_string(),
        action: action.to_string(),
        message: message.to_string(),
    }
}

