//! pod-not-ready: flip a custom readiness gate condition to `True` so the
//! pod drops out of its services' endpoints.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodCondition};

use super::{ChaosContext, Dispatcher, Target};
use crate::error::Result;
use crate::models::ChaosObject;

pub const NOT_READY_CONDITION: &str = "ChaosMeshInjectNotReady";

pub struct PodNotReady;

fn declares_gate(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.readiness_gates.as_ref())
        .map(|gates| gates.iter().any(|g| g.condition_type == NOT_READY_CONDITION))
        .unwrap_or(false)
}

#[async_trait]
impl Dispatcher for PodNotReady {
    fn name(&self) -> &'static str {
        "pod-not-ready"
    }

    async fn apply(&self, ctx: &ChaosContext, _chaos: &ChaosObject, target: &Target) -> Result<()> {
        if !declares_gate(&target.pod) {
            log::warn!(
                "[PodNotReady] {} does not declare readiness gate {}, skipping",
                target.pod_key(),
                NOT_READY_CONDITION
            );
            return Ok(());
        }

        let mut pod = target.pod.clone();
        let status = pod.status.get_or_insert_with(Default::default);
        let conditions = status.conditions.get_or_insert_with(Vec::new);
        match conditions.iter_mut().find(|c| c.type_ == NOT_READY_CONDITION) {
            Some(c) => c.status = "True".to_string(),
            None => conditions.push(PodCondition {
                type_: NOT_READY_CONDITION.to_string(),
                status: "True".to_string(),
                ..Default::default()
            }),
        }

        log::info!("[PodNotReady] Marking {} not ready", target.pod_key());
        ctx.store.update_pod_status(&pod).await?;
        Ok(())
    }

    async fn recover(&self, ctx: &ChaosContext, _chaos: &ChaosObject, target: &Target) -> Result<()> {
        let mut pod = target.pod.clone();
        let removed = pod
            .status
            .as_mut()
            .and_then(|s| s.conditions.as_mut())
            .map(|conditions| {
                let before = conditions.len();
                conditions.retain(|c| c.type_ != NOT_READY_CONDITION);
                before != conditions.len()
            })
            .unwrap_or(false);

        if removed {
            ctx.store.update_pod_status(&pod).await?;
        }
        Ok(())
    }
}
