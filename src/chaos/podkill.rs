//! pod-kill: delete the target pod. Nothing to undo.

use async_trait::async_trait;

use super::{wrong_action, ChaosContext, Dispatcher, Target};
use crate::actions::Action;
use crate::error::Result;
use crate::models::ChaosObject;

pub struct PodKill;

#[async_trait]
impl Dispatcher for PodKill {
    fn name(&self) -> &'static str {
        "pod-kill"
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let grace_period = match &chaos.spec.action {
            Action::PodKill(p) => p.grace_period,
            other => return Err(wrong_action(self.name(), other)),
        };
        log::info!(
            "[PodKill] Deleting pod {} (grace period {}s)",
            target.pod_key(),
            grace_period
        );
        ctx.store.delete_pod(target.pod_key(), grace_period).await
    }

    async fn recover(&self, _ctx: &ChaosContext, _chaos: &ChaosObject, _target: &Target) -> Result<()> {
        Ok(())
    }
}
