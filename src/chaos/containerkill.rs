//! container-kill: ask the node agent to kill the selected containers.

use async_trait::async_trait;

use super::{container_ids, ChaosContext, Dispatcher, Target};
use crate::error::Result;
use crate::models::ChaosObject;

pub struct ContainerKill;

#[async_trait]
impl Dispatcher for ContainerKill {
    fn name(&self) -> &'static str {
        "container-kill"
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let ids = container_ids(&target.pod, &chaos.spec.container_names)?;
        let daemon = ctx.daemon(&target.pod).await?;
        for id in ids {
            log::info!("[ContainerKill] Killing container {} of {}", id, target.pod_key());
            daemon.container_kill(&id).await?;
        }
        Ok(())
    }

    async fn recover(&self, _ctx: &ChaosContext, _chaos: &ChaosObject, _target: &Target) -> Result<()> {
        Ok(())
    }
}
