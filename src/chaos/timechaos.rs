//! time-offset: shift the clocks seen by the selected containers.

use async_trait::async_trait;

use super::{container_ids, wrong_action, ChaosContext, Dispatcher, Target};
use crate::actions::Action;
use crate::error::Result;
use crate::models::ChaosObject;

pub struct TimeChaos;

#[async_trait]
impl Dispatcher for TimeChaos {
    fn name(&self) -> &'static str {
        "time"
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let p = match &chaos.spec.action {
            Action::TimeOffset(p) => p,
            other => return Err(wrong_action(self.name(), other)),
        };
        let (sec, nsec) = p.offset()?;
        let mask = p.clock_mask()?;
        let daemon = ctx.daemon(&target.pod).await?;

        for id in container_ids(&target.pod, &chaos.spec.container_names)? {
            log::info!(
                "[TimeChaos] Offsetting {} ({}) by {}s {}ns",
                target.pod_key(),
                id,
                sec,
                nsec
            );
            daemon.set_time_offset(&id, sec, nsec, mask).await?;
        }
        Ok(())
    }

    async fn recover(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let daemon = ctx.daemon(&target.pod).await?;
        for id in container_ids(&target.pod, &chaos.spec.container_names)? {
            daemon.recover_time_offset(&id).await?;
        }
        Ok(())
    }
}
