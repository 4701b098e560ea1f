//! bandwidth: token bucket filter at the root of the egress path.

use async_trait::async_trait;

use super::{first_container_id, wrong_action, ChaosContext, Dispatcher, Target};
use crate::actions::{Action, TbfSpec};
use crate::error::Result;
use crate::models::ChaosObject;

pub struct TbfChaos;

#[async_trait]
impl Dispatcher for TbfChaos {
    fn name(&self) -> &'static str {
        "bandwidth"
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let tbf = match &chaos.spec.action {
            Action::Bandwidth(p) => p.to_tbf()?,
            other => return Err(wrong_action(self.name(), other)),
        };
        let container = first_container_id(&target.pod, &chaos.spec.container_names)?;
        log::info!(
            "[Tbf] Limiting {} to {} bytes/s",
            target.pod_key(),
            tbf.rate_bps
        );
        ctx.daemon(&target.pod).await?.set_tbf(&container, tbf).await?;
        Ok(())
    }

    /// Removing the root qdisc drops the bucket.
    async fn recover(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let container = first_container_id(&target.pod, &chaos.spec.container_names)?;
        ctx.daemon(&target.pod).await?.delete_netem(&container).await?;
        Ok(())
    }
}
