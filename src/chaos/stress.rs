//! stress: run stress-ng on the target's node through the daemon.
//!
//! Each target gets an instance id that becomes the finalizer suffix
//! (`<ns>/<name>/<instance>`), so recovery can cancel exactly the process
//! it started even after a controller restart.

use async_trait::async_trait;
use uuid::Uuid;

use super::{wrong_action, ChaosContext, Dispatcher, Plan, Target};
use crate::actions::Action;
use crate::error::{ChaosError, Result};
use crate::models::{ChaosObject, ObjectKey};
use crate::orchestrator::finalizers::FinalizerKey;
use crate::store::PodExt;

pub struct StressChaos;

/// Instance already assigned to `pod`, from the status or the finalizers.
pub fn existing_instance(chaos: &ChaosObject, pod: &ObjectKey) -> Option<String> {
    if let Some(instance) = chaos.status.instances.get(&pod.to_string()) {
        return Some(instance.uid.clone());
    }
    chaos
        .metadata
        .finalizers
        .iter()
        .filter_map(|raw| FinalizerKey::parse(raw, false).ok())
        .find(|key| &key.pod == pod && key.instance.is_some())
        .and_then(|key| key.instance)
}

#[async_trait]
impl Dispatcher for StressChaos {
    fn name(&self) -> &'static str {
        "stress"
    }

    async fn plan(&self, ctx: &ChaosContext, chaos: &ChaosObject) -> Result<Plan> {
        let pods = ctx.selector.select_and_filter(&chaos.spec.pod_selector()).await?;
        let targets = pods
            .into_iter()
            .map(|pod| {
                let key = pod.key();
                let instance = existing_instance(chaos, &key)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                Target::new(pod, FinalizerKey::with_instance(key, instance))
            })
            .collect();
        Ok(Plan::of(targets))
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let args = match &chaos.spec.action {
            Action::Stress(p) => p.stress_args()?,
            other => return Err(wrong_action(self.name(), other)),
        };
        let instance = target.key.instance.as_deref().ok_or_else(|| {
            ChaosError::Inject(format!("stress key {} carries no instance", target.key))
        })?;

        let daemon = ctx.daemon(&target.pod).await?;
        let started = daemon.exec_stressors(&args, instance).await?;
        if started != instance {
            log::warn!(
                "[Stress] Daemon started {} as {} instead of {}",
                target.pod_key(),
                started,
                instance
            );
        }
        log::info!("[Stress] Started stressors `{}` for {} ({})", args, target.pod_key(), instance);
        Ok(())
    }

    async fn recover(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let instance = target
            .key
            .instance
            .clone()
            .or_else(|| existing_instance(chaos, target.pod_key()));
        let Some(instance) = instance else {
            log::warn!("[Stress] No instance recorded for {}, nothing to cancel", target.pod_key());
            return Ok(());
        };

        ctx.daemon(&target.pod).await?.cancel_stressors(&instance).await?;
        log::info!("[Stress] Cancelled {} on {}", instance, target.pod_key());
        Ok(())
    }
}
