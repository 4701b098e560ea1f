//! pod-failure: swap container images for one that never becomes ready,
//! remembering the originals in pod annotations.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{container_ids, ChaosContext, Dispatcher, Target};
use crate::error::{ChaosError, Result};
use crate::models::{ChaosObject, ANNOTATION_IMAGE_PREFIX};

pub struct PodFailure;

/// `chaos-mesh-<chaos>-<action>-<container>-image`
pub fn image_annotation(chaos_name: &str, action: &str, container: &str) -> String {
    format!(
        "{}-{}-{}-{}-image",
        ANNOTATION_IMAGE_PREFIX, chaos_name, action, container
    )
}

fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

#[async_trait]
impl Dispatcher for PodFailure {
    fn name(&self) -> &'static str {
        "pod-failure"
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        container_ids(&target.pod, &chaos.spec.container_names)?;

        let mut pod = target.pod.clone();
        let action = chaos.spec.action.name();
        let names = &chaos.spec.container_names;
        let annotations = pod.metadata.annotations.get_or_insert_with(BTreeMap::new);
        let spec = pod.spec.as_mut().ok_or_else(|| {
            ChaosError::Inject(format!("pod {} has no spec", target.pod_key()))
        })?;

        for container in spec
            .containers
            .iter_mut()
            .filter(|c| names.is_empty() || names.contains(&c.name))
        {
            let key = image_annotation(chaos.name(), action, &container.name);
            // A retried apply must not overwrite the real image with the placeholder.
            if !annotations.contains_key(&key) {
                annotations.insert(key, container.image.clone().unwrap_or_default());
            }
            container.image = Some(ctx.settings.pod_failure_image.clone());
        }

        log::info!("[PodFailure] Replacing images of {}", target.pod_key());
        ctx.store.update_pod(&pod).await?;
        Ok(())
    }

    async fn recover(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let mut pod = target.pod.clone();
        let action = chaos.spec.action.name();
        let mut restored = false;

        if let (Some(annotations), Some(spec)) = (pod.metadata.annotations.as_mut(), pod.spec.as_mut()) {
            for container in spec.containers.iter_mut() {
                let key = image_annotation(chaos.name(), action, &container.name);
                if let Some(original) = annotations.remove(&key) {
                    container.image = Some(original);
                    restored = true;
                }
            }
        }

        if restored {
            ignore_not_found(ctx.store.update_pod(&pod).await.map(|_| ()))?;
        } else {
            log::warn!(
                "[PodFailure] No original image recorded on {}, deleting anyway",
                target.pod_key()
            );
        }

        // The replacement pod comes back with the restored images.
        ignore_not_found(ctx.store.delete_pod(target.pod_key(), 0).await)
    }
}
