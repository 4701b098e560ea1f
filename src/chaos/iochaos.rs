//! io: program the fault server running next to the target's filesystem.

use async_trait::async_trait;

use super::{wrong_action, ChaosContext, Dispatcher, Target};
use crate::actions::{Action, IoParams};
use crate::error::Result;
use crate::models::{ChaosObject, ANNOTATION_WEBHOOK_REQUEST};
use crate::store::PodExt;

pub struct IoChaos;

fn params<'a>(action: &'a Action) -> Result<&'a IoParams> {
    match action {
        Action::IoDelay(p) | Action::IoErrno(p) | Action::IoMixed(p) => Ok(p),
        other => Err(wrong_action("io", other)),
    }
}

/// Address of the fault server for a pod. `:port` is appended to the pod IP;
/// anything else is used as given.
pub fn fault_server_addr(pod_ip: &str, addr: Option<&str>, default_port: u16) -> String {
    match addr {
        None => format!("{}:{}", pod_ip, default_port),
        Some(a) if a.starts_with(':') => format!("{}{}", pod_ip, a),
        Some(a) => a.to_string(),
    }
}

#[async_trait]
impl Dispatcher for IoChaos {
    fn name(&self) -> &'static str {
        "io"
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let p = params(&chaos.spec.action)?;
        let req = chaos.spec.action.fault_request(p)?;

        if let Some(config) = &p.config_name {
            ctx.store
                .annotate_namespace(&target.pod_key().namespace, ANNOTATION_WEBHOOK_REQUEST, Some(config.as_str()))
                .await?;
        }

        let addr = fault_server_addr(
            target.pod.pod_ip(),
            p.addr.as_deref(),
            ctx.settings.fault_server_port,
        );
        let server = ctx.fault_servers.connect(&addr).await?;
        log::info!("[IoChaos] Setting {} on {} via {}", chaos.spec.action.name(), target.pod_key(), addr);
        if req.methods.is_empty() {
            server.set_fault_all(req).await?;
        } else {
            server.set_fault(req).await?;
        }
        Ok(())
    }

    async fn recover(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let p = params(&chaos.spec.action)?;
        let addr = fault_server_addr(
            target.pod.pod_ip(),
            p.addr.as_deref(),
            ctx.settings.fault_server_port,
        );

        let result: Result<()> = async {
            let server = ctx.fault_servers.connect(&addr).await?;
            server.recover_all().await?;
            Ok(())
        }
        .await;

        match result {
            Err(e) if e.is_unreachable() && p.config_name.is_some() => {
                // The sidecar is gone; restart the pod without injection.
                log::warn!(
                    "[IoChaos] Fault server of {} unreachable ({}), restarting pod",
                    target.pod_key(),
                    e
                );
                ctx.store
                    .annotate_namespace(&target.pod_key().namespace, ANNOTATION_WEBHOOK_REQUEST, None)
                    .await?;
                match ctx.store.delete_pod(target.pod_key(), 0).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other,
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_server_addr() {
        assert_eq!(fault_server_addr("10.0.0.5", None, 65534), "10.0.0.5:65534");
        assert_eq!(fault_server_addr("10.0.0.5", Some(":7000"), 65534), "10.0.0.5:7000");
        assert_eq!(
            fault_server_addr("10.0.0.5", Some("fs.local:9000"), 65534),
            "fs.local:9000"
        );
    }
}
