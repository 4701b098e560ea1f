//! dns: register a rule with the chaos DNS server and point the target's
//! resolver at it.

use async_trait::async_trait;

use super::{first_container_id, wrong_action, ChaosContext, Dispatcher, Target};
use crate::actions::{Action, DnsParams};
use crate::dns::DnsChaosRule;
use crate::error::{ChaosError, Result};
use crate::models::ChaosObject;

pub struct DnsChaos;

/// Rule name on the DNS server: `<namespace>_<name>` of the chaos.
pub fn rule_name(chaos: &ChaosObject) -> String {
    format!("{}_{}", chaos.metadata.namespace, chaos.metadata.name)
}

fn params(action: &Action) -> Result<(&'static str, &DnsParams)> {
    match action {
        Action::DnsError(p) => Ok(("error", p)),
        Action::DnsRandom(p) => Ok(("random", p)),
        other => Err(wrong_action("dns", other)),
    }
}

#[async_trait]
impl Dispatcher for DnsChaos {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let (action, p) = params(&chaos.spec.action)?;
        let server = &ctx.settings.dns_server_address;
        if server.is_empty() {
            return Err(ChaosError::Inject(
                "dns server address is not configured".to_string(),
            ));
        }
        let container = first_container_id(&target.pod, &chaos.spec.container_names)?;

        ctx.dns
            .set_dns_chaos(DnsChaosRule {
                name: rule_name(chaos),
                action: action.to_string(),
                pods: vec![target.pod_key().clone()],
                patterns: p.patterns.clone(),
                scope: p.scope.as_str().to_string(),
            })
            .await?;

        log::info!("[DnsChaos] Redirecting resolver of {} to {}", target.pod_key(), server);
        ctx.daemon(&target.pod)
            .await?
            .set_dns_server(&container, server, true)
            .await?;
        Ok(())
    }

    async fn recover(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        ctx.dns
            .cancel_dns_chaos(&rule_name(chaos), std::slice::from_ref(target.pod_key()))
            .await?;
        let container = first_container_id(&target.pod, &chaos.spec.container_names)?;
        ctx.daemon(&target.pod)
            .await?
            .set_dns_server(&container, "", false)
            .await?;
        Ok(())
    }
}
