//! partition: drop traffic between two pod sets with iptables rules over
//! ipsets.
//!
//! Both sides get an ipset naming the other side. For direction `to` the
//! sources drop OUTPUT towards the target set and the targets drop INPUT
//! from the source set; `from` swaps the chains and `both` installs all four.

use async_trait::async_trait;

use super::ipset::{build_ipset, ipset_name, SOURCE_POSTFIX, TARGET_POSTFIX};
use super::netutils::resolve_cidrs;
use super::{first_container_id, wrong_action, ChaosContext, Dispatcher, Plan, Target};
use crate::actions::{Action, Direction, PartitionParams};
use crate::error::{ChaosError, Result};
use crate::models::ChaosObject;
use crate::orchestrator::finalizers::{FinalizerKey, Role};
use crate::pb::chaosdaemon::{rule, Rule};
use crate::store::PodExt;

pub struct Partition;

fn params<'a>(action: &'a Action) -> Result<&'a PartitionParams> {
    match action {
        Action::Partition(p) => Ok(p),
        other => Err(wrong_action("partition", other)),
    }
}

/// `(chain, ipset)` pairs a pod in `role` carries.
pub fn chains(chaos_name: &str, direction: Direction, role: Role) -> Vec<(rule::Direction, String)> {
    let (peer_set, outbound) = match role {
        Role::Source => (ipset_name(chaos_name, TARGET_POSTFIX), direction == Direction::To),
        Role::Target => (ipset_name(chaos_name, SOURCE_POSTFIX), direction == Direction::From),
    };
    match direction {
        Direction::Both => vec![
            (rule::Direction::Input, peer_set.clone()),
            (rule::Direction::Output, peer_set),
        ],
        _ if outbound => vec![(rule::Direction::Output, peer_set)],
        _ => vec![(rule::Direction::Input, peer_set)],
    }
}

impl Partition {
    async fn flush_rules(
        &self,
        ctx: &ChaosContext,
        chaos: &ChaosObject,
        target: &Target,
        action: rule::Action,
    ) -> Result<()> {
        let p = params(&chaos.spec.action)?;
        let role = target.key.role.ok_or_else(|| {
            ChaosError::Inject(format!("partition key {} carries no role", target.key))
        })?;
        let container = first_container_id(&target.pod, &chaos.spec.container_names)?;
        let daemon = ctx.daemon(&target.pod).await?;

        for (chain, set) in chains(chaos.name(), p.direction, role) {
            log::debug!(
                "[Partition] {:?} {:?} drop on {} via {}",
                action,
                chain,
                target.pod_key(),
                set
            );
            daemon
                .flush_iptables(
                    &container,
                    Rule {
                        action: action as i32,
                        direction: chain as i32,
                        set,
                    },
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for Partition {
    fn name(&self) -> &'static str {
        "partition"
    }

    fn directional(&self) -> bool {
        true
    }

    async fn plan(&self, ctx: &ChaosContext, chaos: &ChaosObject) -> Result<Plan> {
        let p = params(&chaos.spec.action)?;
        let sources = ctx.selector.select_and_filter(&chaos.spec.pod_selector()).await?;
        let targets = match &p.target {
            Some(t) => ctx.selector.select_and_filter(t).await?,
            None => Vec::new(),
        };
        let external = resolve_cidrs(&p.external_targets).await?;

        let source_refs: Vec<&_> = sources.iter().collect();
        let target_refs: Vec<&_> = targets.iter().collect();
        let ipsets = vec![
            build_ipset(ipset_name(chaos.name(), SOURCE_POSTFIX), &source_refs, &[]),
            build_ipset(ipset_name(chaos.name(), TARGET_POSTFIX), &target_refs, &external),
        ];

        let mut planned = Vec::with_capacity(sources.len() + targets.len());
        for pod in sources {
            let key = FinalizerKey::directional(Role::Source, pod.key());
            planned.push(Target::new(pod, key));
        }
        for pod in targets {
            let key = FinalizerKey::directional(Role::Target, pod.key());
            planned.push(Target::new(pod, key));
        }

        log::info!(
            "[Partition] {}: {} keyed targets, direction {:?}",
            chaos.key(),
            planned.len(),
            p.direction
        );
        Ok(Plan {
            targets: planned,
            ipsets,
        })
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        self.flush_rules(ctx, chaos, target, rule::Action::Add).await
    }

    async fn recover(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        self.flush_rules(ctx, chaos, target, rule::Action::Delete).await
    }
}
