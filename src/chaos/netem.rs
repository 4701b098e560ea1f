//! Network emulation: delay, loss, duplicate and corrupt.
//!
//! Without a target the netem qdisc sits at the root and shapes all egress
//! traffic. With a target the egress path becomes a four-band prio tree where
//! bands 1-3 behave like pfifo_fast and band 4 holds netem; an ematch filter
//! on the target ipset classifies matching packets into band 4:
//!
//! ```text
//!           root 1:
//!         /  |   |  \
//!       1:1 1:2 1:3 1:4
//!        |   |   |   |
//!       10: 20: 30: 40: (netem)
//! ```

use async_trait::async_trait;
use std::collections::HashSet;

use super::ipset::{build_ipset, ipset_name, NETEM_POSTFIX};
use super::netutils::resolve_cidrs;
use super::{first_container_id, wrong_action, ChaosContext, Dispatcher, Plan, Target};
use crate::actions::{Action, Direction, NetworkParams};
use crate::error::Result;
use crate::models::ChaosObject;
use crate::pb::chaosdaemon::{EmatchFilter, Netem, Qdisc, TcFilter, TcHandle};
use crate::store::PodExt;

const PRIOMAP: [&str; 16] = [
    "1", "2", "2", "2", "1", "2", "0", "0", "1", "1", "1", "1", "1", "1", "1", "1",
];

pub struct NetemChaos;

fn params<'a>(name: &str, action: &'a Action) -> Result<&'a NetworkParams> {
    match action {
        Action::Netem(p) | Action::Delay(p) | Action::Loss(p) | Action::Duplicate(p) | Action::Corrupt(p) => Ok(p),
        other => Err(wrong_action(name, other)),
    }
}

/// `tc qdisc ... netem` arguments for a netem block.
pub fn netem_args(netem: &Netem) -> Vec<String> {
    let mut args = Vec::new();
    if netem.time_us > 0 {
        args.push("delay".to_string());
        args.push(format!("{}us", netem.time_us));
        if netem.jitter_us > 0 {
            args.push(format!("{}us", netem.jitter_us));
            if netem.delay_corr > 0.0 {
                args.push(format!("{}%", netem.delay_corr));
            }
        }
    }
    for (name, value, corr) in [
        ("loss", netem.loss, netem.loss_corr),
        ("duplicate", netem.duplicate, netem.duplicate_corr),
        ("corrupt", netem.corrupt, netem.corrupt_corr),
    ] {
        if value > 0.0 {
            args.push(name.to_string());
            args.push(format!("{}%", value));
            if corr > 0.0 {
                args.push(format!("{}%", corr));
            }
        }
    }
    if netem.limit > 0 {
        args.push("limit".to_string());
        args.push(netem.limit.to_string());
    }
    args
}

fn qdisc(kind: &str, parent: TcHandle, handle: TcHandle, args: Vec<String>) -> Qdisc {
    Qdisc {
        r#type: kind.to_string(),
        parent: Some(parent),
        handle: Some(handle),
        args,
    }
}

/// The prio tree, netem leaf included, in creation order.
pub fn filtered_qdiscs(netem: &Netem) -> Vec<Qdisc> {
    let mut prio_args = vec!["bands".to_string(), "4".to_string(), "priomap".to_string()];
    prio_args.extend(PRIOMAP.iter().map(|s| s.to_string()));

    vec![
        qdisc("prio", TcHandle::new(1, 0), TcHandle::new(1, 0), prio_args),
        qdisc("sfq", TcHandle::new(1, 1), TcHandle::new(10, 0), Vec::new()),
        qdisc("sfq", TcHandle::new(1, 2), TcHandle::new(20, 0), Vec::new()),
        qdisc("sfq", TcHandle::new(1, 3), TcHandle::new(30, 0), Vec::new()),
        qdisc("netem", TcHandle::new(1, 4), TcHandle::new(40, 0), netem_args(netem)),
    ]
}

fn dedup(pods: Vec<k8s_openapi::api::core::v1::Pod>) -> Vec<k8s_openapi::api::core::v1::Pod> {
    let mut seen = HashSet::new();
    pods.into_iter().filter(|p| seen.insert(p.key())).collect()
}

#[async_trait]
impl Dispatcher for NetemChaos {
    fn name(&self) -> &'static str {
        "netem"
    }

    async fn plan(&self, ctx: &ChaosContext, chaos: &ChaosObject) -> Result<Plan> {
        let p = params(self.name(), &chaos.spec.action)?;
        let sources = ctx.selector.select_and_filter(&chaos.spec.pod_selector()).await?;
        if !p.is_filtered() {
            return Ok(Plan::of(sources.into_iter().map(Target::plain).collect()));
        }

        let targets = match &p.target {
            Some(t) => ctx.selector.select_and_filter(t).await?,
            None => Vec::new(),
        };
        let external = resolve_cidrs(&p.external_targets).await?;

        let (shaped, peers) = match p.direction {
            Direction::To => (sources, targets),
            Direction::From => (targets, sources),
            Direction::Both => {
                let all = dedup(sources.into_iter().chain(targets).collect());
                (all.clone(), all)
            }
        };

        let peer_refs: Vec<&_> = peers.iter().collect();
        let set = build_ipset(ipset_name(chaos.name(), NETEM_POSTFIX), &peer_refs, &external);
        log::debug!(
            "[Netem] {} pods shaped towards ipset {} ({} entries)",
            shaped.len(),
            set.name,
            set.cidrs.len()
        );

        Ok(Plan {
            targets: dedup(shaped).into_iter().map(Target::plain).collect(),
            ipsets: vec![set],
        })
    }

    async fn apply(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let p = params(self.name(), &chaos.spec.action)?;
        let netem = chaos.spec.action.netem()?;
        let container = first_container_id(&target.pod, &chaos.spec.container_names)?;
        let daemon = ctx.daemon(&target.pod).await?;

        if !p.is_filtered() {
            log::info!("[Netem] Applying netem on {}", target.pod_key());
            daemon.set_netem(&container, netem).await?;
            return Ok(());
        }

        log::info!("[Netem] Applying filtered netem on {}", target.pod_key());
        for q in filtered_qdiscs(&netem) {
            daemon.add_qdisc(&container, q).await?;
        }
        let set = ipset_name(chaos.name(), NETEM_POSTFIX);
        daemon
            .add_ematch_filter(
                &container,
                EmatchFilter {
                    r#match: format!("ipset({} dst)", set),
                    parent: Some(TcHandle::new(1, 0)),
                    classid: Some(TcHandle::new(1, 4)),
                },
            )
            .await?;
        Ok(())
    }

    async fn recover(&self, ctx: &ChaosContext, chaos: &ChaosObject, target: &Target) -> Result<()> {
        let p = params(self.name(), &chaos.spec.action)?;
        let container = first_container_id(&target.pod, &chaos.spec.container_names)?;
        let daemon = ctx.daemon(&target.pod).await?;

        if p.is_filtered() {
            daemon
                .del_tc_filter(
                    &container,
                    TcFilter {
                        parent: Some(TcHandle::new(1, 0)),
                    },
                )
                .await?;
        }
        daemon.delete_netem(&container).await?;
        log::info!("[Netem] Recovered {}", target.pod_key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_netem_args() {
        let netem = Netem {
            time_us: 90_000,
            jitter_us: 90_000,
            delay_corr: 25.0,
            loss: 25.0,
            loss_corr: 25.0,
            ..Default::default()
        };
        assert_eq!(
            netem_args(&netem).join(" "),
            "delay 90000us 90000us 25% loss 25% 25%"
        );
    }

    #[test]
    fn test_filtered_tree_shape() {
        let tree = filtered_qdiscs(&Netem {
            loss: 10.0,
            ..Default::default()
        });
        assert_eq!(tree.len(), 5);
        assert_eq!(tree[0].r#type, "prio");
        assert_eq!(tree[0].args[..3], ["bands", "4", "priomap"]);
        assert_eq!(tree[4].r#type, "netem");
        assert_eq!(tree[4].parent, Some(TcHandle::new(1, 4)));
        assert_eq!(tree[4].args, vec!["loss", "10%"]);
    }
}
