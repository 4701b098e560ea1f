//! In-process `ChaosDaemon` that records every call and simulates the
//! netfilter and tc state it would leave behind. Used by integration tests
//! and dry runs.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ChaosDaemon, DaemonConnector};
use crate::chaos::netutils::cidr_contains;
use crate::error::{Result, RpcError};
use crate::pb::chaosdaemon::{rule, EmatchFilter, IpSet, Netem, Qdisc, Rule, Tbf, TcFilter};
use crate::store::PodExt;

/// One observed RPC. `target` is the container id, or the uuid for the
/// stressor calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonCall {
    pub method: &'static str,
    pub target: String,
    pub detail: String,
}

#[derive(Default)]
struct State {
    calls: Vec<DaemonCall>,
    failing: HashSet<String>,
    ipsets: HashMap<(String, String), Vec<String>>,
    rules: HashMap<String, Vec<(rule::Direction, String)>>,
    netem: HashMap<String, Netem>,
    tbf: HashMap<String, Tbf>,
    qdiscs: HashMap<String, Vec<Qdisc>>,
    filters: HashMap<String, Vec<EmatchFilter>>,
    time_offsets: HashMap<String, (i64, i64, u64)>,
    stressors: BTreeMap<String, String>,
    dns_servers: HashMap<String, String>,
    killed: Vec<String>,
}

#[derive(Default)]
pub struct RecordingDaemon {
    state: Mutex<State>,
}

impl RecordingDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call and fail it if `target` was marked failing.
    fn enter(&self, method: &'static str, target: &str, detail: String) -> Result<MutexGuard<'_, State>, RpcError> {
        let mut state = self.lock();
        state.calls.push(DaemonCall {
            method,
            target: target.to_string(),
            detail,
        });
        if state.failing.contains(target) {
            return Err(RpcError::Status {
                method: method.to_string(),
                message: format!("injected failure for {}", target),
            });
        }
        Ok(state)
    }

    /// Fail every subsequent call against `target`.
    pub fn fail_target(&self, target: &str) {
        self.lock().failing.insert(target.to_string());
    }

    pub fn heal_target(&self, target: &str) {
        self.lock().failing.remove(target);
    }

    pub fn calls(&self) -> Vec<DaemonCall> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, method: &str) -> Vec<DaemonCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    pub fn netem(&self, container_id: &str) -> Option<Netem> {
        self.lock().netem.get(container_id).copied()
    }

    pub fn tbf(&self, container_id: &str) -> Option<Tbf> {
        self.lock().tbf.get(container_id).cloned()
    }

    pub fn qdiscs(&self, container_id: &str) -> Vec<Qdisc> {
        self.lock().qdiscs.get(container_id).cloned().unwrap_or_default()
    }

    pub fn filters(&self, container_id: &str) -> Vec<EmatchFilter> {
        self.lock().filters.get(container_id).cloned().unwrap_or_default()
    }

    pub fn time_offset(&self, container_id: &str) -> Option<(i64, i64, u64)> {
        self.lock().time_offsets.get(container_id).copied()
    }

    pub fn running_stressors(&self) -> Vec<String> {
        self.lock().stressors.keys().cloned().collect()
    }

    pub fn dns_server(&self, container_id: &str) -> Option<String> {
        self.lock().dns_servers.get(container_id).cloned()
    }

    pub fn killed(&self) -> Vec<String> {
        self.lock().killed.clone()
    }

    pub fn ipset(&self, container_id: &str, name: &str) -> Option<Vec<String>> {
        self.lock()
            .ipsets
            .get(&(container_id.to_string(), name.to_string()))
            .cloned()
    }

    /// Active iptables rules of a container as `(direction, set)`.
    pub fn rules(&self, container_id: &str) -> Vec<(rule::Direction, String)> {
        self.lock().rules.get(container_id).cloned().unwrap_or_default()
    }

    /// Whether traffic from `src` to `dst` is dropped by the simulated rules:
    /// the source's OUTPUT rules match the destination IP, or the
    /// destination's INPUT rules match the source IP.
    pub fn is_blocked(&self, src: (&str, &str), dst: (&str, &str)) -> bool {
        let (src_container, src_ip) = src;
        let (dst_container, dst_ip) = dst;
        let state = self.lock();

        let matches = |container: &str, direction: rule::Direction, ip: &str| {
            state
                .rules
                .get(container)
                .into_iter()
                .flatten()
                .filter(|(d, _)| *d == direction)
                .any(|(_, set)| {
                    state
                        .ipsets
                        .get(&(container.to_string(), set.clone()))
                        .map(|cidrs| cidrs.iter().any(|c| cidr_contains(c, ip)))
                        .unwrap_or(false)
                })
        };

        matches(src_container, rule::Direction::Output, dst_ip)
            || matches(dst_container, rule::Direction::Input, src_ip)
    }
}

#[async_trait]
impl ChaosDaemon for RecordingDaemon {
    async fn set_netem(&self, container_id: &str, netem: Netem) -> Result<(), RpcError> {
        let mut state = self.enter("SetNetem", container_id, format!("{:?}", netem))?;
        state.netem.insert(container_id.to_string(), netem);
        Ok(())
    }

    async fn delete_netem(&self, container_id: &str) -> Result<(), RpcError> {
        let mut state = self.enter("DeleteNetem", container_id, String::new())?;
        state.netem.remove(container_id);
        state.tbf.remove(container_id);
        state.qdiscs.remove(container_id);
        state.filters.remove(container_id);
        Ok(())
    }

    async fn set_tbf(&self, container_id: &str, tbf: Tbf) -> Result<(), RpcError> {
        let mut state = self.enter("SetTbf", container_id, format!("{:?}", tbf))?;
        state.tbf.insert(container_id.to_string(), tbf);
        Ok(())
    }

    async fn add_qdisc(&self, container_id: &str, qdisc: Qdisc) -> Result<(), RpcError> {
        let mut state = self.enter("AddQdisc", container_id, qdisc.r#type.clone())?;
        state
            .qdiscs
            .entry(container_id.to_string())
            .or_default()
            .push(qdisc);
        Ok(())
    }

    async fn add_ematch_filter(&self, container_id: &str, filter: EmatchFilter) -> Result<(), RpcError> {
        let mut state = self.enter("AddEmatchFilter", container_id, filter.r#match.clone())?;
        state
            .filters
            .entry(container_id.to_string())
            .or_default()
            .push(filter);
        Ok(())
    }

    async fn del_tc_filter(&self, container_id: &str, filter: TcFilter) -> Result<(), RpcError> {
        let mut state = self.enter("DelTcFilter", container_id, format!("{:?}", filter.parent))?;
        if let Some(filters) = state.filters.get_mut(container_id) {
            filters.retain(|f| f.parent != filter.parent);
        }
        Ok(())
    }

    async fn flush_ipset(&self, container_id: &str, ipset: IpSet) -> Result<(), RpcError> {
        let mut state = self.enter("FlushIpSet", container_id, ipset.name.clone())?;
        state
            .ipsets
            .insert((container_id.to_string(), ipset.name), ipset.cidrs);
        Ok(())
    }

    async fn flush_iptables(&self, container_id: &str, rule: Rule) -> Result<(), RpcError> {
        let direction = rule::Direction::try_from(rule.direction).unwrap_or(rule::Direction::Input);
        let action = rule::Action::try_from(rule.action).unwrap_or(rule::Action::Add);
        let detail = format!("{:?} {:?} {}", action, direction, rule.set);
        let mut state = self.enter("FlushIptables", container_id, detail)?;
        let rules = state.rules.entry(container_id.to_string()).or_default();
        let entry = (direction, rule.set);
        match action {
            rule::Action::Add => {
                if !rules.contains(&entry) {
                    rules.push(entry);
                }
            }
            rule::Action::Delete => rules.retain(|r| *r != entry),
        }
        Ok(())
    }

    async fn set_time_offset(
        &self,
        container_id: &str,
        sec: i64,
        nsec: i64,
        clk_ids_mask: u64,
    ) -> Result<(), RpcError> {
        let detail = format!("{}s {}ns mask={}", sec, nsec, clk_ids_mask);
        let mut state = self.enter("SetTimeOffset", container_id, detail)?;
        state
            .time_offsets
            .insert(container_id.to_string(), (sec, nsec, clk_ids_mask));
        Ok(())
    }

    async fn recover_time_offset(&self, container_id: &str) -> Result<(), RpcError> {
        let mut state = self.enter("RecoverTimeOffset", container_id, String::new())?;
        state.time_offsets.remove(container_id);
        Ok(())
    }

    async fn container_kill(&self, container_id: &str) -> Result<(), RpcError> {
        let mut state = self.enter("ContainerKill", container_id, String::new())?;
        state.killed.push(container_id.to_string());
        Ok(())
    }

    async fn container_get_pid(&self, container_id: &str) -> Result<u32, RpcError> {
        let state = self.enter("ContainerGetPid", container_id, String::new())?;
        Ok(state.calls.len() as u32)
    }

    async fn exec_stressors(&self, stressors: &str, uuid: &str) -> Result<String, RpcError> {
        let mut state = self.enter("ExecStressors", uuid, stressors.to_string())?;
        let id = if uuid.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            uuid.to_string()
        };
        state.stressors.insert(id.clone(), stressors.to_string());
        Ok(id)
    }

    async fn cancel_stressors(&self, uuid: &str) -> Result<(), RpcError> {
        let mut state = self.enter("CancelStressors", uuid, String::new())?;
        state.stressors.remove(uuid);
        Ok(())
    }

    async fn set_dns_server(&self, container_id: &str, dns_server: &str, enable: bool) -> Result<(), RpcError> {
        let detail = format!("{} enable={}", dns_server, enable);
        let mut state = self.enter("SetDNSServer", container_id, detail)?;
        if enable {
            state
                .dns_servers
                .insert(container_id.to_string(), dns_server.to_string());
        } else {
            state.dns_servers.remove(container_id);
        }
        Ok(())
    }
}

/// Connector handing every scheduled pod the same `RecordingDaemon`.
pub struct RecordingConnector {
    daemon: Arc<RecordingDaemon>,
    unreachable: Mutex<HashSet<String>>,
}

impl RecordingConnector {
    pub fn new(daemon: Arc<RecordingDaemon>) -> Self {
        RecordingConnector {
            daemon,
            unreachable: Mutex::new(HashSet::new()),
        }
    }

    pub fn daemon(&self) -> &Arc<RecordingDaemon> {
        &self.daemon
    }

    /// Refuse connections to the daemon on `node`.
    pub fn set_unreachable(&self, node: &str, unreachable: bool) {
        let mut nodes = self
            .unreachable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if unreachable {
            nodes.insert(node.to_string());
        } else {
            nodes.remove(node);
        }
    }
}

#[async_trait]
impl DaemonConnector for RecordingConnector {
    async fn connect(&self, pod: &Pod) -> Result<Arc<dyn ChaosDaemon>> {
        let node = pod
            .node_name()
            .ok_or_else(|| RpcError::Unscheduled(pod.key().to_string()))?;
        let refused = self
            .unreachable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(node);
        if refused {
            return Err(RpcError::Connect {
                addr: node.to_string(),
                reason: "connection refused".to_string(),
            }
            .into());
        }
        Ok(self.daemon.clone())
    }
}
