//! gRPC implementation of `ChaosDaemon`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use std::time::Duration;

use super::{ChaosDaemon, DaemonConnector};
use crate::error::{Result, RpcError};
use crate::pb::chaosdaemon::{
    container_action, ChaosDaemonClient, ContainerAction, ContainerRequest, EmatchFilter,
    EmatchFilterRequest, IpSet, IpSetRequest, IpTablesRequest, Netem, NetemRequest, Qdisc,
    QdiscRequest, Rule, SetDnsServerRequest, StressRequest, Tbf, TbfRequest, TcFilter,
    TcFilterRequest, TimeRequest,
};
use crate::pb::{call, dial};
use crate::store::{ClusterStore, PodExt};

/// One dialed connection to a node daemon.
pub struct GrpcDaemon {
    client: ChaosDaemonClient,
    timeout: Duration,
}

impl GrpcDaemon {
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, RpcError> {
        let inner = dial(addr, timeout).await?;
        log::debug!("[Daemon] Connected to {}", addr);
        Ok(GrpcDaemon {
            client: ChaosDaemonClient::new(inner),
            timeout,
        })
    }

    fn client(&self) -> ChaosDaemonClient {
        self.client.clone()
    }
}

#[async_trait]
impl ChaosDaemon for GrpcDaemon {
    async fn set_netem(&self, container_id: &str, netem: Netem) -> Result<(), RpcError> {
        let req = NetemRequest {
            netem: Some(netem),
            container_id: container_id.to_string(),
        };
        let mut c = self.client();
        call("SetNetem", self.timeout, c.set_netem(req)).await
    }

    async fn delete_netem(&self, container_id: &str) -> Result<(), RpcError> {
        let req = NetemRequest {
            netem: None,
            container_id: container_id.to_string(),
        };
        let mut c = self.client();
        call("DeleteNetem", self.timeout, c.delete_netem(req)).await
    }

    async fn set_tbf(&self, container_id: &str, tbf: Tbf) -> Result<(), RpcError> {
        let req = TbfRequest {
            tbf: Some(tbf),
            container_id: container_id.to_string(),
        };
        let mut c = self.client();
        call("SetTbf", self.timeout, c.set_tbf(req)).await
    }

    async fn add_qdisc(&self, container_id: &str, qdisc: Qdisc) -> Result<(), RpcError> {
        let req = QdiscRequest {
            qdisc: Some(qdisc),
            container_id: container_id.to_string(),
        };
        let mut c = self.client();
        call("AddQdisc", self.timeout, c.add_qdisc(req)).await
    }

    async fn add_ematch_filter(&self, container_id: &str, filter: EmatchFilter) -> Result<(), RpcError> {
        let req = EmatchFilterRequest {
            filter: Some(filter),
            container_id: container_id.to_string(),
        };
        let mut c = self.client();
        call("AddEmatchFilter", self.timeout, c.add_ematch_filter(req)).await
    }

    async fn del_tc_filter(&self, container_id: &str, filter: TcFilter) -> Result<(), RpcError> {
        let req = TcFilterRequest {
            filter: Some(filter),
            container_id: container_id.to_string(),
        };
        let mut c = self.client();
        call("DelTcFilter", self.timeout, c.del_tc_filter(req)).await
    }

    async fn flush_ipset(&self, container_id: &str, ipset: IpSet) -> Result<(), RpcError> {
        let req = IpSetRequest {
            ipset: Some(ipset),
            container_id: container_id.to_string(),
        };
        let mut c = self.client();
        call("FlushIpSet", self.timeout, c.flush_ipset(req)).await
    }

    async fn flush_iptables(&self, container_id: &str, rule: Rule) -> Result<(), RpcError> {
        let req = IpTablesRequest {
            rule: Some(rule),
            container_id: container_id.to_string(),
        };
        let mut c = self.client();
        call("FlushIptables", self.timeout, c.flush_iptables(req)).await
    }

    async fn set_time_offset(
        &self,
        container_id: &str,
        sec: i64,
        nsec: i64,
        clk_ids_mask: u64,
    ) -> Result<(), RpcError> {
        let req = TimeRequest {
            container_id: container_id.to_string(),
            sec,
            nsec,
            clk_ids_mask,
        };
        let mut c = self.client();
        call("SetTimeOffset", self.timeout, c.set_time_offset(req)).await
    }

    async fn recover_time_offset(&self, container_id: &str) -> Result<(), RpcError> {
        let req = TimeRequest {
            container_id: container_id.to_string(),
            ..TimeRequest::default()
        };
        let mut c = self.client();
        call("RecoverTimeOffset", self.timeout, c.recover_time_offset(req)).await
    }

    async fn container_kill(&self, container_id: &str) -> Result<(), RpcError> {
        let req = ContainerRequest {
            action: Some(ContainerAction {
                action: container_action::Action::Kill as i32,
            }),
            container_id: container_id.to_string(),
        };
        let mut c = self.client();
        call("ContainerKill", self.timeout, c.container_kill(req)).await
    }

    async fn container_get_pid(&self, container_id: &str) -> Result<u32, RpcError> {
        let req = ContainerRequest {
            action: Some(ContainerAction {
                action: container_action::Action::Getpid as i32,
            }),
            container_id: container_id.to_string(),
        };
        let mut c = self.client();
        let resp = call("ContainerGetPid", self.timeout, c.container_get_pid(req)).await?;
        Ok(resp.pid)
    }

    async fn exec_stressors(&self, stressors: &str, uuid: &str) -> Result<String, RpcError> {
        let req = StressRequest {
            stressors: stressors.to_string(),
            uuid: uuid.to_string(),
        };
        let mut c = self.client();
        let resp = call("ExecStressors", self.timeout, c.exec_stressors(req)).await?;
        Ok(resp.uuid)
    }

    async fn cancel_stressors(&self, uuid: &str) -> Result<(), RpcError> {
        let req = StressRequest {
            stressors: String::new(),
            uuid: uuid.to_string(),
        };
        let mut c = self.client();
        call("CancelStressors", self.timeout, c.cancel_stressors(req)).await
    }

    async fn set_dns_server(&self, container_id: &str, dns_server: &str, enable: bool) -> Result<(), RpcError> {
        let req = SetDnsServerRequest {
            container_id: container_id.to_string(),
            dns_server: dns_server.to_string(),
            enable,
        };
        let mut c = self.client();
        call("SetDNSServer", self.timeout, c.set_dns_server(req)).await
    }
}

/// Dials the daemon on the node hosting a pod. A fresh connection per
/// `connect`; nothing is pooled.
pub struct GrpcDaemonConnector {
    store: Arc<dyn ClusterStore>,
    port: u16,
    timeout: Duration,
}

impl GrpcDaemonConnector {
    pub fn new(store: Arc<dyn ClusterStore>, port: u16, timeout: Duration) -> Self {
        GrpcDaemonConnector { store, port, timeout }
    }

    /// `<first node address>:<port>` for the node running `pod`.
    pub async fn daemon_address(&self, pod: &Pod) -> Result<String> {
        let node_name = pod
            .node_name()
            .ok_or_else(|| RpcError::Unscheduled(pod.key().to_string()))?;
        let node = self.store.get_node(node_name).await?;
        let address = node
            .status
            .as_ref()
            .and_then(|s| s.addresses.as_ref())
            .and_then(|a| a.first())
            .map(|a| a.address.clone())
            .ok_or_else(|| RpcError::NoNodeAddress(node_name.to_string()))?;
        Ok(format!("{}:{}", address, self.port))
    }
}

#[async_trait]
impl DaemonConnector for GrpcDaemonConnector {
    async fn connect(&self, pod: &Pod) -> Result<Arc<dyn ChaosDaemon>> {
        let addr = self.daemon_address(pod).await?;
        let daemon = GrpcDaemon::connect(&addr, self.timeout).await?;
        Ok(Arc::new(daemon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChaosError;
    use crate::store::memory::fixtures;
    use crate::store::MemoryStore;

    fn connector(store: Arc<MemoryStore>) -> GrpcDaemonConnector {
        GrpcDaemonConnector::new(store, 31767, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_daemon_address_uses_first_node_address() {
        let store = Arc::new(MemoryStore::new());
        store.insert_node(fixtures::node("node-0", "10.0.0.5"));
        let pod = fixtures::pod("default", "p0").node("node-0").build();
        let addr = connector(store).daemon_address(&pod).await.unwrap();
        assert_eq!(addr, "10.0.0.5:31767");
    }

    #[tokio::test]
    async fn test_unscheduled_pod() {
        let store = Arc::new(MemoryStore::new());
        let pod = fixtures::pod("default", "p0").build();
        let err = connector(store).daemon_address(&pod).await.unwrap_err();
        assert!(matches!(err, ChaosError::Rpc(RpcError::Unscheduled(_))));
    }

    #[tokio::test]
    async fn test_missing_node() {
        let store = Arc::new(MemoryStore::new());
        let pod = fixtures::pod("default", "p0").node("node-9").build();
        let err = connector(store).daemon_address(&pod).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
