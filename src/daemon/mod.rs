//! Access to the per-node chaos daemon.
//!
//! Dispatchers talk to `ChaosDaemon`, obtained per target from a
//! `DaemonConnector`. The gRPC connector resolves the pod's node, dials its
//! first address on the configured port and wraps every call in a deadline.

pub mod client;
pub mod recording;
pub mod stress;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;

use crate::error::{Result, RpcError};
use crate::pb::chaosdaemon::{EmatchFilter, IpSet, Netem, Qdisc, Rule, Tbf, TcFilter};

pub use self::client::{GrpcDaemon, GrpcDaemonConnector};
pub use self::recording::{DaemonCall, RecordingConnector, RecordingDaemon};
pub use self::stress::StressorRegistry;

/// Default daemon port, overridable through `CHAOS_DAEMON_PORT`.
pub const DEFAULT_DAEMON_PORT: u16 = 31767;

/// RPC surface of the node agent. Every call but the stressor pair runs in
/// the namespaces of `container_id`.
#[async_trait]
pub trait ChaosDaemon: Send + Sync {
    async fn set_netem(&self, container_id: &str, netem: Netem) -> Result<(), RpcError>;

    async fn delete_netem(&self, container_id: &str) -> Result<(), RpcError>;

    async fn set_tbf(&self, container_id: &str, tbf: Tbf) -> Result<(), RpcError>;

    async fn add_qdisc(&self, container_id: &str, qdisc: Qdisc) -> Result<(), RpcError>;

    async fn add_ematch_filter(&self, container_id: &str, filter: EmatchFilter) -> Result<(), RpcError>;

    async fn del_tc_filter(&self, container_id: &str, filter: TcFilter) -> Result<(), RpcError>;

    /// Create or replace the ipset with exactly `ipset.cidrs`.
    async fn flush_ipset(&self, container_id: &str, ipset: IpSet) -> Result<(), RpcError>;

    async fn flush_iptables(&self, container_id: &str, rule: Rule) -> Result<(), RpcError>;

    async fn set_time_offset(
        &self,
        container_id: &str,
        sec: i64,
        nsec: i64,
        clk_ids_mask: u64,
    ) -> Result<(), RpcError>;

    async fn recover_time_offset(&self, container_id: &str) -> Result<(), RpcError>;

    async fn container_kill(&self, container_id: &str) -> Result<(), RpcError>;

    async fn container_get_pid(&self, container_id: &str) -> Result<u32, RpcError>;

    /// Start stress-ng with `stressors`; returns the instance uuid.
    async fn exec_stressors(&self, stressors: &str, uuid: &str) -> Result<String, RpcError>;

    async fn cancel_stressors(&self, uuid: &str) -> Result<(), RpcError>;

    async fn set_dns_server(&self, container_id: &str, dns_server: &str, enable: bool) -> Result<(), RpcError>;
}

/// Hands out a daemon handle for the node a pod runs on.
#[async_trait]
pub trait DaemonConnector: Send + Sync {
    async fn connect(&self, pod: &Pod) -> Result<Arc<dyn ChaosDaemon>>;
}
