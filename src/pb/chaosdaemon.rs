//! `chaosdaemon.ChaosDaemon` messages and client.

use super::GrpcClient;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerRequest {
    #[prost(message, optional, tag = "1")]
    pub action: ::core::option::Option<ContainerAction>,
    #[prost(string, tag = "2")]
    pub container_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerAction {
    #[prost(enumeration = "container_action::Action", tag = "1")]
    pub action: i32,
}

pub mod container_action {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Action {
        Kill = 0,
        Getpid = 1,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerResponse {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NetemRequest {
    #[prost(message, optional, tag = "1")]
    pub netem: ::core::option::Option<Netem>,
    #[prost(string, tag = "2")]
    pub container_id: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Netem {
    #[prost(uint32, tag = "1")]
    pub time_us: u32,
    #[prost(uint32, tag = "2")]
    pub jitter_us: u32,
    #[prost(float, tag = "3")]
    pub delay_corr: f32,
    #[prost(uint32, tag = "4")]
    pub limit: u32,
    #[prost(float, tag = "5")]
    pub loss: f32,
    #[prost(float, tag = "6")]
    pub loss_corr: f32,
    #[prost(float, tag = "8")]
    pub duplicate: f32,
    #[prost(float, tag = "9")]
    pub duplicate_corr: f32,
    #[prost(float, tag = "12")]
    pub corrupt: f32,
    #[prost(float, tag = "13")]
    pub corrupt_corr: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TbfRequest {
    #[prost(message, optional, tag = "1")]
    pub tbf: ::core::option::Option<Tbf>,
    #[prost(string, tag = "2")]
    pub container_id: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Tbf {
    #[prost(uint64, tag = "1")]
    pub rate_bps: u64,
    #[prost(uint32, tag = "2")]
    pub limit: u32,
    #[prost(uint32, tag = "3")]
    pub buffer: u32,
    #[prost(uint64, tag = "4")]
    pub peakrate: u64,
    #[prost(uint32, tag = "5")]
    pub minburst: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct TcHandle {
    #[prost(uint32, tag = "1")]
    pub major: u32,
    #[prost(uint32, tag = "2")]
    pub minor: u32,
}

impl TcHandle {
    pub fn new(major: u32, minor: u32) -> Self {
        TcHandle { major, minor }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QdiscRequest {
    #[prost(message, optional, tag = "1")]
    pub qdisc: ::core::option::Option<Qdisc>,
    #[prost(string, tag = "2")]
    pub container_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Qdisc {
    #[prost(string, tag = "1")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub parent: ::core::option::Option<TcHandle>,
    #[prost(message, optional, tag = "3")]
    pub handle: ::core::option::Option<TcHandle>,
    #[prost(string, repeated, tag = "4")]
    pub args: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EmatchFilterRequest {
    #[prost(message, optional, tag = "1")]
    pub filter: ::core::option::Option<EmatchFilter>,
    #[prost(string, tag = "2")]
    pub container_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EmatchFilter {
    #[prost(string, tag = "1")]
    pub r#match: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub parent: ::core::option::Option<TcHandle>,
    #[prost(message, optional, tag = "3")]
    pub classid: ::core::option::Option<TcHandle>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TcFilterRequest {
    #[prost(message, optional, tag = "1")]
    pub filter: ::core::option::Option<TcFilter>,
    #[prost(string, tag = "2")]
    pub container_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TcFilter {
    #[prost(message, optional, tag = "1")]
    pub parent: ::core::option::Option<TcHandle>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpSetRequest {
    #[prost(message, optional, tag = "1")]
    pub ipset: ::core::option::Option<IpSet>,
    #[prost(string, tag = "2")]
    pub container_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpSet {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub cidrs: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpTablesRequest {
    #[prost(message, optional, tag = "1")]
    pub rule: ::core::option::Option<Rule>,
    #[prost(string, tag = "2")]
    pub container_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Rule {
    #[prost(enumeration = "rule::Action", tag = "1")]
    pub action: i32,
    #[prost(enumeration = "rule::Direction", tag = "2")]
    pub direction: i32,
    #[prost(string, tag = "3")]
    pub set: ::prost::alloc::string::String,
}

pub mod rule {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Action {
        Add = 0,
        Delete = 1,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Direction {
        Input = 0,
        Output = 1,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimeRequest {
    #[prost(string, tag = "1")]
    pub container_id: ::prost::alloc::string::String,
    #[prost(int64, tag = "2")]
    pub sec: i64,
    #[prost(int64, tag = "3")]
    pub nsec: i64,
    #[prost(uint64, tag = "4")]
    pub clk_ids_mask: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StressRequest {
    #[prost(string, tag = "1")]
    pub stressors: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub uuid: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StressResponse {
    #[prost(string, tag = "1")]
    pub uuid: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetDnsServerRequest {
    #[prost(string, tag = "1")]
    pub container_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub dns_server: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub enable: bool,
}

/// Client for `chaosdaemon.ChaosDaemon`.
#[derive(Debug, Clone)]
pub struct ChaosDaemonClient {
    inner: GrpcClient,
}

impl ChaosDaemonClient {
    pub fn new(inner: GrpcClient) -> Self {
        ChaosDaemonClient { inner }
    }

    pub async fn set_netem(&mut self, request: NetemRequest) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/SetNetem", request)
            .await
    }

    pub async fn delete_netem(&mut self, request: NetemRequest) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/DeleteNetem", request)
            .await
    }

    pub async fn set_tbf(&mut self, request: TbfRequest) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/SetTbf", request)
            .await
    }

    pub async fn add_qdisc(&mut self, request: QdiscRequest) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/AddQdisc", request)
            .await
    }

    pub async fn add_ematch_filter(
        &mut self,
        request: EmatchFilterRequest,
    ) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/AddEmatchFilter", request)
            .await
    }

    pub async fn del_tc_filter(&mut self, request: TcFilterRequest) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/DelTcFilter", request)
            .await
    }

    pub async fn flush_ipset(&mut self, request: IpSetRequest) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/FlushIpSet", request)
            .await
    }

    pub async fn flush_iptables(&mut self, request: IpTablesRequest) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/FlushIptables", request)
            .await
    }

    pub async fn set_time_offset(&mut self, request: TimeRequest) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/SetTimeOffset", request)
            .await
    }

    pub async fn recover_time_offset(
        &mut self,
        request: TimeRequest,
    ) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/RecoverTimeOffset", request)
            .await
    }

    pub async fn container_kill(&mut self, request: ContainerRequest) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/ContainerKill", request)
            .await
    }

    pub async fn container_get_pid(
        &mut self,
        request: ContainerRequest,
    ) -> Result<ContainerResponse, tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/ContainerGetPid", request)
            .await
    }

    pub async fn exec_stressors(
        &mut self,
        request: StressRequest,
    ) -> Result<StressResponse, tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/ExecStressors", request)
            .await
    }

    pub async fn cancel_stressors(&mut self, request: StressRequest) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/CancelStressors", request)
            .await
    }

    pub async fn set_dns_server(
        &mut self,
        request: SetDnsServerRequest,
    ) -> Result<(), tonic::Status> {
        self.inner
            .unary("/chaosdaemon.ChaosDaemon/SetDNSServer", request)
            .await
    }
}
