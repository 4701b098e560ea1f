//! `pb.DNS` messages and client (chaos DNS resolver).

use super::GrpcClient;

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Pod {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetDnsChaosRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub action: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "3")]
    pub pods: ::prost::alloc::vec::Vec<Pod>,
    #[prost(string, repeated, tag = "4")]
    pub patterns: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "5")]
    pub scope: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CancelDnsChaosRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub pods: ::prost::alloc::vec::Vec<Pod>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DnsChaosResponse {
    #[prost(bool, tag = "1")]
    pub result: bool,
    #[prost(string, tag = "2")]
    pub msg: ::prost::alloc::string::String,
}

/// Client for `pb.DNS`.
#[derive(Debug, Clone)]
pub struct DnsClient {
    inner: GrpcClient,
}

impl DnsClient {
    pub fn new(inner: GrpcClient) -> Self {
        DnsClient { inner }
    }

    pub async fn set_dns_chaos(
        &mut self,
        request: SetDnsChaosRequest,
    ) -> Result<DnsChaosResponse, tonic::Status> {
        self.inner.unary("/pb.DNS/SetDNSChaos", request).await
    }

    pub async fn cancel_dns_chaos(
        &mut self,
        request: CancelDnsChaosRequest,
    ) -> Result<DnsChaosResponse, tonic::Status> {
        self.inner.unary("/pb.DNS/CancelDNSChaos", request).await
    }
}
