//! `pb.Injure` messages and client (filesystem fault server).

use super::GrpcClient;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(string, repeated, tag = "1")]
    pub methods: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(uint32, tag = "2")]
    pub errno: u32,
    #[prost(bool, tag = "3")]
    pub random: bool,
    #[prost(uint32, tag = "4")]
    pub pct: u32,
    #[prost(string, tag = "5")]
    pub path: ::prost::alloc::string::String,
    #[prost(uint32, tag = "6")]
    pub delay_us: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(string, repeated, tag = "1")]
    pub methods: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct InjectStatus {
    #[prost(bool, tag = "1")]
    pub injected: bool,
}

/// Client for `pb.Injure`.
#[derive(Debug, Clone)]
pub struct InjureClient {
    inner: GrpcClient,
}

impl InjureClient {
    pub fn new(inner: GrpcClient) -> Self {
        InjureClient { inner }
    }

    pub async fn methods(&mut self) -> Result<Response, tonic::Status> {
        self.inner.unary("/pb.Injure/Methods", ()).await
    }

    pub async fn recover_all(&mut self) -> Result<(), tonic::Status> {
        self.inner.unary("/pb.Injure/RecoverAll", ()).await
    }

    pub async fn recover_method(&mut self, request: Request) -> Result<(), tonic::Status> {
        self.inner.unary("/pb.Injure/RecoverMethod", request).await
    }

    pub async fn set_fault(&mut self, request: Request) -> Result<(), tonic::Status> {
        self.inner.unary("/pb.Injure/SetFault", request).await
    }

    pub async fn set_fault_all(&mut self, request: Request) -> Result<(), tonic::Status> {
        self.inner.unary("/pb.Injure/SetFaultAll", request).await
    }

    pub async fn injected(&mut self) -> Result<InjectStatus, tonic::Status> {
        self.inner.unary("/pb.Injure/Injected", ()).await
    }
}
