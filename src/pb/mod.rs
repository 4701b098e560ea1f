//! Checked-in protobuf messages and gRPC clients.
//!
//! Three services are spoken: the per-node chaos daemon, the per-pod
//! filesystem fault server, and the chaos DNS resolver. Messages are plain
//! prost structs; clients share `GrpcClient` for the unary call plumbing.

pub mod chaosdaemon;
pub mod chaosfs;
pub mod dns;

use std::future::Future;
use std::time::Duration;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

use crate::error::RpcError;

/// Unary-call wrapper over a tonic channel.
#[derive(Debug, Clone)]
pub struct GrpcClient {
    inner: tonic::client::Grpc<Channel>,
}

impl GrpcClient {
    pub fn new(channel: Channel) -> Self {
        GrpcClient {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Dial the endpoint and wrap the resulting channel.
    pub async fn connect(endpoint: Endpoint) -> Result<Self, tonic::transport::Error> {
        let channel = endpoint.connect().await?;
        Ok(Self::new(channel))
    }

    /// Issue one unary call on `path` (`/<package>.<Service>/<Method>`).
    pub async fn unary<Req, Resp>(
        &mut self,
        path: &'static str,
        request: Req,
    ) -> Result<Resp, tonic::Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::new(
                tonic::Code::Unknown,
                format!("Service was not ready: {}", e),
            )
        })?;
        let codec: tonic::codec::ProstCodec<Req, Resp> = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static(path);
        let response = self
            .inner
            .unary(tonic::Request::new(request), path, codec)
            .await?;
        Ok(response.into_inner())
    }
}

/// Dial `http://<addr>` with connect and per-request deadlines.
pub async fn dial(addr: &str, timeout: Duration) -> Result<GrpcClient, RpcError> {
    let uri = if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    };
    let connect_err = |reason: String| RpcError::Connect {
        addr: addr.to_string(),
        reason,
    };
    let endpoint = Endpoint::from_shared(uri)
        .map_err(|e| connect_err(e.to_string()))?
        .connect_timeout(timeout)
        .timeout(timeout);
    GrpcClient::connect(endpoint)
        .await
        .map_err(|e| connect_err(e.to_string()))
}

/// Run one RPC future under a deadline, mapping failures into `RpcError`.
pub async fn call<T, F>(method: &str, after: Duration, fut: F) -> Result<T, RpcError>
where
    F: Future<Output = Result<T, tonic::Status>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(Ok(resp)) => Ok(resp),
        Ok(Err(status)) if status.code() == tonic::Code::DeadlineExceeded => {
            Err(RpcError::Timeout {
                method: method.to_string(),
                after,
            })
        }
        Ok(Err(status)) => Err(RpcError::Status {
            method: method.to_string(),
            message: status.message().to_string(),
        }),
        Err(_) => Err(RpcError::Timeout {
            method: method.to_string(),
            after,
        }),
    }
}
