//! Filesystem fault server: the per-method fault map and its RPC surface.
//!
//! Every FUSE callback asks `FaultRegistry::decide` whether to fail or delay
//! the syscall. Reads are lock-free loads of an immutable snapshot; writers
//! build a new map and swap it in, so a reader sees a whole `FaultContext`
//! for a method or none at all.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{RpcError, ValidationError};
use crate::pb::{self, chaosfs};

/// Every hookable filesystem method.
pub const METHODS: [&str; 31] = [
    "open",
    "read",
    "write",
    "mkdir",
    "rmdir",
    "opendir",
    "fsync",
    "flush",
    "release",
    "truncate",
    "getattr",
    "chown",
    "chmod",
    "utimens",
    "allocate",
    "getlk",
    "setlk",
    "setlkw",
    "statfs",
    "readlink",
    "symlink",
    "create",
    "access",
    "link",
    "mknod",
    "rename",
    "unlink",
    "getxattr",
    "listxattr",
    "removexattr",
    "setxattr",
];

/// Random errnos are drawn from E2BIG..EXFULL.
const RANDOM_ERRNO_MIN: u32 = 0x7;
const RANDOM_ERRNO_MAX: u32 = 0x36;

/// Fault attached to one method. Never mutated once published.
#[derive(Debug, Clone)]
pub struct FaultContext {
    pub errno: Option<u32>,
    pub random: bool,
    pub pct: u32,
    pub path: Option<Regex>,
    pub delay: Duration,
}

impl FaultContext {
    pub fn from_request(req: &chaosfs::Request) -> Result<Self, ValidationError> {
        let path = if req.path.is_empty() {
            None
        } else {
            Some(Regex::new(&req.path).map_err(|e| ValidationError::InvalidParameter {
                name: "path".to_string(),
                reason: e.to_string(),
            })?)
        };
        Ok(FaultContext {
            errno: (req.errno != 0).then_some(req.errno),
            random: req.random,
            pct: req.pct,
            path,
            delay: Duration::from_micros(u64::from(req.delay_us)),
        })
    }
}

/// Outcome of one fault decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultDecision {
    pub errno: Option<u32>,
    pub delay: Duration,
}

/// Process-wide `method -> fault` map.
pub struct FaultRegistry {
    faults: ArcSwap<HashMap<String, Arc<FaultContext>>>,
}

impl Default for FaultRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultRegistry {
    pub fn new() -> Self {
        FaultRegistry {
            faults: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn methods(&self) -> Vec<String> {
        METHODS.iter().map(|m| m.to_string()).collect()
    }

    /// Publish `ctx` for each method, replacing any previous record.
    pub fn set_fault<S: AsRef<str>>(&self, methods: &[S], ctx: FaultContext) {
        let ctx = Arc::new(ctx);
        self.faults.rcu(|current| {
            let mut next = HashMap::clone(current);
            for m in methods {
                next.insert(m.as_ref().to_string(), Arc::clone(&ctx));
            }
            next
        });
    }

    pub fn set_fault_all(&self, ctx: FaultContext) {
        self.set_fault(&METHODS, ctx);
    }

    pub fn recover_method<S: AsRef<str>>(&self, methods: &[S]) {
        self.faults.rcu(|current| {
            let mut next = HashMap::clone(current);
            for m in methods {
                next.remove(m.as_ref());
            }
            next
        });
    }

    pub fn recover_all(&self) {
        self.faults.store(Arc::new(HashMap::new()));
    }

    pub fn is_injected(&self) -> bool {
        !self.faults.load().is_empty()
    }

    pub fn get(&self, method: &str) -> Option<Arc<FaultContext>> {
        self.faults.load().get(method).cloned()
    }

    /// Decide whether the call to `method` on `path` is faulted.
    pub fn decide(&self, method: &str, path: &str) -> Option<FaultDecision> {
        let ctx = self.get(method)?;
        let mut rng = rand::thread_rng();
        if rng.gen_range(0..100) >= ctx.pct {
            return None;
        }
        if let Some(re) = &ctx.path {
            if !re.is_match(path) {
                return None;
            }
        }

        let errno = match ctx.errno {
            Some(e) => Some(e),
            None if ctx.random => Some(rng.gen_range(RANDOM_ERRNO_MIN..RANDOM_ERRNO_MAX)),
            None => None,
        };
        log::debug!(
            "[FaultServer] Inject fault: method={}, path={}, errno={:?}, delay={:?}",
            method,
            path,
            errno,
            ctx.delay
        );
        Some(FaultDecision {
            errno,
            delay: ctx.delay,
        })
    }

    /// Apply the decision for a hooked call: sleep the delay, return the errno.
    pub async fn inject(&self, method: &str, path: &str) -> Option<u32> {
        let decision = self.decide(method, path)?;
        if !decision.delay.is_zero() {
            tokio::time::sleep(decision.delay).await;
        }
        decision.errno
    }
}

// ============================================================================
// RPC SURFACE
// ============================================================================

/// Client view of one fault server.
#[async_trait]
pub trait FaultServer: Send + Sync {
    async fn methods(&self) -> Result<Vec<String>, RpcError>;
    async fn set_fault(&self, req: chaosfs::Request) -> Result<(), RpcError>;
    async fn set_fault_all(&self, req: chaosfs::Request) -> Result<(), RpcError>;
    async fn recover_method(&self, req: chaosfs::Request) -> Result<(), RpcError>;
    async fn recover_all(&self) -> Result<(), RpcError>;
    async fn injected(&self) -> Result<bool, RpcError>;
}

/// Resolves a fault-server address to a client.
#[async_trait]
pub trait FaultServerConnector: Send + Sync {
    async fn connect(&self, addr: &str) -> Result<Arc<dyn FaultServer>, RpcError>;
}

/// In-process fault server backed by a `FaultRegistry`.
#[derive(Default, Clone)]
pub struct LocalFaultServer {
    registry: Arc<FaultRegistry>,
}

impl LocalFaultServer {
    pub fn new(registry: Arc<FaultRegistry>) -> Self {
        LocalFaultServer { registry }
    }

    pub fn registry(&self) -> &Arc<FaultRegistry> {
        &self.registry
    }
}

fn rejected(method: &str, err: ValidationError) -> RpcError {
    RpcError::Status {
        method: method.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl FaultServer for LocalFaultServer {
    async fn methods(&self) -> Result<Vec<String>, RpcError> {
        Ok(self.registry.methods())
    }

    async fn set_fault(&self, req: chaosfs::Request) -> Result<(), RpcError> {
        log::info!("[FaultServer] Set fault: {:?}", req);
        let ctx = FaultContext::from_request(&req).map_err(|e| rejected("SetFault", e))?;
        self.registry.set_fault(&req.methods, ctx);
        Ok(())
    }

    async fn set_fault_all(&self, req: chaosfs::Request) -> Result<(), RpcError> {
        log::info!("[FaultServer] Set fault on all methods: {:?}", req);
        let ctx = FaultContext::from_request(&req).map_err(|e| rejected("SetFaultAll", e))?;
        self.registry.set_fault_all(ctx);
        Ok(())
    }

    async fn recover_method(&self, req: chaosfs::Request) -> Result<(), RpcError> {
        self.registry.recover_method(&req.methods);
        Ok(())
    }

    async fn recover_all(&self) -> Result<(), RpcError> {
        log::info!("[FaultServer] Recover all faults");
        self.registry.recover_all();
        Ok(())
    }

    async fn injected(&self) -> Result<bool, RpcError> {
        Ok(self.registry.is_injected())
    }
}

/// Hands out one `LocalFaultServer` per address, created on first use.
#[derive(Default)]
pub struct LocalFaultServerConnector {
    servers: Mutex<HashMap<String, LocalFaultServer>>,
}

impl LocalFaultServerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(&self, addr: &str) -> LocalFaultServer {
        let mut servers = self
            .servers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        servers.entry(addr.to_string()).or_default().clone()
    }

    pub fn addresses(&self) -> Vec<String> {
        let servers = self
            .servers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut addrs: Vec<String> = servers.keys().cloned().collect();
        addrs.sort();
        addrs
    }
}

#[async_trait]
impl FaultServerConnector for LocalFaultServerConnector {
    async fn connect(&self, addr: &str) -> Result<Arc<dyn FaultServer>, RpcError> {
        Ok(Arc::new(self.server(addr)))
    }
}

/// gRPC client for a remote fault server.
pub struct GrpcFaultServer {
    addr: String,
    timeout: Duration,
}

impl GrpcFaultServer {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        GrpcFaultServer {
            addr: addr.into(),
            timeout,
        }
    }

    async fn client(&self) -> Result<chaosfs::InjureClient, RpcError> {
        Ok(chaosfs::InjureClient::new(
            pb::dial(&self.addr, self.timeout).await?,
        ))
    }
}

#[async_trait]
impl FaultServer for GrpcFaultServer {
    async fn methods(&self) -> Result<Vec<String>, RpcError> {
        let mut c = self.client().await?;
        let resp = pb::call("Methods", self.timeout, c.methods()).await?;
        Ok(resp.methods)
    }

    async fn set_fault(&self, req: chaosfs::Request) -> Result<(), RpcError> {
        let mut c = self.client().await?;
        pb::call("SetFault", self.timeout, c.set_fault(req)).await
    }

    async fn set_fault_all(&self, req: chaosfs::Request) -> Result<(), RpcError> {
        let mut c = self.client().await?;
        pb::call("SetFaultAll", self.timeout, c.set_fault_all(req)).await
    }

    async fn recover_method(&self, req: chaosfs::Request) -> Result<(), RpcError> {
        let mut c = self.client().await?;
        pb::call("RecoverMethod", self.timeout, c.recover_method(req)).await
    }

    async fn recover_all(&self) -> Result<(), RpcError> {
        let mut c = self.client().await?;
        pb::call("RecoverAll", self.timeout, c.recover_all()).await
    }

    async fn injected(&self) -> Result<bool, RpcError> {
        let mut c = self.client().await?;
        let resp = pb::call("Injected", self.timeout, c.injected()).await?;
        Ok(resp.injected)
    }
}

pub struct GrpcFaultServerConnector {
    timeout: Duration,
}

impl GrpcFaultServerConnector {
    pub fn new(timeout: Duration) -> Self {
        GrpcFaultServerConnector { timeout }
    }
}

#[async_trait]
impl FaultServerConnector for GrpcFaultServerConnector {
    async fn connect(&self, addr: &str) -> Result<Arc<dyn FaultServer>, RpcError> {
        Ok(Arc::new(GrpcFaultServer::new(addr, self.timeout)))
    }
}
