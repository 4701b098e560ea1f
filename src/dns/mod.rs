//! Chaos DNS resolver client.
//!
//! DNS chaos registers `(name, action, pods, patterns)` with a dedicated
//! resolver; matching queries from those pods get an error or a random
//! answer. Patterns are shell-style globs (`?` and `*`).

use async_trait::async_trait;
use glob::Pattern;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{RpcError, ValidationError};
use crate::models::ObjectKey;
use crate::pb::{self, dns as dnspb};

/// Only letters, digits, `.`, `-`, `?` and `*` are accepted.
pub fn validate_pattern(pattern: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidParameter {
        name: "domainNamePatterns".to_string(),
        reason: format!("{:?}: {}", pattern, reason),
    };
    if pattern.is_empty() {
        return Err(invalid("empty pattern"));
    }
    if let Some(c) = pattern
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '?' | '*')))
    {
        return Err(invalid(&format!("unsupported character {:?}", c)));
    }
    Pattern::new(pattern).map_err(|e| invalid(&e.to_string()))?;
    Ok(())
}

/// Whether `domain` is matched by any pattern. An empty list matches all.
pub fn matches_any<S: AsRef<str>>(patterns: &[S], domain: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let domain = domain.trim_end_matches('.');
    patterns.iter().any(|p| {
        Pattern::new(p.as_ref())
            .map(|pat| pat.matches(domain))
            .unwrap_or(false)
    })
}

/// One `SetDNSChaos` registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsChaosRule {
    pub name: String,
    pub action: String,
    pub pods: Vec<ObjectKey>,
    pub patterns: Vec<String>,
    pub scope: String,
}

#[async_trait]
pub trait DnsClient: Send + Sync {
    async fn set_dns_chaos(&self, rule: DnsChaosRule) -> Result<(), RpcError>;
    async fn cancel_dns_chaos(&self, name: &str, pods: &[ObjectKey]) -> Result<(), RpcError>;
}

fn pb_pods(pods: &[ObjectKey]) -> Vec<dnspb::Pod> {
    pods.iter()
        .map(|p| dnspb::Pod {
            namespace: p.namespace.clone(),
            name: p.name.clone(),
        })
        .collect()
}

fn check_response(method: &str, resp: dnspb::DnsChaosResponse) -> Result<(), RpcError> {
    if resp.result {
        Ok(())
    } else {
        Err(RpcError::Status {
            method: method.to_string(),
            message: format!("dns server error {}", resp.msg),
        })
    }
}

/// Port the chaos DNS resolver serves its control API on.
pub const DNS_GRPC_PORT: u16 = 9288;

/// gRPC client for the chaos DNS resolver.
pub struct GrpcDnsClient {
    addr: String,
    timeout: Duration,
}

impl GrpcDnsClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        GrpcDnsClient {
            addr: addr.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DnsClient for GrpcDnsClient {
    async fn set_dns_chaos(&self, rule: DnsChaosRule) -> Result<(), RpcError> {
        let mut client = dnspb::DnsClient::new(pb::dial(&self.addr, self.timeout).await?);
        let req = dnspb::SetDnsChaosRequest {
            name: rule.name,
            action: rule.action,
            pods: pb_pods(&rule.pods),
            patterns: rule.patterns,
            scope: rule.scope,
        };
        let resp = pb::call("SetDNSChaos", self.timeout, client.set_dns_chaos(req)).await?;
        check_response("SetDNSChaos", resp)
    }

    async fn cancel_dns_chaos(&self, name: &str, pods: &[ObjectKey]) -> Result<(), RpcError> {
        let mut client = dnspb::DnsClient::new(pb::dial(&self.addr, self.timeout).await?);
        let req = dnspb::CancelDnsChaosRequest {
            name: name.to_string(),
            pods: pb_pods(pods),
        };
        let resp = pb::call("CancelDNSChaos", self.timeout, client.cancel_dns_chaos(req)).await?;
        check_response("CancelDNSChaos", resp)
    }
}

/// In-memory resolver keeping the active rules.
#[derive(Default, Clone)]
pub struct RecordingDnsClient {
    rules: Arc<Mutex<Vec<DnsChaosRule>>>,
}

impl RecordingDnsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> Vec<DnsChaosRule> {
        self.rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Action applied to a query from `pod` for `domain`, if any.
    pub fn resolve_action(&self, pod: &ObjectKey, domain: &str) -> Option<String> {
        self.rules()
            .into_iter()
            .find(|r| r.pods.contains(pod) && matches_any(&r.patterns, domain))
            .map(|r| r.action)
    }
}

#[async_trait]
impl DnsClient for RecordingDnsClient {
    async fn set_dns_chaos(&self, rule: DnsChaosRule) -> Result<(), RpcError> {
        let mut rules = self
            .rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match rules.iter_mut().find(|r| r.name == rule.name) {
            Some(existing) => {
                for pod in rule.pods {
                    if !existing.pods.contains(&pod) {
                        existing.pods.push(pod);
                    }
                }
                existing.patterns = rule.patterns;
                existing.action = rule.action;
                existing.scope = rule.scope;
            }
            None => rules.push(rule),
        }
        Ok(())
    }

    async fn cancel_dns_chaos(&self, name: &str, pods: &[ObjectKey]) -> Result<(), RpcError> {
        let mut rules = self
            .rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(rule) = rules.iter_mut().find(|r| r.name == name) {
            if pods.is_empty() {
                rule.pods.clear();
            } else {
                rule.pods.retain(|p| !pods.contains(p));
            }
        }
        rules.retain(|r| !r.pods.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("google.com").is_ok());
        assert!(validate_pattern("*.chaos-mesh.org").is_ok());
        assert!(validate_pattern("chaos-mes?.org").is_ok());
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("a[b].com").is_err());
        assert!(validate_pattern("a b.com").is_err());
    }

    #[test]
    fn test_matches_any() {
        let patterns = ["*.chaos-mesh.org", "goog?e.com"];
        assert!(matches_any(&patterns, "www.chaos-mesh.org"));
        assert!(matches_any(&patterns, "google.com."));
        assert!(!matches_any(&patterns, "example.com"));
        assert!(matches_any::<&str>(&[], "anything"));
    }

    #[tokio::test]
    async fn test_recording_client_set_cancel() {
        let client = RecordingDnsClient::new();
        let p0 = ObjectKey::new("default", "p0");
        let p1 = ObjectKey::new("default", "p1");
        for pod in [&p0, &p1] {
            client
                .set_dns_chaos(DnsChaosRule {
                    name: "dns".into(),
                    action: "error".into(),
                    pods: vec![pod.clone()],
                    patterns: vec!["*.svc".into()],
                    scope: "all".into(),
                })
                .await
                .unwrap();
        }
        assert_eq!(client.rules().len(), 1);
        assert_eq!(client.resolve_action(&p0, "a.svc").as_deref(), Some("error"));
        assert_eq!(client.resolve_action(&p0, "a.org"), None);

        client.cancel_dns_chaos("dns", &[p0.clone()]).await.unwrap();
        assert_eq!(client.resolve_action(&p0, "a.svc"), None);
        assert!(client.resolve_action(&p1, "a.svc").is_some());

        client.cancel_dns_chaos("dns", &[p1.clone()]).await.unwrap();
        assert!(client.rules().is_empty());
    }
}
