//! ipset naming and construction.

use k8s_openapi::api::core::v1::Pod;
use sha1::{Digest, Sha1};

use crate::pb::chaosdaemon::IpSet;
use crate::store::PodExt;

/// Kernel limit on ipset name length.
pub const IPSET_NAME_MAX: usize = 31;

pub const SOURCE_POSTFIX: &str = "source";
pub const TARGET_POSTFIX: &str = "target";
pub const NETEM_POSTFIX: &str = "netem";

const KEEP_PREFIX: usize = 5;

/// `<name>_<postfix>`, compressed to `<first 5>_<sha1 hex of rest>_<postfix>`
/// when longer than `max_len`.
pub fn compress_name(name: &str, max_len: usize, postfix: &str) -> String {
    let full = if postfix.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", name, postfix)
    };
    if full.len() <= max_len {
        return full;
    }

    let split = name
        .char_indices()
        .nth(KEEP_PREFIX)
        .map(|(i, _)| i)
        .unwrap_or(name.len());
    let (keep, rest) = name.split_at(split);
    let digest = hex::encode(Sha1::digest(rest.as_bytes()));

    let suffix_len = if postfix.is_empty() { 0 } else { postfix.len() + 1 };
    let hash_len = max_len
        .saturating_sub(keep.len() + 1 + suffix_len)
        .min(digest.len());

    let mut out = format!("{}_{}", keep, &digest[..hash_len]);
    if !postfix.is_empty() {
        out.push('_');
        out.push_str(postfix);
    }
    out
}

/// ipset for a chaos object and role.
pub fn ipset_name(chaos_name: &str, postfix: &str) -> String {
    compress_name(chaos_name, IPSET_NAME_MAX, postfix)
}

/// Build the set of pod IPs plus extra CIDRs. Pods without an IP are skipped.
pub fn build_ipset(name: String, pods: &[&Pod], extra_cidrs: &[String]) -> IpSet {
    let mut cidrs: Vec<String> = pods
        .iter()
        .map(|p| p.pod_ip())
        .filter(|ip| !ip.is_empty())
        .map(|ip| format!("{}/32", ip))
        .collect();
    cidrs.extend(extra_cidrs.iter().cloned());
    cidrs.sort();
    cidrs.dedup();
    IpSet { name, cidrs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::fixtures;

    #[test]
    fn test_short_name_untouched() {
        assert_eq!(ipset_name("partition", SOURCE_POSTFIX), "partition_source");
    }

    #[test]
    fn test_long_name_compressed() {
        let name = "a-very-long-network-partition-experiment-name";
        let set = ipset_name(name, TARGET_POSTFIX);
        assert_eq!(set.len(), IPSET_NAME_MAX);
        assert!(set.starts_with("a-ver_"));
        assert!(set.ends_with("_target"));
        assert_ne!(set, ipset_name(name, SOURCE_POSTFIX));
        assert_eq!(set, ipset_name(name, TARGET_POSTFIX));
    }

    #[test]
    fn test_compress_without_postfix() {
        let chain = compress_name("a-very-long-network-partition-experiment-name", 20, "");
        assert_eq!(chain.len(), 20);
    }

    #[test]
    fn test_build_ipset() {
        let a = fixtures::pod("default", "a").ip("10.0.0.1").build();
        let b = fixtures::pod("default", "b").build();
        let set = build_ipset("s".into(), &[&a, &b], &["192.168.0.0/16".into()]);
        assert_eq!(set.cidrs, vec!["10.0.0.1/32", "192.168.0.0/16"]);
    }
}
