//! Address helpers for network faults.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::{ChaosError, Result};

fn parse_cidr(raw: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = raw.split_once('/')?;
    let addr: Ipv4Addr = addr.trim().parse().ok()?;
    let prefix: u8 = prefix.trim().parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((addr, prefix))
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

/// `true` when `ip` falls inside `cidr`. A bare address is treated as /32.
pub fn cidr_contains(cidr: &str, ip: &str) -> bool {
    let Ok(ip) = ip.trim().parse::<Ipv4Addr>() else {
        return false;
    };
    let (net, prefix) = match parse_cidr(cidr) {
        Some(c) => c,
        None => match cidr.trim().parse::<Ipv4Addr>() {
            Ok(addr) => (addr, 32),
            Err(_) => return false,
        },
    };
    let m = mask(prefix);
    u32::from(net) & m == u32::from(ip) & m
}

/// Turn external targets into CIDRs: CIDRs pass through, bare IPv4
/// addresses become /32, hostnames resolve to their first A record.
/// IPv6 is rejected; an unresolvable hostname fails the whole call.
pub async fn resolve_cidrs(targets: &[String]) -> Result<Vec<String>> {
    let mut cidrs = Vec::with_capacity(targets.len());
    for raw in targets {
        let target = raw.trim();
        if target.contains('/') {
            if parse_cidr(target).is_none() {
                return Err(ChaosError::Inject(format!(
                    "{} is not a valid IPv4 CIDR",
                    target
                )));
            }
            cidrs.push(target.to_string());
            continue;
        }

        match target.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => {
                cidrs.push(format!("{}/32", v4));
                continue;
            }
            Ok(IpAddr::V6(_)) => {
                return Err(ChaosError::Inject(format!(
                    "IPv6 address {} is not supported",
                    target
                )));
            }
            Err(_) => {}
        }

        let addrs = tokio::net::lookup_host((target, 0))
            .await
            .map_err(|e| ChaosError::Inject(format!("failed to resolve {}: {}", target, e)))?;
        let first = addrs
            .map(|a| a.ip())
            .find_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| ChaosError::Inject(format!("{} has no IPv4 address", target)))?;
        log::debug!("[NetUtils] Resolved {} to {}", target, first);
        cidrs.push(format!("{}/32", first));
    }
    Ok(cidrs)
}
