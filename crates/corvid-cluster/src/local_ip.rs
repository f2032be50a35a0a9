//! Local address discovery.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::{ClusterError, Result};

/// Enumerate the addresses of all local network interfaces.
pub fn interface_addrs() -> std::io::Result<Vec<IpAddr>> {
    Ok(if_addrs::get_if_addrs()?
        .into_iter()
        .map(|iface| iface.ip())
        .collect())
}

/// Pick the first non-loopback IPv4 address in enumeration order.
///
/// Interface order comes from the operating system, so on multi-homed hosts
/// the chosen address is whatever is listed first. Set an advertise host in
/// the cluster configuration to pin it.
pub fn first_non_loopback_ipv4<I>(addrs: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
        _ => None,
    })
}

/// Discover the local IPv4 address using the given address source.
pub fn discover<F>(source: F) -> Result<String>
where
    F: FnOnce() -> std::io::Result<Vec<IpAddr>>,
{
    let addrs = source().map_err(ClusterError::InterfaceDiscovery)?;
    first_non_loopback_ipv4(addrs)
        .map(|ip| ip.to_string())
        .ok_or(ClusterError::NoLocalIp)
}
