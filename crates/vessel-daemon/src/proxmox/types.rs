//! Proxmox VE API response types and net-config parsing.
//!
//! Deserialization structs matching the `/api2/json` response shapes the
//! client consumes, plus the parser for the comma-delimited `net0` spec.

use std::net::Ipv4Addr;

use serde::Deserialize;

/// Generic `/api2/json` envelope: every endpoint nests its payload under
/// a top-level `data` key.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Task status from `GET /nodes/{node}/tasks/{upid}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatus {
    /// "running" while the task executes, "stopped" once it terminates.
    pub status: String,
    /// Present once stopped; "0" is success, anything else is failure.
    #[serde(default)]
    pub exitstatus: Option<String>,
}

/// Container runtime status from `GET /nodes/{node}/lxc/{vmid}/status/current`.
#[derive(Debug, Clone, Deserialize)]
pub struct CtStatus {
    pub status: String,
}

/// Container config from `GET /nodes/{node}/lxc/{vmid}/config` (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct CtConfig {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub net0: Option<String>,
}

/// One guest interface from `GET /nodes/{node}/lxc/{vmid}/interfaces`.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestInterface {
    pub name: String,
    #[serde(default, rename = "ip-addresses")]
    pub ip_addresses: Vec<GuestAddress>,
}

/// One address reported by the in-guest agent.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestAddress {
    #[serde(rename = "ip-address")]
    pub ip_address: String,
    #[serde(rename = "ip-address-type")]
    pub ip_address_type: String,
}

/// Addressing declared by a container's `net0` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetAddressing {
    /// `ip=<addr>/<prefix>`: statically assigned, known up front.
    Static(String),
    /// `ip=dhcp` (or no `ip` key): assigned at runtime, ask the guest.
    Dynamic,
}

/// Parse the comma-delimited `key=value` net spec, e.g.
/// `name=eth0,bridge=vmbr0,ip=dhcp` or `name=eth0,bridge=vmbr0,ip=10.0.0.5/24`.
///
/// A static address is returned with its routing prefix stripped.
pub fn parse_net_addressing(net: &str) -> NetAddressing {
    for part in net.split(',') {
        if let Some(value) = part.strip_prefix("ip=") {
            if value.eq_ignore_ascii_case("dhcp") || value.eq_ignore_ascii_case("manual") {
                return NetAddressing::Dynamic;
            }
            let addr = value.split('/').next().unwrap_or(value);
            return NetAddressing::Static(addr.to_string());
        }
    }
    NetAddressing::Dynamic
}

/// Scan agent-reported interfaces for the primary interface's first
/// non-loopback IPv4 address.
///
/// The primary interface is `eth0` when present, otherwise the first
/// interface that is not `lo`.
pub fn pick_guest_ipv4(interfaces: &[GuestInterface]) -> Option<String> {
    let primary = interfaces
        .iter()
        .find(|i| i.name == "eth0")
        .or_else(|| interfaces.iter().find(|i| i.name != "lo"))?;

    primary
        .ip_addresses
        .iter()
        .find(|a| {
            a.ip_address_type == "ipv4"
                && a.ip_address
                    .parse::<Ipv4Addr>()
                    .is_ok_and(|ip| !ip.is_loopback())
        })
        .map(|a| a.ip_address.clone())
}
