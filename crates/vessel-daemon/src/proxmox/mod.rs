//! Proxmox VE integration.
//!
//! Protocol adapter for the hypervisor's REST API: container creation,
//! asynchronous task polling, runtime status, and network address
//! resolution.

mod client;
mod types;

#[cfg(test)]
mod tests;

pub use client::{
    CreatedContainer, CtDefaults, CtSpec, HypervisorError, PollTimings, ProxmoxClient,
    ProxmoxConfig,
};
pub use types::{
    CtConfig, CtStatus, GuestAddress, GuestInterface, NetAddressing, TaskStatus,
    parse_net_addressing, pick_guest_ipv4,
};
