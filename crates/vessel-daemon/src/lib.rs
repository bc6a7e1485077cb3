//! Vessel Daemon Library
//!
//! Core functionality for the Vessel daemon:
//! - Proxmox VE client for container creation, task polling, and address
//!   resolution
//! - Provisioning orchestration with deferred address reconciliation
//! - SQLite storage for container records, credentials encrypted at rest
//! - Webhook HTTP surface for CI pipelines

pub mod provision;
pub mod proxmox;
pub mod server;
pub mod storage;
