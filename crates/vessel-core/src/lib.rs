//! Vessel Core Library
//!
//! Shared functionality for Vessel components:
//! - SQLite pool helpers and the `define_database!` macro
//! - The poll-until-deadline primitive used by hypervisor polling loops
//! - Tracing/logging initialisation

pub mod db;
pub mod poll;
pub mod tracing_init;

pub use db::{DatabaseError, unix_timestamp};
pub use poll::{PollConfig, PollError, PollStep, poll_until};
