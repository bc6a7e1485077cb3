//! Database models for the Vessel daemon.

use serde::{Deserialize, Serialize};

/// Container record from the database.
///
/// `password_enc` is the vault envelope; plaintext credentials never touch
/// this struct.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Container {
    pub id: i64,
    /// Hypervisor-assigned identifier (vmid), unique across records.
    pub vm_id: String,
    pub name: String,
    pub ip_address: Option<String>,
    pub username: String,
    pub password_enc: String,
    pub status: String,
    pub ci_job_ref: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Container lifecycle status enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Creating,
    Running,
    Stopped,
    Error,
}

impl ContainerStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "creating" => Some(Self::Creating),
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
