//! Provisioning request and response payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Validated input to a container provisioning call.
///
/// Arrives from the webhook layer already schema-checked by serde; the
/// orchestrator re-validates the semantic constraints it cares about. Note
/// there is no password field: container credentials are always
/// system-generated.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionRequest {
    /// Operator-facing label for the record.
    pub name: String,
    /// Hostname assigned to the container.
    pub hostname: String,
    #[serde(default)]
    pub cores: Option<u32>,
    #[serde(default)]
    pub memory_mb: Option<u32>,
    #[serde(default)]
    pub swap_mb: Option<u32>,
    #[serde(default)]
    pub disk_gb: Option<u32>,
    /// OS image reference; falls back to the daemon default template.
    #[serde(default)]
    pub ostemplate: Option<String>,
    /// Account provisioned into the container; defaults to root.
    #[serde(default)]
    pub username: Option<String>,
    /// Upstream CI job correlation reference.
    #[serde(default)]
    pub ci_job_ref: Option<String>,
    /// Raw passthrough parameters for advanced hypervisor options.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// What the caller gets back immediately after submission.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReceipt {
    pub id: i64,
    pub vm_id: String,
    pub status: String,
}

/// Decrypted credential bundle for a running container.
#[derive(Debug, Clone, Serialize)]
pub struct AccessBundle {
    pub address: Option<String>,
    pub username: String,
    pub password: String,
}

/// One row of the operator-facing container listing.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub id: i64,
    pub vm_id: String,
    pub name: String,
    pub status: String,
    pub address: Option<String>,
    pub username: String,
    pub password: Option<String>,
    pub ci_job_ref: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
