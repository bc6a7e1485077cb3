//! Container provisioning orchestrator.
//!
//! [`Provisioner`] coordinates the hypervisor client, the credential vault,
//! and the record store: it owns the creation workflow (generate password →
//! create on hypervisor → persist → deferred address reconciliation) and the
//! credential-access workflow. Each call runs its own independent polling
//! sequence; the provisioner holds no cross-call locks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use vessel_core::db::DatabaseError;
use vessel_crypto::{DEFAULT_PASSWORD_LEN, generate_password};

use crate::proxmox::{CtSpec, HypervisorError, ProxmoxClient};
use crate::storage::{ContainerStatus, ContainerStore, StoreError};

use super::request::{AccessBundle, ContainerSummary, ProvisionReceipt, ProvisionRequest};

/// Default account provisioned into new containers.
const DEFAULT_USERNAME: &str = "root";

/// Errors from the provisioning orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Container not found: {vm_id}")]
    NotFound { vm_id: String },

    #[error("Container {vm_id} is not ready (status: {status})")]
    NotReady { vm_id: String, status: String },

    #[error("Provisioning failed: {0}")]
    Provisioning(#[from] HypervisorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Schedule for the deferred address reconciler.
#[derive(Debug, Clone, Copy)]
pub struct ProvisionerConfig {
    /// Wait before the first resolution attempt, giving the guest time to
    /// obtain a lease.
    pub resolve_initial_delay: Duration,
    /// Spacing between subsequent attempts.
    pub resolve_retry_delay: Duration,
    /// Give-up threshold; the record stays `creating` once exhausted.
    pub resolve_max_attempts: u32,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            resolve_initial_delay: Duration::from_secs(10),
            resolve_retry_delay: Duration::from_secs(10),
            resolve_max_attempts: 12,
        }
    }
}

/// High-level container provisioning coordinator.
pub struct Provisioner {
    client: Arc<ProxmoxClient>,
    store: ContainerStore,
    config: ProvisionerConfig,
}

impl Provisioner {
    /// Create a new provisioner over the given client and store.
    pub fn new(client: Arc<ProxmoxClient>, store: ContainerStore, config: ProvisionerConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Provision a new container.
    ///
    /// Returns as soon as the hypervisor reports the container running and
    /// the record is persisted with status `creating`; address resolution
    /// continues in a detached background task. A hypervisor-level failure
    /// propagates with nothing persisted, so no orphan `creating` rows.
    pub async fn create_container(
        &self,
        request: ProvisionRequest,
    ) -> Result<ProvisionReceipt, ProvisionError> {
        validate_request(&request)?;

        // Always system-generated; a caller-supplied secret would be weak
        // or already sitting in CI logs.
        let password = generate_password(DEFAULT_PASSWORD_LEN);

        let spec = CtSpec {
            vmid: None,
            hostname: request.hostname.clone(),
            password: password.clone(),
            ostemplate: request.ostemplate.clone(),
            cores: request.cores,
            memory_mb: request.memory_mb,
            swap_mb: request.swap_mb,
            disk_gb: request.disk_gb,
            net_spec: None,
            unprivileged: None,
            onboot: None,
            extra: request.extra.clone(),
        };

        let created = self.client.create_container(spec).await?;

        let vm_id = created.vmid.to_string();
        let username = request.username.as_deref().unwrap_or(DEFAULT_USERNAME);
        let container = self
            .store
            .insert(
                &vm_id,
                &request.name,
                username,
                &password,
                request.ci_job_ref.as_deref(),
            )
            .await?;

        info!(
            vm_id = %vm_id,
            name = %request.name,
            "Container provisioned, address resolution scheduled"
        );

        self.spawn_address_reconciler(created.vmid);

        Ok(ProvisionReceipt {
            id: container.id,
            vm_id,
            status: container.status,
        })
    }

    /// Detached reconciliation task: resolve the container's address and
    /// promote the record to `running`.
    ///
    /// Runs independently of the originating request: cancelling the
    /// webhook call must not cancel this. Retries are bounded; once
    /// exhausted the record stays `creating` and a warning is logged.
    fn spawn_address_reconciler(&self, vmid: u32) {
        let client = Arc::clone(&self.client);
        let store = self.store.clone();
        let config = self.config;

        tokio::spawn(async move {
            tokio::time::sleep(config.resolve_initial_delay).await;
            let vm_id = vmid.to_string();

            for attempt in 1..=config.resolve_max_attempts {
                if let Some(address) = client.resolve_address(vmid).await {
                    match store.mark_running(&vm_id, &address).await {
                        Ok(()) => {
                            info!(vm_id = %vm_id, address = %address, "Container running");
                            return;
                        }
                        Err(e) => {
                            error!(vm_id = %vm_id, error = %e, "Failed to persist resolved address");
                        }
                    }
                } else {
                    debug!(vm_id = %vm_id, attempt, "Address not yet available");
                }

                if attempt < config.resolve_max_attempts {
                    tokio::time::sleep(config.resolve_retry_delay).await;
                }
            }

            warn!(
                vm_id = %vm_id,
                attempts = config.resolve_max_attempts,
                "Giving up on address resolution; record stays creating"
            );
        });
    }

    /// Fetch the decrypted credential bundle for a running container.
    pub async fn get_access(&self, vm_id: &str) -> Result<AccessBundle, ProvisionError> {
        let container = match self.store.find_by_vm_id(vm_id).await {
            Ok(c) => c,
            Err(StoreError::Database(DatabaseError::NotFound(_))) => {
                return Err(ProvisionError::NotFound {
                    vm_id: vm_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if container.status != ContainerStatus::Running.as_str() {
            return Err(ProvisionError::NotReady {
                vm_id: vm_id.to_string(),
                status: container.status,
            });
        }

        let password = self.store.reveal_password(&container)?.unwrap_or_default();
        Ok(AccessBundle {
            address: container.ip_address,
            username: container.username,
            password,
        })
    }

    /// List all containers, newest first, credentials decrypted for display.
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>, ProvisionError> {
        let containers = self.store.list().await?;
        let mut summaries = Vec::with_capacity(containers.len());
        for container in containers {
            // A row with an undecryptable envelope still lists; its
            // credential shows as absent.
            let password = self.store.reveal_password(&container).unwrap_or_else(|e| {
                warn!(vm_id = %container.vm_id, error = %e, "Could not decrypt stored credential");
                None
            });
            summaries.push(ContainerSummary {
                id: container.id,
                vm_id: container.vm_id,
                name: container.name,
                status: container.status,
                address: container.ip_address,
                username: container.username,
                password,
                ci_job_ref: container.ci_job_ref,
                created_at: container.created_at,
                updated_at: container.updated_at,
            });
        }
        Ok(summaries)
    }

    /// Get a reference to the underlying store.
    pub const fn store(&self) -> &ContainerStore {
        &self.store
    }
}

fn validate_request(request: &ProvisionRequest) -> Result<(), ProvisionError> {
    if request.name.trim().is_empty() {
        return Err(ProvisionError::Validation {
            message: "name must not be empty".to_string(),
        });
    }
    if request.hostname.trim().is_empty() {
        return Err(ProvisionError::Validation {
            message: "hostname must not be empty".to_string(),
        });
    }
    if !request
        .hostname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ProvisionError::Validation {
            message: "hostname may only contain letters, digits, and hyphens".to_string(),
        });
    }
    // swap_mb is excluded: swap 0 is a valid configuration.
    for (field, value) in [
        ("cores", request.cores),
        ("memory_mb", request.memory_mb),
        ("disk_gb", request.disk_gb),
    ] {
        if value == Some(0) {
            return Err(ProvisionError::Validation {
                message: format!("{field} must be positive"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use vessel_crypto::{Vault, VaultConfig};

    use crate::proxmox::{CtDefaults, PollTimings, ProxmoxConfig};
    use crate::storage::Database;

    use super::*;

    fn test_request() -> ProvisionRequest {
        serde_json::from_value(serde_json::json!({
            "name": "ci-build",
            "hostname": "ci-01",
        }))
        .unwrap()
    }

    /// Client pointing at a closed port; tests that never reach the
    /// hypervisor use it as a stand-in.
    fn unreachable_client() -> Arc<ProxmoxClient> {
        Arc::new(
            ProxmoxClient::new(&ProxmoxConfig {
                base_url: "https://127.0.0.1:1".into(),
                token_id: "ci@pam!vessel".into(),
                token_secret: "unused".into(),
                node: "pve".into(),
                insecure_tls: true,
                request_timeout: Duration::from_secs(1),
                timings: PollTimings::default(),
                defaults: CtDefaults::default(),
            })
            .unwrap(),
        )
    }

    async fn test_provisioner() -> Provisioner {
        let db = Database::open_in_memory().await.unwrap();
        let vault = Arc::new(
            Vault::new(&VaultConfig {
                key_material: "provisioner-test-key".into(),
            })
            .unwrap(),
        );
        Provisioner::new(
            unreachable_client(),
            ContainerStore::new(db, vault),
            ProvisionerConfig::default(),
        )
    }

    #[test]
    fn empty_name_fails_validation() {
        let mut request = test_request();
        request.name = String::new();
        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, ProvisionError::Validation { .. }));
    }

    #[test]
    fn empty_hostname_fails_validation() {
        let mut request = test_request();
        request.hostname = "   ".into();
        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, ProvisionError::Validation { .. }));
    }

    #[test]
    fn hostname_with_invalid_characters_fails_validation() {
        let mut request = test_request();
        request.hostname = "ci_01!".into();
        let err = validate_request(&request).unwrap_err();
        assert!(err.to_string().contains("hostname"));
    }

    #[test]
    fn zero_sizing_fails_validation() {
        let mut request = test_request();
        request.cores = Some(0);
        assert!(validate_request(&request).is_err());

        let mut request = test_request();
        request.disk_gb = Some(0);
        assert!(validate_request(&request).is_err());

        // Swap 0 is a valid configuration.
        let mut request = test_request();
        request.swap_mb = Some(0);
        assert!(validate_request(&request).is_ok());
    }

    #[test]
    fn valid_request_passes_validation() {
        assert!(validate_request(&test_request()).is_ok());
    }

    #[tokio::test]
    async fn get_access_unknown_id_is_not_found() {
        let provisioner = test_provisioner().await;
        let result = provisioner.get_access("999").await;
        assert!(matches!(result, Err(ProvisionError::NotFound { .. })));
    }

    #[tokio::test]
    async fn get_access_while_creating_is_not_ready() {
        let provisioner = test_provisioner().await;
        provisioner
            .store()
            .insert("101", "ci-build", "root", "pw-plain", None)
            .await
            .unwrap();

        let result = provisioner.get_access("101").await;
        match result {
            Err(ProvisionError::NotReady { vm_id, status }) => {
                assert_eq!(vm_id, "101");
                assert_eq!(status, "creating");
            }
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_access_on_error_record_is_not_ready() {
        let provisioner = test_provisioner().await;
        provisioner
            .store()
            .insert("101", "ci-build", "root", "pw-plain", None)
            .await
            .unwrap();
        provisioner
            .store()
            .update_status("101", ContainerStatus::Error)
            .await
            .unwrap();

        let result = provisioner.get_access("101").await;
        assert!(matches!(result, Err(ProvisionError::NotReady { .. })));
    }

    #[tokio::test]
    async fn get_access_when_running_returns_credentials() {
        let provisioner = test_provisioner().await;
        provisioner
            .store()
            .insert("101", "ci-build", "root", "pw-plain", None)
            .await
            .unwrap();
        provisioner
            .store()
            .mark_running("101", "192.168.1.50")
            .await
            .unwrap();

        let bundle = provisioner.get_access("101").await.unwrap();
        assert_eq!(bundle.address.as_deref(), Some("192.168.1.50"));
        assert_eq!(bundle.username, "root");
        assert_eq!(bundle.password, "pw-plain");
    }

    #[tokio::test]
    async fn list_decrypts_for_display() {
        let provisioner = test_provisioner().await;
        provisioner
            .store()
            .insert("101", "first", "root", "pw-one", None)
            .await
            .unwrap();
        provisioner
            .store()
            .insert("102", "second", "root", "pw-two", Some("job-7"))
            .await
            .unwrap();

        let summaries = provisioner.list_containers().await.unwrap();
        assert_eq!(summaries.len(), 2);
        // Newest first.
        assert_eq!(summaries[0].vm_id, "102");
        assert_eq!(summaries[0].password.as_deref(), Some("pw-two"));
        assert_eq!(summaries[0].ci_job_ref.as_deref(), Some("job-7"));
        assert_eq!(summaries[1].password.as_deref(), Some("pw-one"));
    }
}
