//! Crypto boundary over container rows.
//!
//! [`ContainerStore`] wraps the raw queries with the credential vault:
//! passwords are encrypted before they reach SQL and decrypted only on an
//! explicit read. Code above this layer never sees an envelope; code below
//! it never sees plaintext.

use std::sync::Arc;

use vessel_crypto::{CryptoError, Vault};

use super::db::{Database, DatabaseError};
use super::models::{Container, ContainerStatus};
use super::queries::NewContainer;

/// Errors from the container store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Credential error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Vault-aware persistence handle for container records.
#[derive(Clone)]
pub struct ContainerStore {
    db: Database,
    vault: Arc<Vault>,
}

impl ContainerStore {
    pub fn new(db: Database, vault: Arc<Vault>) -> Self {
        Self { db, vault }
    }

    /// Persist a new container record, encrypting the password.
    pub async fn insert(
        &self,
        vm_id: &str,
        name: &str,
        username: &str,
        password: &str,
        ci_job_ref: Option<&str>,
    ) -> Result<Container, StoreError> {
        let password_enc = self.vault.encrypt(password)?.unwrap_or_default();
        let container = self
            .db
            .create_container(&NewContainer {
                vm_id,
                name,
                username,
                password_enc: &password_enc,
                ci_job_ref,
            })
            .await?;
        Ok(container)
    }

    /// Look up a container by its hypervisor-assigned id.
    pub async fn find_by_vm_id(&self, vm_id: &str) -> Result<Container, StoreError> {
        Ok(self.db.get_container_by_vm_id(vm_id).await?)
    }

    /// Record a resolved address and promote the record to `running`.
    pub async fn mark_running(&self, vm_id: &str, address: &str) -> Result<(), StoreError> {
        Ok(self.db.set_container_address(vm_id, address).await?)
    }

    /// Update the lifecycle status of a record.
    pub async fn update_status(
        &self,
        vm_id: &str,
        status: ContainerStatus,
    ) -> Result<(), StoreError> {
        Ok(self.db.update_container_status(vm_id, status).await?)
    }

    /// All container records, newest first.
    pub async fn list(&self) -> Result<Vec<Container>, StoreError> {
        Ok(self.db.list_containers().await?)
    }

    /// Decrypt a record's stored credential.
    pub fn reveal_password(&self, container: &Container) -> Result<Option<String>, StoreError> {
        Ok(self.vault.decrypt(Some(container.password_enc.as_str()))?)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use vessel_crypto::VaultConfig;

    use super::*;

    async fn test_store() -> ContainerStore {
        let db = Database::open_in_memory().await.unwrap();
        let vault = Arc::new(
            Vault::new(&VaultConfig {
                key_material: "store-test-key".into(),
            })
            .unwrap(),
        );
        ContainerStore::new(db, vault)
    }

    #[tokio::test]
    async fn insert_encrypts_password_at_rest() {
        let store = test_store().await;
        let container = store
            .insert("101", "ci-build", "root", "plaintext-pw", None)
            .await
            .unwrap();

        assert_ne!(container.password_enc, "plaintext-pw");
        assert!(container.password_enc.contains(':'));
        assert!(!container.password_enc.contains("plaintext"));
    }

    #[tokio::test]
    async fn reveal_returns_original_password() {
        let store = test_store().await;
        let container = store
            .insert("101", "ci-build", "root", "plaintext-pw", None)
            .await
            .unwrap();

        let revealed = store.reveal_password(&container).unwrap();
        assert_eq!(revealed.as_deref(), Some("plaintext-pw"));
    }

    #[tokio::test]
    async fn mark_running_flows_through() {
        let store = test_store().await;
        store
            .insert("101", "ci-build", "root", "pw", None)
            .await
            .unwrap();

        store.mark_running("101", "10.0.0.5").await.unwrap();
        let fetched = store.find_by_vm_id("101").await.unwrap();
        assert_eq!(fetched.status, "running");
        assert_eq!(fetched.ip_address.as_deref(), Some("10.0.0.5"));
    }
}
