//! Database queries for the Vessel daemon.

use vessel_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};
use super::models::{Container, ContainerStatus};

/// Fields for a new container row. The password arrives already encrypted;
/// see [`super::store::ContainerStore`] for the crypto boundary.
#[derive(Debug)]
pub struct NewContainer<'a> {
    pub vm_id: &'a str,
    pub name: &'a str,
    pub username: &'a str,
    pub password_enc: &'a str,
    pub ci_job_ref: Option<&'a str>,
}

impl Database {
    /// Insert a new container record with status `creating`.
    pub async fn create_container(
        &self,
        new: &NewContainer<'_>,
    ) -> Result<Container, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO containers (vm_id, name, username, password_enc, status, ci_job_ref, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(new.vm_id)
        .bind(new.name)
        .bind(new.username)
        .bind(new.password_enc)
        .bind(ContainerStatus::Creating.as_str())
        .bind(new.ci_job_ref)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_container_by_vm_id(new.vm_id).await
    }

    /// Get a container by its hypervisor-assigned id.
    pub async fn get_container_by_vm_id(&self, vm_id: &str) -> Result<Container, DatabaseError> {
        sqlx::query_as::<_, Container>("SELECT * FROM containers WHERE vm_id = ?")
            .bind(vm_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Container {vm_id}")))
    }

    /// Update container status.
    pub async fn update_container_status(
        &self,
        vm_id: &str,
        status: ContainerStatus,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query("UPDATE containers SET status = ?, updated_at = ? WHERE vm_id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(vm_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Record a resolved network address and mark the container running.
    ///
    /// One write for both fields; re-running resolution overwrites the
    /// address idempotently.
    pub async fn set_container_address(
        &self,
        vm_id: &str,
        address: &str,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "UPDATE containers SET ip_address = ?, status = ?, updated_at = ? WHERE vm_id = ?",
        )
        .bind(address)
        .bind(ContainerStatus::Running.as_str())
        .bind(now)
        .bind(vm_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// List all containers, newest first.
    pub async fn list_containers(&self) -> Result<Vec<Container>, DatabaseError> {
        let containers = sqlx::query_as::<_, Container>(
            "SELECT * FROM containers ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(containers)
    }
}
