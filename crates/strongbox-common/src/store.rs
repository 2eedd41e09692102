//! Resource store abstraction
//!
//! The repository subsystem reads and writes cluster objects only through
//! [`ResourceStore`], which keeps the reconciler, executor and ensurer
//! testable without an API server.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use crate::crd::{BackupRepository, BackupRepositoryPatch, BackupStorageLocation};
use crate::{Error, FIELD_MANAGER};

/// Trait abstracting the Kubernetes operations the repository subsystem needs
///
/// `get_*` methods return `Ok(None)` for objects that do not exist so callers
/// can tell deletion apart from API failures.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get a BackupRepository by namespace and name
    async fn get_repository(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BackupRepository>, Error>;

    /// Create a BackupRepository
    async fn create_repository(&self, repo: &BackupRepository) -> Result<BackupRepository, Error>;

    /// Apply a merge-style partial update and return the updated object
    async fn patch_repository(
        &self,
        repo: &BackupRepository,
        patch: &BackupRepositoryPatch,
    ) -> Result<BackupRepository, Error>;

    /// Get a BackupStorageLocation by namespace and name
    async fn get_storage_location(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BackupStorageLocation>, Error>;

    /// Read a single key from a Secret
    async fn get_secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, Error>;
}

/// Shared handle to a resource store
pub type SharedResourceStore = Arc<dyn ResourceStore>;

/// Real Kubernetes implementation of [`ResourceStore`]
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    /// Create a store wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get_repository(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BackupRepository>, Error> {
        let api: Api<BackupRepository> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_repository(&self, repo: &BackupRepository) -> Result<BackupRepository, Error> {
        let namespace = repo
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("store", "repository has no namespace"))?;
        let api: Api<BackupRepository> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&PostParams::default(), repo).await?)
    }

    async fn patch_repository(
        &self,
        repo: &BackupRepository,
        patch: &BackupRepositoryPatch,
    ) -> Result<BackupRepository, Error> {
        let name = repo
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("store", "repository has no name"))?;
        let namespace = repo
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("store", "repository has no namespace"))?;
        let api: Api<BackupRepository> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(FIELD_MANAGER);

        let mut updated = repo.clone();
        if let Some(spec) = patch.spec_patch() {
            debug!(backup_repository = %name, patch = %spec, "patching spec");
            updated = api.patch(name, &params, &Patch::Merge(&spec)).await?;
        }
        if let Some(status) = patch.status_patch() {
            debug!(backup_repository = %name, patch = %status, "patching status");
            updated = api.patch_status(name, &params, &Patch::Merge(&status)).await?;
        }
        Ok(updated)
    }

    async fn get_storage_location(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BackupStorageLocation>, Error> {
        let api: Api<BackupStorageLocation> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Ok(None);
        };
        Ok(secret
            .data
            .and_then(|mut data| data.remove(key))
            .map(|bytes| bytes.0))
    }
}
