//! Get-or-create for BackupRepositories
//!
//! Backup and restore pipelines, and `Forget`, need a repository that the
//! controller has already initialized. The ensurer creates the resource if
//! needed and waits for the controller to move it out of `New`.

use std::collections::BTreeMap;
use std::time::Duration;

use kube::ResourceExt;
use strongbox_common::crd::{
    BackupRepository, BackupRepositoryPhase, BackupRepositorySpec, RepositoryType,
};
use strongbox_common::kube_utils::poll_until;
use strongbox_common::{
    Error, SharedResourceStore, REPOSITORY_TYPE_LABEL, STORAGE_LOCATION_LABEL,
    VOLUME_NAMESPACE_LABEL,
};
use tracing::{debug, info};

use crate::config::RepositoryConfig;
use crate::identifier::repository_name;

/// Finds or creates the repository for a volume namespace and location
pub struct RepositoryEnsurer {
    store: SharedResourceStore,
    namespace: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl RepositoryEnsurer {
    /// Create an ensurer
    pub fn new(store: SharedResourceStore, config: &RepositoryConfig) -> Self {
        Self {
            store,
            namespace: config.namespace.clone(),
            timeout: config.ensure_timeout,
            poll_interval: config.ensure_poll_interval,
        }
    }

    /// Return the ready repository, creating it and waiting if necessary
    pub async fn ensure_repo(
        &self,
        volume_namespace: &str,
        location_name: &str,
        repository_type: RepositoryType,
    ) -> Result<BackupRepository, Error> {
        let name = repository_name(volume_namespace, location_name, repository_type);

        let repo = match self.store.get_repository(&self.namespace, &name).await? {
            Some(repo) => repo,
            None => {
                self.create(&name, volume_namespace, location_name, repository_type)
                    .await?
            }
        };
        if check_ready(&repo)? {
            return Ok(repo);
        }

        debug!(backup_repository = %name, "waiting for repository to become ready");
        let store = self.store.clone();
        let namespace = self.namespace.clone();
        let polled = name.clone();
        poll_until(
            self.timeout,
            self.poll_interval,
            format!("timed out waiting for BackupRepository {} to become ready", name),
            || {
                let store = store.clone();
                let namespace = namespace.clone();
                let name = polled.clone();
                async move {
                    match store.get_repository(&namespace, &name).await? {
                        Some(repo) => check_ready(&repo),
                        None => Err(Error::not_found("BackupRepository", name)),
                    }
                }
            },
        )
        .await?;

        self.store
            .get_repository(&self.namespace, &name)
            .await?
            .ok_or_else(|| Error::not_found("BackupRepository", name))
    }

    async fn create(
        &self,
        name: &str,
        volume_namespace: &str,
        location_name: &str,
        repository_type: RepositoryType,
    ) -> Result<BackupRepository, Error> {
        let mut repo = BackupRepository::new(
            name,
            BackupRepositorySpec {
                backup_storage_location: location_name.to_string(),
                volume_namespace: volume_namespace.to_string(),
                repository_type,
                ..Default::default()
            },
        );
        repo.metadata.namespace = Some(self.namespace.clone());
        repo.metadata.labels = Some(BTreeMap::from([
            (VOLUME_NAMESPACE_LABEL.to_string(), volume_namespace.to_string()),
            (STORAGE_LOCATION_LABEL.to_string(), location_name.to_string()),
            (REPOSITORY_TYPE_LABEL.to_string(), repository_type.to_string()),
        ]));

        match self.store.create_repository(&repo).await {
            Ok(created) => {
                info!(backup_repository = %created.name_any(), "created backup repository");
                Ok(created)
            }
            // Another caller created it first
            Err(e) if e.is_conflict() => self
                .store
                .get_repository(&self.namespace, name)
                .await?
                .ok_or_else(|| Error::not_found("BackupRepository", name)),
            Err(e) => Err(e),
        }
    }
}

fn check_ready(repo: &BackupRepository) -> Result<bool, Error> {
    match repo.phase() {
        BackupRepositoryPhase::Ready => Ok(true),
        BackupRepositoryPhase::NotReady => Err(Error::resolution(
            repo.name_any(),
            format!("backup repository is not ready: {}", repo.message()),
        )),
        BackupRepositoryPhase::New => Ok(false),
    }
}
