//! Volume backup and restore handles
//!
//! Both take the shared repository lock, so they run alongside each other
//! but never overlap init, prune or forget on the same repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::ResourceExt;
use strongbox_common::crd::RepositoryType;
use strongbox_common::Error;
use tracing::info;

use crate::ensurer::RepositoryEnsurer;
use crate::executor::RepositoryExecutor;
use crate::lock::LockRegistry;
use crate::operation::RepoOperation;

/// Which repository a volume operation targets
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeRepository {
    /// Namespace owning the volume
    pub volume_namespace: String,
    /// Storage location holding the repository
    pub backup_storage_location: String,
    /// Backend implementation
    pub repository_type: RepositoryType,
}

impl VolumeRepository {
    /// A restic repository for `volume_namespace` in `location`
    pub fn restic(volume_namespace: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            volume_namespace: volume_namespace.into(),
            backup_storage_location: location.into(),
            repository_type: RepositoryType::Restic,
        }
    }
}

struct Shared {
    locks: Arc<LockRegistry>,
    ensurer: Arc<RepositoryEnsurer>,
    executor: Arc<RepositoryExecutor>,
}

impl Shared {
    async fn run(&self, target: &VolumeRepository, operation: RepoOperation) -> Result<(), Error> {
        let repo = self
            .ensurer
            .ensure_repo(
                &target.volume_namespace,
                &target.backup_storage_location,
                target.repository_type,
            )
            .await?;
        let name = repo.name_any();
        let _guard = self.locks.acquire(&name, operation.lock_mode()).await;
        info!(backup_repository = %name, operation = %operation, "running volume operation");
        self.executor
            .exec(
                operation.command(&repo.spec.repository_identifier),
                &repo.spec.backup_storage_location,
            )
            .await
    }
}

/// Backs up volume directories into repositories
pub struct Backupper {
    inner: Shared,
}

impl Backupper {
    pub(crate) fn new(
        locks: Arc<LockRegistry>,
        ensurer: Arc<RepositoryEnsurer>,
        executor: Arc<RepositoryExecutor>,
    ) -> Self {
        Self {
            inner: Shared {
                locks,
                ensurer,
                executor,
            },
        }
    }

    /// Back up `path` into the repository of `target`
    pub async fn backup(
        &self,
        target: &VolumeRepository,
        path: &str,
        host: &str,
        tags: BTreeMap<String, String>,
    ) -> Result<(), Error> {
        self.inner
            .run(
                target,
                RepoOperation::Backup {
                    path: path.to_string(),
                    host: host.to_string(),
                    tags,
                },
            )
            .await
    }
}

/// Restores snapshots into volume directories
pub struct Restorer {
    inner: Shared,
}

impl Restorer {
    pub(crate) fn new(
        locks: Arc<LockRegistry>,
        ensurer: Arc<RepositoryEnsurer>,
        executor: Arc<RepositoryExecutor>,
    ) -> Self {
        Self {
            inner: Shared {
                locks,
                ensurer,
                executor,
            },
        }
    }

    /// Restore `snapshot_id` from the repository of `target` into `target_dir`
    pub async fn restore(
        &self,
        target: &VolumeRepository,
        snapshot_id: &str,
        target_dir: &str,
    ) -> Result<(), Error> {
        self.inner
            .run(
                target,
                RepoOperation::Restore {
                    snapshot_id: snapshot_id.to_string(),
                    target: target_dir.to_string(),
                },
            )
            .await
    }
}
