//! Repository Manager
//!
//! Operation-level API over backend repositories. Every operation takes the
//! lock mode its [`RepoOperation`] requires, runs exactly one command through
//! the [`RepositoryExecutor`], and releases the lock on every path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use strongbox_common::crd::{BackupRepository, RepositoryType};
use strongbox_common::{Error, SharedResourceStore};
use tracing::{debug, info};

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use crate::config::RepositoryConfig;
use crate::credentials::CredentialsFileStore;
use crate::ensurer::RepositoryEnsurer;
use crate::exec::CommandExecutor;
use crate::executor::RepositoryExecutor;
use crate::lock::LockRegistry;
use crate::operation::{Advisory, RepoOperation};
use crate::podvolume::{Backupper, Restorer};

/// Maintenance frequency restic repositories suggest
pub const RESTIC_MAINTENANCE_FREQUENCY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A snapshot within the repository of a volume namespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotIdentifier {
    /// Namespace whose volumes the snapshot belongs to
    pub volume_namespace: String,
    /// Storage location holding the repository
    pub backup_storage_location: String,
    /// Backend implementation of the repository
    pub repository_type: RepositoryType,
    /// Backend snapshot id
    pub snapshot_id: String,
}

/// Operations on backend repositories
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait RepositoryManager: Send + Sync {
    /// Create the repository in the backend (exclusive)
    async fn init_repo(&self, repo: &BackupRepository) -> Result<(), Error>;

    /// Check the repository is reachable and credentials work (shared)
    async fn connect_to_repo(&self, repo: &BackupRepository) -> Result<(), Error>;

    /// Init followed by connect; the first failure aborts
    async fn prepare_repo(&self, repo: &BackupRepository) -> Result<(), Error>;

    /// Garbage-collect unreferenced data (exclusive)
    async fn prune_repo(&self, repo: &BackupRepository) -> Result<(), Error>;

    /// Remove stale backend locks (shared); failures are advisory
    async fn unlock_repo(&self, repo: &BackupRepository) -> Advisory;

    /// Remove one snapshot (exclusive); the repository is ensured first
    async fn forget(&self, snapshot: &SnapshotIdentifier) -> Result<(), Error>;

    /// Maintenance frequency suggested by the repository's backend
    async fn default_maintenance_frequency(
        &self,
        repo: &BackupRepository,
    ) -> Result<Option<Duration>, Error>;
}

/// [`RepositoryManager`] driving the restic CLI
pub struct ResticRepositoryManager {
    locks: Arc<LockRegistry>,
    executor: Arc<RepositoryExecutor>,
    ensurer: Arc<RepositoryEnsurer>,
}

impl ResticRepositoryManager {
    /// Create a manager and the executor and ensurer it owns
    pub fn new(
        store: SharedResourceStore,
        credentials: Arc<dyn CredentialsFileStore>,
        runner: Arc<dyn CommandExecutor>,
        config: &RepositoryConfig,
    ) -> Self {
        Self {
            locks: Arc::new(LockRegistry::new()),
            executor: Arc::new(RepositoryExecutor::new(
                store.clone(),
                credentials,
                runner,
                config,
            )),
            ensurer: Arc::new(RepositoryEnsurer::new(store, config)),
        }
    }

    /// The lock registry, for pipelines doing direct backend I/O
    pub fn locks(&self) -> Arc<LockRegistry> {
        self.locks.clone()
    }

    /// Handle for backing up volumes into repositories
    pub fn new_backupper(&self) -> Backupper {
        Backupper::new(
            self.locks.clone(),
            self.ensurer.clone(),
            self.executor.clone(),
        )
    }

    /// Handle for restoring volumes from repositories
    pub fn new_restorer(&self) -> Restorer {
        Restorer::new(
            self.locks.clone(),
            self.ensurer.clone(),
            self.executor.clone(),
        )
    }

    async fn run(&self, repo: &BackupRepository, operation: RepoOperation) -> Result<(), Error> {
        let name = repo.name_any();
        let _guard = self.locks.acquire(&name, operation.lock_mode()).await;
        debug!(backup_repository = %name, operation = %operation, "running repository operation");
        self.executor
            .exec(
                operation.command(&repo.spec.repository_identifier),
                &repo.spec.backup_storage_location,
            )
            .await
    }
}

#[async_trait]
impl RepositoryManager for ResticRepositoryManager {
    async fn init_repo(&self, repo: &BackupRepository) -> Result<(), Error> {
        self.run(repo, RepoOperation::Init).await
    }

    async fn connect_to_repo(&self, repo: &BackupRepository) -> Result<(), Error> {
        self.run(repo, RepoOperation::Connect).await
    }

    async fn prepare_repo(&self, repo: &BackupRepository) -> Result<(), Error> {
        self.init_repo(repo).await?;
        self.connect_to_repo(repo).await
    }

    async fn prune_repo(&self, repo: &BackupRepository) -> Result<(), Error> {
        self.run(repo, RepoOperation::Prune).await
    }

    async fn unlock_repo(&self, repo: &BackupRepository) -> Advisory {
        Advisory::from_result(self.run(repo, RepoOperation::Unlock).await)
    }

    async fn forget(&self, snapshot: &SnapshotIdentifier) -> Result<(), Error> {
        let repo = self
            .ensurer
            .ensure_repo(
                &snapshot.volume_namespace,
                &snapshot.backup_storage_location,
                snapshot.repository_type,
            )
            .await?;
        info!(
            backup_repository = %repo.name_any(),
            snapshot = %snapshot.snapshot_id,
            "forgetting snapshot"
        );
        self.run(
            &repo,
            RepoOperation::Forget {
                snapshot_id: snapshot.snapshot_id.clone(),
            },
        )
        .await
    }

    async fn default_maintenance_frequency(
        &self,
        repo: &BackupRepository,
    ) -> Result<Option<Duration>, Error> {
        match repo.spec.repository_type {
            RepositoryType::Restic => Ok(Some(RESTIC_MAINTENANCE_FREQUENCY)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use strongbox_common::crd::{
        BackupRepositoryPatch, BackupRepositoryPhase, BackupRepositorySpec,
        BackupStorageLocation, BackupStorageLocationSpec, ObjectStorageLocation,
    };
    use strongbox_common::MockResourceStore;

    use crate::credentials::MockCredentialsFileStore;
    use crate::exec::{CommandOutput, MockCommandExecutor};
    use crate::operation::LockMode;

    const IDENTIFIER: &str = "s3:s3.amazonaws.com/backups/restic/app";

    fn repo(phase: BackupRepositoryPhase) -> BackupRepository {
        let mut repo = BackupRepository::new(
            "app-default-restic",
            BackupRepositorySpec {
                backup_storage_location: "default".into(),
                volume_namespace: "app".into(),
                repository_identifier: IDENTIFIER.into(),
                ..Default::default()
            },
        );
        repo.metadata.namespace = Some("strongbox-system".into());
        BackupRepositoryPatch::default().phase(phase).apply_to(&mut repo);
        repo
    }

    fn location() -> BackupStorageLocation {
        BackupStorageLocation::new(
            "default",
            BackupStorageLocationSpec {
                provider: "aws".into(),
                object_storage: ObjectStorageLocation {
                    bucket: "backups".into(),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    fn store() -> MockResourceStore {
        let mut store = MockResourceStore::new();
        store
            .expect_get_storage_location()
            .returning(|_, _| Ok(Some(location())));
        store
    }

    fn credentials(dir: PathBuf) -> Arc<MockCredentialsFileStore> {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut creds = MockCredentialsFileStore::new();
        creds.expect_path().returning(move |_| {
            let path = dir.join(format!("pw-{}", counter.fetch_add(1, Ordering::SeqCst)));
            std::fs::write(&path, b"pw").unwrap();
            Ok(path)
        });
        Arc::new(creds)
    }

    type Calls = Arc<Mutex<Vec<Vec<String>>>>;

    /// Runner that records every argv and fails the sub-commands in `failing`
    fn runner(failing: &'static [&'static str]) -> (Arc<MockCommandExecutor>, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let mut runner = MockCommandExecutor::new();
        runner.expect_run().returning(move |argv, _| {
            let op = argv[1].clone();
            log.lock().unwrap().push(argv.to_vec());
            if failing.contains(&op.as_str()) {
                Ok(CommandOutput::failure(1, format!("{} failed", op)))
            } else {
                Ok(CommandOutput::success(""))
            }
        });
        (Arc::new(runner), calls)
    }

    fn ops(calls: &Calls) -> Vec<String> {
        calls.lock().unwrap().iter().map(|argv| argv[1].clone()).collect()
    }

    fn manager(
        store: MockResourceStore,
        failing: &'static [&'static str],
        dir: &tempfile::TempDir,
    ) -> (ResticRepositoryManager, Calls) {
        let (runner, calls) = runner(failing);
        let manager = ResticRepositoryManager::new(
            Arc::new(store),
            credentials(dir.path().to_path_buf()),
            runner,
            &RepositoryConfig::default(),
        );
        (manager, calls)
    }

    #[tokio::test]
    async fn prepare_runs_init_then_connect() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, calls) = manager(store(), &[], &dir);

        manager.prepare_repo(&repo(BackupRepositoryPhase::New)).await.unwrap();

        assert_eq!(ops(&calls), vec!["init", "snapshots"]);
    }

    #[tokio::test]
    async fn prepare_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, calls) = manager(store(), &["init"], &dir);

        let err = manager
            .prepare_repo(&repo(BackupRepositoryPhase::New))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("init failed"));
        assert_eq!(ops(&calls), vec!["init"]);
    }

    #[tokio::test]
    async fn unlock_failure_is_advisory() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(store(), &["unlock"], &dir);

        let outcome = manager.unlock_repo(&repo(BackupRepositoryPhase::Ready)).await;
        assert!(outcome.is_failed());

        let (manager, _) = self::manager(store(), &[], &dir);
        assert!(!manager.unlock_repo(&repo(BackupRepositoryPhase::Ready)).await.is_failed());
    }

    #[tokio::test]
    async fn prune_error_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, calls) = manager(store(), &["prune"], &dir);

        let err = manager
            .prune_repo(&repo(BackupRepositoryPhase::Ready))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandExecution { .. }));
        assert_eq!(ops(&calls), vec!["prune"]);
    }

    #[tokio::test]
    async fn lock_is_released_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(store(), &["prune"], &dir);

        let _ = manager.prune_repo(&repo(BackupRepositoryPhase::Ready)).await;

        let guard = tokio::time::timeout(
            Duration::from_secs(1),
            manager.locks().acquire("app-default-restic", LockMode::Exclusive),
        )
        .await
        .expect("lock must be free after a failed prune");
        assert_eq!(guard.mode(), LockMode::Exclusive);
    }

    #[tokio::test]
    async fn prune_waits_for_shared_holders() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, calls) = manager(store(), &[], &dir);
        let manager = Arc::new(manager);

        let shared = manager.locks().lock("app-default-restic").await;
        let pruning = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.prune_repo(&repo(BackupRepositoryPhase::Ready)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ops(&calls).is_empty());

        drop(shared);
        tokio::time::timeout(Duration::from_secs(5), pruning)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(ops(&calls), vec!["prune"]);
    }

    #[tokio::test]
    async fn forget_ensures_repository_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store();
        store
            .expect_get_repository()
            .withf(|_, name| name == "app-default-restic")
            .returning(|_, _| Ok(Some(repo(BackupRepositoryPhase::Ready))));
        let (manager, calls) = manager(store, &[], &dir);

        manager
            .forget(&SnapshotIdentifier {
                volume_namespace: "app".into(),
                backup_storage_location: "default".into(),
                repository_type: RepositoryType::Restic,
                snapshot_id: "abc123".into(),
            })
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][1], "forget");
        assert!(calls[0].contains(&format!("--repo={}", IDENTIFIER)));
        assert_eq!(calls[0].last().unwrap(), "abc123");
    }

    #[tokio::test]
    async fn forget_fails_when_repository_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store();
        store.expect_get_repository().returning(|_, _| {
            let mut r = repo(BackupRepositoryPhase::NotReady);
            BackupRepositoryPatch::default()
                .message("bucket missing")
                .apply_to(&mut r);
            Ok(Some(r))
        });
        let (manager, calls) = manager(store, &[], &dir);

        let err = manager
            .forget(&SnapshotIdentifier {
                volume_namespace: "app".into(),
                backup_storage_location: "default".into(),
                repository_type: RepositoryType::Restic,
                snapshot_id: "abc123".into(),
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("bucket missing"));
        assert!(ops(&calls).is_empty());
    }

    #[tokio::test]
    async fn restic_suggests_weekly_maintenance() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager(store(), &[], &dir);
        assert_eq!(
            manager
                .default_maintenance_frequency(&repo(BackupRepositoryPhase::New))
                .await
                .unwrap(),
            Some(RESTIC_MAINTENANCE_FREQUENCY)
        );
    }
}
