//! BackupRepository controller
//!
//! Drives each BackupRepository through its lifecycle:
//!
//! - `New`: resolve the storage location and backend identifier, persist the
//!   identifier and maintenance frequency, then init and connect. Success
//!   moves to `Ready`, any failure to `NotReady`.
//! - `Ready`: remove stale backend locks (best effort), then prune when
//!   maintenance is due. Prune failures only update the message.
//! - `NotReady`: once an identifier exists, retry init and connect.
//!
//! Backend failures are always recorded in status. Only store failures are
//! returned as errors and retried by [`error_policy`].

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, warn};

use strongbox_common::crd::{BackupRepository, BackupRepositoryPatch, BackupRepositoryPhase};
use strongbox_common::{Error, ReconcileError, SharedResourceStore, STRONGBOX_SYSTEM_NAMESPACE};
use strongbox_repository::identifier::repository_identifier;
use strongbox_repository::{
    due_for_maintenance, resolve_maintenance_frequency, FailureClass, RepoOperation,
    RepositoryManager,
};

use crate::{Clock, SystemClock, DEFAULT_REPO_SYNC_PERIOD_SECS, REQUEUE_CONFLICT_SECS, REQUEUE_ERROR_SECS};

/// Controller settings
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Namespace holding repositories and storage locations
    pub namespace: String,
    /// Periodic resync interval
    pub repo_sync_period: Duration,
    /// Operator-wide maintenance frequency; `None` defers to the backend
    pub maintenance_frequency: Option<Duration>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            namespace: STRONGBOX_SYSTEM_NAMESPACE.to_string(),
            repo_sync_period: Duration::from_secs(DEFAULT_REPO_SYNC_PERIOD_SECS),
            maintenance_frequency: None,
        }
    }
}

/// Shared state for BackupRepository reconciliation
pub struct Context {
    /// Resource store for repositories and storage locations
    pub store: SharedResourceStore,
    /// Backend operations
    pub manager: Arc<dyn RepositoryManager>,
    /// Time source for maintenance scheduling
    pub clock: Arc<dyn Clock>,
    /// Controller settings
    pub config: ReconcilerConfig,
}

impl Context {
    /// Create a context using the system clock
    pub fn new(
        store: SharedResourceStore,
        manager: Arc<dyn RepositoryManager>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            manager,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Reconcile a BackupRepository
pub async fn reconcile(
    repo: Arc<BackupRepository>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let name = repo.name_any();
    let namespace = repo
        .namespace()
        .ok_or_else(|| ReconcileError::Validation(format!("BackupRepository {} has no namespace", name)))?;

    // Work on the latest stored copy; the watch cache may lag behind our own patches
    let repo = match ctx.store.get_repository(&namespace, &name).await {
        Ok(Some(repo)) => repo,
        Ok(None) => {
            warn!(backup_repository = %name, namespace = %namespace, "backup repository not found");
            return Ok(Action::await_change());
        }
        Err(e) if e.is_not_found() => {
            warn!(backup_repository = %name, namespace = %namespace, "backup repository not found");
            return Ok(Action::await_change());
        }
        Err(e) => {
            error!(backup_repository = %name, error = %e, "error getting backup repository");
            return Err(ReconcileError::store("getting BackupRepository", e));
        }
    };

    debug!(backup_repository = %name, phase = %repo.phase(), "reconciling backup repository");

    match repo.phase() {
        BackupRepositoryPhase::New => initialize_repo(&repo, &namespace, &ctx).await?,
        BackupRepositoryPhase::Ready => {
            unlock_repo(&repo, &ctx).await;
            run_maintenance_if_due(&repo, &ctx).await?;
        }
        BackupRepositoryPhase::NotReady => check_not_ready_repo(&repo, &ctx).await?,
    }

    Ok(Action::requeue(ctx.config.repo_sync_period))
}

/// Requeue failed reconciles; conflicts retry sooner
pub fn error_policy(repo: Arc<BackupRepository>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        backup_repository = %repo.name_any(),
        "reconciliation failed"
    );

    if error.is_conflict() {
        Action::requeue(Duration::from_secs(REQUEUE_CONFLICT_SECS))
    } else {
        Action::requeue(Duration::from_secs(REQUEUE_ERROR_SECS))
    }
}

async fn initialize_repo(
    repo: &BackupRepository,
    namespace: &str,
    ctx: &Context,
) -> Result<(), ReconcileError> {
    let name = repo.name_any();
    info!(backup_repository = %name, "Initializing backup repository");

    let location_name = &repo.spec.backup_storage_location;
    let location = match ctx.store.get_storage_location(namespace, location_name).await {
        Ok(Some(location)) => location,
        Ok(None) => {
            let e = Error::not_found("BackupStorageLocation", location_name);
            return record_failure(ctx, repo, FailureClass::Demoting, &e).await;
        }
        Err(e) => return record_failure(ctx, repo, FailureClass::Demoting, &e).await,
    };

    let frequency = match repo.spec.maintenance_frequency() {
        Some(_) => None,
        None => Some(maintenance_frequency(repo, ctx).await),
    };

    let identifier = if repo.has_identifier() {
        None
    } else {
        match repository_identifier(&location, &repo.spec.volume_namespace) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(backup_repository = %name, error = %e, "unable to resolve repository identifier");
                // Persist the frequency anyway so it is not recomputed on every retry
                let mut patch = failure_patch(FailureClass::Demoting, &e);
                if let Some(f) = frequency {
                    patch = patch.maintenance_frequency(f);
                }
                patch_repo(ctx, repo, patch).await?;
                return Ok(());
            }
        }
    };

    let mut defaults = BackupRepositoryPatch::default();
    if let Some(id) = identifier {
        defaults = defaults.repository_identifier(id);
    }
    if let Some(f) = frequency {
        defaults = defaults.maintenance_frequency(f);
    }
    let repo = if defaults.is_empty() {
        repo.clone()
    } else {
        patch_repo(ctx, repo, defaults).await?
    };

    if let Err(e) = ctx.manager.prepare_repo(&repo).await {
        warn!(backup_repository = %name, error = %e, "error preparing backup repository");
        return record_failure(ctx, &repo, FailureClass::Demoting, &e).await;
    }

    info!(backup_repository = %name, "backup repository is ready");
    patch_repo(
        ctx,
        &repo,
        BackupRepositoryPatch::default()
            .phase(BackupRepositoryPhase::Ready)
            .message("")
            .last_maintenance_time(ctx.clock.now()),
    )
    .await?;
    Ok(())
}

async fn maintenance_frequency(repo: &BackupRepository, ctx: &Context) -> Duration {
    let suggested = match ctx.config.maintenance_frequency.filter(|f| !f.is_zero()) {
        Some(_) => Ok(None),
        None => ctx.manager.default_maintenance_frequency(repo).await,
    };
    let frequency = resolve_maintenance_frequency(ctx.config.maintenance_frequency, suggested);
    info!(
        backup_repository = %repo.name_any(),
        frequency_secs = frequency.as_secs(),
        "set maintenance frequency"
    );
    frequency
}

async fn unlock_repo(repo: &BackupRepository, ctx: &Context) {
    debug!(backup_repository = %repo.name_any(), "checking repository for stale locks");
    ctx.manager
        .unlock_repo(repo)
        .await
        .log(&repo.name_any(), "unlock");
}

async fn run_maintenance_if_due(repo: &BackupRepository, ctx: &Context) -> Result<(), ReconcileError> {
    let name = repo.name_any();
    let now = ctx.clock.now();

    if !due_for_maintenance(repo, now) {
        debug!(backup_repository = %name, "not due for maintenance");
        return Ok(());
    }

    info!(backup_repository = %name, "Running maintenance on backup repository");
    let operation = RepoOperation::Prune;
    if let Err(e) = ctx.manager.prune_repo(repo).await {
        warn!(backup_repository = %name, error = %e, "error pruning repository");
        return record_failure(ctx, repo, operation.failure_class(), &e).await;
    }

    patch_repo(
        ctx,
        repo,
        BackupRepositoryPatch::default().last_maintenance_time(now),
    )
    .await?;
    Ok(())
}

async fn check_not_ready_repo(repo: &BackupRepository, ctx: &Context) -> Result<(), ReconcileError> {
    let name = repo.name_any();

    // Nothing to connect to until an identifier has been resolved
    if !repo.has_identifier() {
        debug!(backup_repository = %name, "no repository identifier yet");
        return Ok(());
    }

    unlock_repo(repo, ctx).await;

    info!(backup_repository = %name, "Checking backup repository for readiness");
    if let Err(e) = ctx.manager.prepare_repo(repo).await {
        warn!(backup_repository = %name, error = %e, "backup repository is still not ready");
        return record_failure(ctx, repo, FailureClass::Demoting, &e).await;
    }

    info!(backup_repository = %name, "backup repository is ready");
    patch_repo(
        ctx,
        repo,
        BackupRepositoryPatch::default()
            .phase(BackupRepositoryPhase::Ready)
            .message(""),
    )
    .await?;
    Ok(())
}

/// Status change recording a failure of the given class
fn failure_patch(class: FailureClass, error: &Error) -> BackupRepositoryPatch {
    let patch = BackupRepositoryPatch::default();
    match class {
        FailureClass::Demoting => patch
            .phase(BackupRepositoryPhase::NotReady)
            .message(error.to_string()),
        FailureClass::Recorded => patch.message(error.to_string()),
        FailureClass::Advisory => patch,
    }
}

async fn record_failure(
    ctx: &Context,
    repo: &BackupRepository,
    class: FailureClass,
    error: &Error,
) -> Result<(), ReconcileError> {
    let patch = failure_patch(class, error);
    if !patch.is_empty() {
        patch_repo(ctx, repo, patch).await?;
    }
    Ok(())
}

async fn patch_repo(
    ctx: &Context,
    repo: &BackupRepository,
    patch: BackupRepositoryPatch,
) -> Result<BackupRepository, ReconcileError> {
    ctx.store
        .patch_repository(repo, &patch)
        .await
        .map_err(|e| ReconcileError::store("patching BackupRepository", e))
}
