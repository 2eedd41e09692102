//! Controller runner - builds controller futures
//!
//! Returns boxed futures so the caller decides how to drive them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use strongbox_backup::backup_repository_controller::{error_policy, reconcile, Context};
use strongbox_common::crd::BackupRepository;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the BackupRepository controller
///
/// Periodic resync comes from the `Action::requeue` every reconcile returns.
pub fn build_repository_controllers(
    client: Client,
    ctx: Arc<Context>,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let repos: Api<BackupRepository> = Api::namespaced(client, &ctx.config.namespace);

    tracing::info!(namespace = %ctx.config.namespace, "- BackupRepository controller");

    vec![Box::pin(
        Controller::new(repos, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("BackupRepository")),
    )]
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
