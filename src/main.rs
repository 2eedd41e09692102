//! Strongbox operator - backup repository lifecycle for Kubernetes

mod controller_runner;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;

use strongbox_backup::backup_repository_controller::{Context, ReconcilerConfig};
use strongbox_backup::DEFAULT_REPO_SYNC_PERIOD_SECS;
use strongbox_common::kube_utils::{crds, ensure_crds_installed};
use strongbox_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use strongbox_common::{
    KubeResourceStore, SharedResourceStore, FIELD_MANAGER, STRONGBOX_SYSTEM_NAMESPACE,
};
use strongbox_repository::command::DEFAULT_RESTIC_BINARY;
use strongbox_repository::{
    NamespacedFileStore, ProcessExecutor, RepositoryConfig, ResticRepositoryManager,
};

/// Strongbox - provisions, maintains and serializes access to backup repositories
#[derive(Parser, Debug)]
#[command(name = "strongbox", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests as YAML and exit
    #[arg(long)]
    crd: bool,

    /// Install or update the CRDs on startup
    #[arg(long)]
    install_crds: bool,

    /// Namespace holding repositories, storage locations and credentials
    #[arg(long, env = "STRONGBOX_NAMESPACE", default_value = STRONGBOX_SYSTEM_NAMESPACE)]
    namespace: String,

    /// Maintenance frequency for all repositories, in seconds (0 = backend default)
    #[arg(long, env = "STRONGBOX_MAINTENANCE_FREQUENCY_SECS")]
    default_repo_maintain_frequency: Option<u64>,

    /// Interval between periodic resyncs, in seconds
    #[arg(long, env = "STRONGBOX_REPO_SYNC_PERIOD_SECS", default_value_t = DEFAULT_REPO_SYNC_PERIOD_SECS)]
    repo_sync_period: u64,

    /// Directory where credentials files are written
    #[arg(long, env = "STRONGBOX_CREDENTIALS_DIR")]
    credentials_dir: Option<PathBuf>,

    /// Backend executable
    #[arg(long, env = "STRONGBOX_RESTIC_BINARY", default_value = DEFAULT_RESTIC_BINARY)]
    restic_binary: String,

    /// Backend cache directory
    #[arg(long, env = "STRONGBOX_RESTIC_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Log output format (text or json)
    #[arg(long, env = "STRONGBOX_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    fn repository_config(&self) -> RepositoryConfig {
        let defaults = RepositoryConfig::default();
        RepositoryConfig {
            namespace: self.namespace.clone(),
            restic_binary: self.restic_binary.clone(),
            cache_dir: self.cache_dir.clone(),
            credentials_dir: self
                .credentials_dir
                .clone()
                .unwrap_or(defaults.credentials_dir),
            ..defaults
        }
    }

    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            namespace: self.namespace.clone(),
            repo_sync_period: Duration::from_secs(self.repo_sync_period),
            maintenance_frequency: self
                .default_repo_maintain_frequency
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in crds() {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        format: cli.log_format,
        default_filter: None,
    })?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if cli.install_crds {
        ensure_crds_installed(&client, FIELD_MANAGER).await?;
    }

    let repo_config = cli.repository_config();
    let store: SharedResourceStore = Arc::new(KubeResourceStore::new(client.clone()));
    let credentials = Arc::new(NamespacedFileStore::new(
        store.clone(),
        repo_config.namespace.clone(),
        repo_config.credentials_dir.clone(),
    ));
    let manager = Arc::new(ResticRepositoryManager::new(
        store.clone(),
        credentials,
        Arc::new(ProcessExecutor),
        &repo_config,
    ));
    let ctx = Arc::new(Context::new(store, manager, cli.reconciler_config()));

    tracing::info!(
        namespace = %cli.namespace,
        sync_period_secs = cli.repo_sync_period,
        "Starting strongbox controllers"
    );
    let controllers = controller_runner::build_repository_controllers(client, ctx);
    futures::future::join_all(controllers).await;

    tracing::info!("Controllers stopped");
    Ok(())
}
