//! Repository subsystem configuration

use std::path::PathBuf;
use std::time::Duration;

use strongbox_common::STRONGBOX_SYSTEM_NAMESPACE;

use crate::command::DEFAULT_RESTIC_BINARY;

/// How long to wait for a newly created repository to become ready
pub const DEFAULT_ENSURE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between readiness checks while waiting
pub const DEFAULT_ENSURE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settings shared by the executor, manager and ensurer
#[derive(Clone, Debug)]
pub struct RepositoryConfig {
    /// Namespace holding repositories, storage locations and credentials
    pub namespace: String,
    /// Backend executable
    pub restic_binary: String,
    /// Backend cache directory, used when it exists
    pub cache_dir: Option<PathBuf>,
    /// Where credentials files are materialized
    pub credentials_dir: PathBuf,
    /// Ensurer readiness timeout
    pub ensure_timeout: Duration,
    /// Ensurer poll interval
    pub ensure_poll_interval: Duration,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            namespace: STRONGBOX_SYSTEM_NAMESPACE.to_string(),
            restic_binary: DEFAULT_RESTIC_BINARY.to_string(),
            cache_dir: None,
            credentials_dir: std::env::temp_dir().join("credentials"),
            ensure_timeout: DEFAULT_ENSURE_TIMEOUT,
            ensure_poll_interval: DEFAULT_ENSURE_POLL_INTERVAL,
        }
    }
}
