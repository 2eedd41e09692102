//! Backup repository controller for strongbox
//!
//! - **backup_repository_controller**: drives BackupRepository resources
//!   through their New / Ready / NotReady lifecycle, running unattended
//!   maintenance when it is due

pub mod backup_repository_controller;

use chrono::{DateTime, Utc};

/// Default periodic resync interval (5 minutes)
pub const DEFAULT_REPO_SYNC_PERIOD_SECS: u64 = 300;

/// Requeue interval after a status write conflict (5 seconds)
pub const REQUEUE_CONFLICT_SECS: u64 = 5;

/// Requeue interval after any other reconcile error (30 seconds)
pub const REQUEUE_ERROR_SECS: u64 = 30;

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock [`Clock`]
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
