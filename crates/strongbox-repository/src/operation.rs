//! Repository operation kinds
//!
//! Every backend operation is one case of [`RepoOperation`]. Each case knows
//! the lock mode it needs, how its failures are classified, and which
//! arguments it renders into a [`Command`].

use std::collections::BTreeMap;
use std::fmt;

use strongbox_common::Error;
use tracing::warn;

use crate::command::Command;

/// Lock mode an operation must hold on its repository
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// Reader hold; any number may run concurrently
    Shared,
    /// Writer hold; excludes every other holder
    Exclusive,
}

/// What a failure of an operation means for the repository
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// The repository cannot be used; phase becomes NotReady
    Demoting,
    /// The failure is reported (status message or caller) but readiness is unchanged
    Recorded,
    /// The failure is logged and otherwise ignored
    Advisory,
}

/// A single backend operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepoOperation {
    /// Create the repository in the backend
    Init,
    /// Validate reachability and credentials with a bounded listing
    Connect,
    /// Garbage-collect unreferenced data
    Prune,
    /// Remove stale backend locks
    Unlock,
    /// Remove one snapshot from the repository catalog
    Forget {
        /// Snapshot to remove
        snapshot_id: String,
    },
    /// Back up a directory into the repository
    Backup {
        /// Directory to back up
        path: String,
        /// Host name recorded on the snapshot
        host: String,
        /// Tags recorded on the snapshot
        tags: BTreeMap<String, String>,
    },
    /// Restore a snapshot into a directory
    Restore {
        /// Snapshot to restore
        snapshot_id: String,
        /// Directory to restore into
        target: String,
    },
}

impl RepoOperation {
    /// Backend sub-command name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Connect => "snapshots",
            Self::Prune => "prune",
            Self::Unlock => "unlock",
            Self::Forget { .. } => "forget",
            Self::Backup { .. } => "backup",
            Self::Restore { .. } => "restore",
        }
    }

    /// Lock mode required while the operation runs
    pub fn lock_mode(&self) -> LockMode {
        match self {
            Self::Init | Self::Prune | Self::Forget { .. } => LockMode::Exclusive,
            Self::Connect | Self::Unlock | Self::Backup { .. } | Self::Restore { .. } => {
                LockMode::Shared
            }
        }
    }

    /// How a failure of this operation is handled
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Init | Self::Connect => FailureClass::Demoting,
            Self::Unlock => FailureClass::Advisory,
            Self::Prune | Self::Forget { .. } | Self::Backup { .. } | Self::Restore { .. } => {
                FailureClass::Recorded
            }
        }
    }

    /// Positional arguments and flags following the common repository flags
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Init | Self::Prune | Self::Unlock => Vec::new(),
            Self::Connect => vec!["--latest=1".to_string()],
            Self::Forget { snapshot_id } => vec![snapshot_id.clone()],
            Self::Backup { path, host, tags } => {
                let mut args = vec![path.clone(), format!("--host={}", host)];
                args.extend(tags.iter().map(|(k, v)| format!("--tag={}={}", k, v)));
                args
            }
            Self::Restore {
                snapshot_id,
                target,
            } => vec![snapshot_id.clone(), format!("--target={}", target)],
        }
    }

    /// Build the base command for a repository identifier
    pub fn command(&self, repo_identifier: &str) -> Command {
        Command::new(self.name(), repo_identifier).with_args(self.args())
    }
}

impl fmt::Display for RepoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Outcome of a best-effort operation
///
/// Not a `Result`: an advisory failure cannot be propagated with `?` and
/// so can never influence a phase transition.
#[derive(Debug)]
#[must_use = "advisory outcomes should be logged"]
pub enum Advisory {
    /// The operation succeeded
    Done,
    /// The operation failed; the error is for logging only
    Failed(Error),
}

impl Advisory {
    /// Convert an operation result into an advisory outcome
    pub fn from_result(result: Result<(), Error>) -> Self {
        match result {
            Ok(()) => Self::Done,
            Err(e) => Self::Failed(e),
        }
    }

    /// True if the operation failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Log a failure and discard the outcome
    pub fn log(self, repository: &str, operation: &str) {
        if let Self::Failed(e) = self {
            warn!(
                backup_repository = %repository,
                operation = %operation,
                error = %e,
                "best-effort repository operation failed"
            );
        }
    }
}
