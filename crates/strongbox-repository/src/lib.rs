//! Backup repository access for strongbox
//!
//! Serializes access to backend repositories through a per-repository
//! readers/writer [`LockRegistry`], renders backend operations into
//! [`Command`]s and runs them through the [`RepositoryExecutor`]. The
//! [`RepositoryManager`] is the operation-level API the controller and the
//! volume backup/restore pipelines use.

#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod credentials;
pub mod ensurer;
pub mod exec;
pub mod executor;
pub mod identifier;
pub mod lock;
pub mod maintenance;
pub mod manager;
pub mod operation;
pub mod podvolume;
pub mod provider;

pub use command::Command;
pub use config::RepositoryConfig;
pub use credentials::{CredentialsFileStore, NamespacedFileStore};
pub use ensurer::RepositoryEnsurer;
pub use exec::{CommandExecutor, CommandOutput, ProcessExecutor};
pub use executor::RepositoryExecutor;
pub use lock::{LockRegistry, RepoLockGuard};
pub use maintenance::{due_for_maintenance, resolve_maintenance_frequency};
pub use manager::{RepositoryManager, ResticRepositoryManager, SnapshotIdentifier};
pub use operation::{Advisory, FailureClass, LockMode, RepoOperation};
pub use podvolume::{Backupper, Restorer, VolumeRepository};

#[cfg(any(test, feature = "mock"))]
pub use credentials::MockCredentialsFileStore;
#[cfg(any(test, feature = "mock"))]
pub use exec::MockCommandExecutor;
#[cfg(any(test, feature = "mock"))]
pub use manager::MockRepositoryManager;
