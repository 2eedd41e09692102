//! Custom Resource Definitions for strongbox

mod backup_repository;
mod backup_storage_location;

pub use backup_repository::{
    BackupRepository, BackupRepositoryPatch, BackupRepositoryPhase, BackupRepositorySpec,
    BackupRepositoryStatus, RepositoryType,
};
pub use backup_storage_location::{
    BackupStorageLocation, BackupStorageLocationSpec, ObjectStorageLocation, SecretKeySelector,
};
