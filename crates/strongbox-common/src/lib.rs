//! Common types for strongbox: CRDs, errors, the resource store and utilities

#![warn(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod store;
pub mod telemetry;

pub use error::{Error, ReconcileError};
pub use store::{KubeResourceStore, ResourceStore, SharedResourceStore};

#[cfg(any(test, feature = "mock"))]
pub use store::MockResourceStore;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace for strongbox system resources (repositories, locations, credentials)
pub const STRONGBOX_SYSTEM_NAMESPACE: &str = "strongbox-system";

/// Field manager used for every write made by the operator
pub const FIELD_MANAGER: &str = "strongbox-controller";

/// Label carrying the volume namespace of a BackupRepository
pub const VOLUME_NAMESPACE_LABEL: &str = "strongbox.dev/volume-namespace";

/// Label carrying the storage location of a BackupRepository
pub const STORAGE_LOCATION_LABEL: &str = "strongbox.dev/storage-location";

/// Label carrying the repository type of a BackupRepository
pub const REPOSITORY_TYPE_LABEL: &str = "strongbox.dev/repository-type";
