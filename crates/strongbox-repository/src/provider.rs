//! Object store provider handling
//!
//! Maps a storage location's provider to its backend type and resolves the
//! environment variables the backend needs to reach the object store. Only
//! file paths and non-secret settings are passed through the environment.

use std::collections::BTreeMap;
use std::fmt;

use strongbox_common::crd::BackupStorageLocation;

/// Config key holding the materialized credentials file path
pub const CREDENTIALS_FILE_KEY: &str = "credentialsFile";

/// Object store family of a storage location
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendType {
    /// Amazon S3 and S3-compatible stores
    Aws,
    /// Azure Blob Storage
    Azure,
    /// Google Cloud Storage
    Gcp,
    /// Anything else; needs an explicit repository prefix
    Other,
}

impl BackendType {
    /// Backend type from a provider name such as `aws` or `vendor.io/aws`
    pub fn from_provider(provider: &str) -> Self {
        let name = provider.rsplit('/').next().unwrap_or(provider);
        match name {
            "aws" => Self::Aws,
            "azure" => Self::Azure,
            "gcp" => Self::Gcp,
            _ => Self::Other,
        }
    }

    /// Backend type of a storage location
    pub fn of(location: &BackupStorageLocation) -> Self {
        Self::from_provider(&location.spec.provider)
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws => write!(f, "aws"),
            Self::Azure => write!(f, "azure"),
            Self::Gcp => write!(f, "gcp"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Environment variables for a backend type and location config
///
/// `config` is the location config, with [`CREDENTIALS_FILE_KEY`] added when
/// a credentials file was materialized.
pub fn env_vars(backend: BackendType, config: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mapping: &[(&str, &str)] = match backend {
        BackendType::Aws => &[
            ("AWS_SHARED_CREDENTIALS_FILE", CREDENTIALS_FILE_KEY),
            ("AWS_PROFILE", "profile"),
        ],
        BackendType::Gcp => &[("GOOGLE_APPLICATION_CREDENTIALS", CREDENTIALS_FILE_KEY)],
        BackendType::Azure => &[
            ("AZURE_CREDENTIALS_FILE", CREDENTIALS_FILE_KEY),
            ("AZURE_STORAGE_ACCOUNT", "storageAccount"),
            ("AZURE_RESOURCE_GROUP", "resourceGroup"),
        ],
        BackendType::Other => &[],
    };

    mapping
        .iter()
        .filter_map(|(var, key)| {
            config
                .get(*key)
                .filter(|v| !v.is_empty())
                .map(|v| (var.to_string(), v.clone()))
        })
        .collect()
}
