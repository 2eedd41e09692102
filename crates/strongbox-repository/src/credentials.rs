//! Credentials file materialization
//!
//! Secrets are written to private files so that commands only ever see a
//! path. Callers wrap returned paths in [`ScopedFile`] to remove them once
//! the command finishes.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use strongbox_common::crd::SecretKeySelector;
use strongbox_common::{Error, SharedResourceStore};
use tracing::{debug, warn};

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// Secret holding the repository password
pub const REPOSITORY_CREDENTIALS_SECRET: &str = "strongbox-repo-credentials";

/// Key of the repository password within [`REPOSITORY_CREDENTIALS_SECRET`]
pub const REPOSITORY_PASSWORD_KEY: &str = "repository-password";

/// Selector for the repository password
pub fn repository_key_selector() -> SecretKeySelector {
    SecretKeySelector::new(REPOSITORY_CREDENTIALS_SECRET, REPOSITORY_PASSWORD_KEY)
}

/// Writes secret values to files and returns their paths
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait CredentialsFileStore: Send + Sync {
    /// Materialize the selected secret value and return the file path
    ///
    /// The caller owns the file and must remove it after use.
    async fn path(&self, selector: &SecretKeySelector) -> Result<PathBuf, Error>;
}

/// File store backed by Secrets in a single namespace
pub struct NamespacedFileStore {
    store: SharedResourceStore,
    namespace: String,
    dir: PathBuf,
}

impl NamespacedFileStore {
    /// Create a store reading Secrets from `namespace` and writing under `dir`
    pub fn new(store: SharedResourceStore, namespace: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl CredentialsFileStore for NamespacedFileStore {
    async fn path(&self, selector: &SecretKeySelector) -> Result<PathBuf, Error> {
        let value = self
            .store
            .get_secret_value(&self.namespace, &selector.name, &selector.key)
            .await?
            .ok_or_else(|| {
                Error::credentials(format!(
                    "secret {}/{} has no key {}",
                    self.namespace, selector.name, selector.key
                ))
            })?;

        let dir = self.dir.join(&self.namespace);
        let prefix = format!("{}-{}-", selector.name, selector.key);
        let path = tokio::task::spawn_blocking(move || write_private_file(&dir, &prefix, &value))
            .await
            .map_err(|e| Error::internal(format!("credentials writer task failed: {}", e)))??;

        debug!(secret = %selector.name, key = %selector.key, path = %path.display(), "materialized credentials file");
        Ok(path)
    }
}

fn write_private_file(dir: &Path, prefix: &str, value: &[u8]) -> Result<PathBuf, Error> {
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::io(format!("creating {}", dir.display()), e))?;

    // tempfile creates files readable by the owner only
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .tempfile_in(dir)
        .map_err(|e| Error::io(format!("creating credentials file in {}", dir.display()), e))?;
    file.write_all(value)
        .map_err(|e| Error::io("writing credentials file", e))?;
    let (_, path) = file
        .keep()
        .map_err(|e| Error::io("persisting credentials file", e.error))?;
    Ok(path)
}

/// A file removed when dropped
#[derive(Debug)]
pub struct ScopedFile {
    path: PathBuf,
}

impl ScopedFile {
    /// Take ownership of the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove credentials file");
            }
        }
    }
}
