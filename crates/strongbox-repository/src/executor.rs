//! Repository command execution
//!
//! Fills a [`Command`] with everything it needs to reach the backend
//! (password file, CA bundle, provider environment, TLS flag), runs it, and
//! maps a non-zero exit to [`Error::CommandExecution`]. Every temporary file
//! created for a call is removed before the call returns, on all paths.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use strongbox_common::crd::BackupStorageLocation;
use strongbox_common::{Error, SharedResourceStore};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::command::{insecure_tls_flag, Command};
use crate::config::RepositoryConfig;
use crate::credentials::{repository_key_selector, CredentialsFileStore, ScopedFile};
use crate::exec::CommandExecutor;
use crate::provider::{env_vars, BackendType, CREDENTIALS_FILE_KEY};

/// Runs backend commands against a storage location
pub struct RepositoryExecutor {
    store: SharedResourceStore,
    credentials: Arc<dyn CredentialsFileStore>,
    runner: Arc<dyn CommandExecutor>,
    namespace: String,
    binary: String,
    cache_dir: Option<PathBuf>,
}

impl RepositoryExecutor {
    /// Create an executor
    pub fn new(
        store: SharedResourceStore,
        credentials: Arc<dyn CredentialsFileStore>,
        runner: Arc<dyn CommandExecutor>,
        config: &RepositoryConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            runner,
            namespace: config.namespace.clone(),
            binary: config.restic_binary.clone(),
            cache_dir: config.cache_dir.clone(),
        }
    }

    /// Look up a storage location by name
    pub async fn storage_location(&self, name: &str) -> Result<BackupStorageLocation, Error> {
        self.store
            .get_storage_location(&self.namespace, name)
            .await?
            .ok_or_else(|| Error::not_found("BackupStorageLocation", name))
    }

    /// Run `cmd` against the storage location named `location_name`
    pub async fn exec(&self, mut cmd: Command, location_name: &str) -> Result<(), Error> {
        let password_file = ScopedFile::new(self.credentials.path(&repository_key_selector()).await?);
        cmd.password_file = Some(password_file.path().to_path_buf());

        let location = self.storage_location(location_name).await?;

        let ca_file = match location.ca_cert()? {
            Some(bytes) => Some(write_ca_file(&bytes)?),
            None => None,
        };
        cmd.ca_cert_file = ca_file.as_ref().map(|f| f.path().to_path_buf());

        let mut config = location.spec.config.clone();
        let provider_credentials = match location.spec.credential {
            Some(ref selector) => {
                let file = ScopedFile::new(self.credentials.path(selector).await?);
                config.insert(
                    CREDENTIALS_FILE_KEY.to_string(),
                    file.path().display().to_string(),
                );
                Some(file)
            }
            None => None,
        };
        cmd.env.extend(env_vars(BackendType::of(&location), &config));
        cmd.extra_flags.extend(insecure_tls_flag(&location));

        cmd.binary = self.binary.clone();
        if let Some(dir) = self.cache_dir.as_ref().filter(|d| d.is_dir()) {
            cmd.cache_dir = Some(dir.clone());
        }

        let result = self.runner.run(&cmd.argv(), &cmd.env).await;

        drop(provider_credentials);
        drop(ca_file);
        drop(password_file);

        let output = result?;
        debug!(
            repository = %cmd.repo_name(),
            command = %cmd,
            stdout = %output.stdout,
            stderr = %output.stderr,
            "ran repository command"
        );

        if !output.succeeded() {
            return Err(Error::command_execution(
                cmd.to_string(),
                output.stdout,
                output.stderr,
                output.exit_code,
            ));
        }
        Ok(())
    }
}

fn write_ca_file(bytes: &[u8]) -> Result<NamedTempFile, Error> {
    let mut file = tempfile::Builder::new()
        .prefix("cacert-")
        .tempfile()
        .map_err(|e| Error::io("creating CA certificate file", e))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| Error::io("writing CA certificate file", e))?;
    Ok(file)
}
