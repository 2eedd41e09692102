//! Backend command descriptors
//!
//! A [`Command`] is built right before execution and discarded afterwards.
//! It only ever references credential material by file path.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use strongbox_common::crd::BackupStorageLocation;

/// Default backend executable
pub const DEFAULT_RESTIC_BINARY: &str = "restic";

/// Location config key requesting that TLS verification be skipped
pub const INSECURE_SKIP_TLS_VERIFY_KEY: &str = "insecureSkipTLSVerify";

/// A fully described backend invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Executable to run
    pub binary: String,
    /// Backend sub-command
    pub operation: String,
    /// Backend repository identifier
    pub repo_identifier: String,
    /// File holding the repository password
    pub password_file: Option<PathBuf>,
    /// File holding the object store CA bundle
    pub ca_cert_file: Option<PathBuf>,
    /// Local cache directory
    pub cache_dir: Option<PathBuf>,
    /// Operation-specific arguments
    pub args: Vec<String>,
    /// Flags appended after everything else
    pub extra_flags: Vec<String>,
    /// Environment passed to the process
    pub env: BTreeMap<String, String>,
}

impl Command {
    /// A command for `operation` against `repo_identifier`
    pub fn new(operation: impl Into<String>, repo_identifier: impl Into<String>) -> Self {
        Self {
            binary: DEFAULT_RESTIC_BINARY.to_string(),
            operation: operation.into(),
            repo_identifier: repo_identifier.into(),
            password_file: None,
            ca_cert_file: None,
            cache_dir: None,
            args: Vec::new(),
            extra_flags: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Set operation arguments
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Last path segment of the identifier
    pub fn repo_name(&self) -> &str {
        self.repo_identifier
            .rsplit('/')
            .next()
            .unwrap_or(&self.repo_identifier)
    }

    /// Full argument vector, executable first
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![
            self.binary.clone(),
            self.operation.clone(),
            format!("--repo={}", self.repo_identifier),
        ];
        if let Some(ref path) = self.password_file {
            argv.push(format!("--password-file={}", path.display()));
        }
        if let Some(ref path) = self.ca_cert_file {
            argv.push(format!("--cacert={}", path.display()));
        }
        if let Some(ref dir) = self.cache_dir {
            argv.push(format!("--cache-dir={}", dir.display()));
        }
        argv.extend(self.args.iter().cloned());
        argv.extend(self.extra_flags.iter().cloned());
        argv
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// `--insecure-tls=true` when the location explicitly asks to skip verification
///
/// Missing or unparseable values keep verification on.
pub fn insecure_tls_flag(location: &BackupStorageLocation) -> Option<String> {
    location
        .config_value(INSECURE_SKIP_TLS_VERIFY_KEY)
        .and_then(parse_bool)
        .filter(|skip| *skip)
        .map(|_| "--insecure-tls=true".to_string())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strongbox_common::crd::{BackupStorageLocationSpec, ObjectStorageLocation};

    fn location(config: &[(&str, &str)]) -> BackupStorageLocation {
        BackupStorageLocation::new(
            "default",
            BackupStorageLocationSpec {
                provider: "aws".into(),
                object_storage: ObjectStorageLocation {
                    bucket: "backups".into(),
                    ..Default::default()
                },
                config: config
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn renders_full_argv_in_order() {
        let mut cmd = Command::new("snapshots", "s3:s3.amazonaws.com/backups/restic/app")
            .with_args(vec!["--latest=1".into()]);
        cmd.password_file = Some(PathBuf::from("/creds/strongbox-system/pw"));
        cmd.ca_cert_file = Some(PathBuf::from("/tmp/cacert-123"));
        cmd.cache_dir = Some(PathBuf::from("/scratch/.cache/restic"));
        cmd.extra_flags.push("--insecure-tls=true".into());

        assert_eq!(
            cmd.to_string(),
            "restic snapshots --repo=s3:s3.amazonaws.com/backups/restic/app \
             --password-file=/creds/strongbox-system/pw --cacert=/tmp/cacert-123 \
             --cache-dir=/scratch/.cache/restic --latest=1 --insecure-tls=true"
        );
    }

    #[test]
    fn optional_files_are_omitted() {
        let cmd = Command::new("init", "gs:bucket:/restic/app");
        assert_eq!(cmd.argv(), vec!["restic", "init", "--repo=gs:bucket:/restic/app"]);
    }

    #[test]
    fn repo_name_is_last_segment() {
        assert_eq!(
            Command::new("init", "s3:host/bucket/restic/app").repo_name(),
            "app"
        );
        assert_eq!(Command::new("init", "plain").repo_name(), "plain");
    }

    #[test]
    fn insecure_flag_requires_explicit_true() {
        assert_eq!(
            insecure_tls_flag(&location(&[(INSECURE_SKIP_TLS_VERIFY_KEY, "true")])),
            Some("--insecure-tls=true".to_string())
        );
        assert_eq!(
            insecure_tls_flag(&location(&[(INSECURE_SKIP_TLS_VERIFY_KEY, "1")])),
            Some("--insecure-tls=true".to_string())
        );
        assert_eq!(
            insecure_tls_flag(&location(&[(INSECURE_SKIP_TLS_VERIFY_KEY, "false")])),
            None
        );
        assert_eq!(
            insecure_tls_flag(&location(&[(INSECURE_SKIP_TLS_VERIFY_KEY, "yes please")])),
            None
        );
        assert_eq!(insecure_tls_flag(&location(&[])), None);
    }
}
