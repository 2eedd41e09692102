//! Error types for the strongbox operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the context needed to explain a failure in a
//! repository's `status.message` without leaking credential contents.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for strongbox operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A referenced object does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Kind of the missing object (e.g. "BackupStorageLocation")
        kind: String,
        /// Name of the missing object
        name: String,
    },

    /// Storage location or repository identifier could not be determined
    #[error("unable to resolve repository {repository}: {message}")]
    Resolution {
        /// Repository (or volume namespace) being resolved
        repository: String,
        /// Description of what could not be resolved
        message: String,
    },

    /// A backend command exited unsuccessfully
    #[error("error running command={command}, stdout={stdout}, stderr={stderr}")]
    CommandExecution {
        /// Rendered command line (paths only, never secret contents)
        command: String,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
        /// Process exit code, if the process exited normally
        exit_code: Option<i32>,
    },

    /// Credential material could not be materialized
    #[error("credentials error: {message}")]
    Credentials {
        /// Description of what failed
        message: String,
    },

    /// Filesystem or process I/O error
    #[error("io error [{context}]: {source}")]
    Io {
        /// What was being done when the error occurred
        context: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "ensurer", "executor")
        context: String,
    },
}

impl Error {
    /// Create a not-found error for the given kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a resolution error for a repository
    pub fn resolution(repository: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Resolution {
            repository: repository.into(),
            message: msg.into(),
        }
    }

    /// Create a command execution error from captured output
    pub fn command_execution(
        command: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Create a credentials error
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials {
            message: msg.into(),
        }
    }

    /// Wrap an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Returns true if the object (or a referenced object) does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube {
                source: kube::Error::Api(resp),
            } => resp.code == 404,
            _ => false,
        }
    }

    /// Returns true if a write lost a race with a concurrent writer
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Kube {
                source: kube::Error::Api(resp),
            } if resp.code == 409
        )
    }
}

/// Error returned from controller reconcile functions
///
/// Anything that can be recorded in a resource's status is recorded there;
/// only failures that cannot be encoded locally surface as a `ReconcileError`
/// and are retried by the controller's error policy.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Status or spec update lost a race with another writer
    #[error("conflict: {0}")]
    Conflict(String),

    /// Kubernetes API failure
    #[error("kubernetes error: {0}")]
    Kube(String),

    /// Invalid resource content
    #[error("validation error: {0}")]
    Validation(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    /// Map a store error into a reconcile error, keeping conflicts distinguishable
    ///
    /// Failures that did not come from the API server (e.g. a patch that
    /// could not be serialized) map to [`ReconcileError::Internal`].
    pub fn store(context: &str, err: Error) -> Self {
        match err {
            ref e if e.is_conflict() => Self::Conflict(format!("{}: {}", context, e)),
            Error::Kube { .. } => Self::Kube(format!("{}: {}", context, err)),
            other => Self::Internal(format!("{}: {}", context, other)),
        }
    }

    /// Returns true if the error is a write conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
