//! Process execution facility
//!
//! [`CommandExecutor`] is the seam between command descriptors and the
//! operating system; tests substitute a mock that records argv and env.

use std::collections::BTreeMap;

use async_trait::async_trait;
use strongbox_common::Error;
use tokio::process::Command;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// Captured result of a finished process
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code, `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// A successful output with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// A failed output with the given exit code and stderr
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
        }
    }

    /// True if the process exited with status zero
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an argv with extra environment variables
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `argv[0]` with the remaining arguments and wait for it to finish
    ///
    /// Only failures to start or wait for the process are errors; a non-zero
    /// exit is reported through [`CommandOutput::exit_code`].
    async fn run(&self, argv: &[String], env: &BTreeMap<String, String>) -> Result<CommandOutput, Error>;
}

/// [`CommandExecutor`] spawning real processes
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, argv: &[String], env: &BTreeMap<String, String>) -> Result<CommandOutput, Error> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::internal_with_context("exec", "empty command line"))?;

        let output = Command::new(program)
            .args(args)
            .envs(env)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::io(format!("running {}", program), e))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
