// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Executor trait definitions.
//!
//! Defines the abstract "run this command on this host" capability every
//! other component is built on.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors from command execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecError {
    /// The command could not be started.
    #[error("Failed to spawn {program}: {reason}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying reason.
        reason: String,
    },

    /// The host could not be reached.
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// The command did not finish in time.
    #[error("Command timed out after {}s on {host}", .timeout.as_secs())]
    Timeout {
        /// Host the command ran on.
        host: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The command exited with a non-zero code.
    #[error("Exit code {exit_code}: {stderr}")]
    ExitCode {
        /// Exit code from the process.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for executor operations.
pub type Result<T> = std::result::Result<T, ExecError>;

/// Where a command runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostTarget {
    /// The operator machine.
    Local,
    /// A remote host reached over SSH, by address.
    Remote(String),
}

impl HostTarget {
    /// Remote host by address.
    pub fn remote(address: impl Into<String>) -> Self {
        HostTarget::Remote(address.into())
    }

    /// Address used in logs and directory names.
    pub fn address(&self) -> &str {
        match self {
            HostTarget::Local => "localhost",
            HostTarget::Remote(address) => address,
        }
    }

    /// Whether the command runs on the operator machine.
    pub fn is_local(&self) -> bool {
        matches!(self, HostTarget::Local)
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.address())
    }
}

/// A command to execute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecRequest {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Bytes written to the command's stdin.
    pub stdin: Option<Vec<u8>>,
    /// Overrides the executor's default timeout.
    pub timeout: Option<Duration>,
}

impl ExecRequest {
    /// Command from program and arguments.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin: None,
            timeout: None,
        }
    }

    /// Attach stdin bytes.
    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Override the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program name.
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Whether argv starts with `prefix`.
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        prefix.len() <= self.argv.len() && self.argv.iter().zip(prefix).all(|(a, p)| a == p)
    }

    /// Shell-safe single-line rendering, used for SSH and for display.
    pub fn to_shell(&self) -> String {
        self.argv
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Quote `arg` for a POSIX shell when needed.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',' | '+')
        });
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code, `-1` when killed by a signal.
    pub exit_code: i32,
    /// Raw standard output.
    pub stdout: Vec<u8>,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl ExecOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout as trimmed text.
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    /// Turn a non-zero exit into [`ExecError::ExitCode`].
    pub fn checked(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(ExecError::ExitCode {
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Trait for command executors.
///
/// Implementations decide how a command reaches a host (SSH, local
/// process, scripted mock). Callers only depend on exit codes and stdout.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Executor type identifier (e.g., "ssh", "mock")
    fn executor_type(&self) -> &'static str;

    /// Run a command and return its output regardless of exit code.
    async fn exec(&self, host: &HostTarget, request: ExecRequest) -> Result<ExecOutput>;

    /// Run a command and fail on a non-zero exit code.
    async fn run(&self, host: &HostTarget, request: ExecRequest) -> Result<ExecOutput> {
        self.exec(host, request).await?.checked()
    }

    /// Write `contents` to `path` on `host`, creating parent directories.
    async fn write_file(&self, host: &HostTarget, path: &str, contents: Vec<u8>) -> Result<()> {
        if let Some((parent, _)) = path.rsplit_once('/')
            && !parent.is_empty()
        {
            self.run(host, ExecRequest::new(["mkdir", "-p", parent]))
                .await?;
        }
        self.run(host, ExecRequest::new(["tee", path]).with_stdin(contents))
            .await?;
        Ok(())
    }

    /// Remove a file on `host`; missing files are not an error.
    async fn remove_file(&self, host: &HostTarget, path: &str) -> Result<()> {
        self.run(host, ExecRequest::new(["rm", "-f", path])).await?;
        Ok(())
    }
}
