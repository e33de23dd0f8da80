// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-backed executor.
//!
//! Local commands are spawned directly; remote commands go through the
//! system `ssh` client in batch mode. Each command gets its own timeout,
//! and the child is killed when the timeout elapses.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::traits::{CommandExecutor, ExecError, ExecOutput, ExecRequest, HostTarget, Result};
use crate::config::HostmeshConfig;

/// ssh exits with 255 when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// SSH executor configuration
#[derive(Debug, Clone)]
pub struct SshExecutorConfig {
    /// Login user.
    pub user: String,
    /// SSH port.
    pub port: u16,
    /// Identity file.
    pub identity: Option<PathBuf>,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// Default per-command timeout.
    pub command_timeout: Duration,
}

impl SshExecutorConfig {
    /// Derive from the orchestrator configuration.
    pub fn from_config(config: &HostmeshConfig) -> Self {
        Self {
            user: config.ssh_user.clone(),
            port: config.ssh_port,
            identity: config.ssh_identity.clone(),
            connect_timeout: Duration::from_secs(10),
            command_timeout: config.command_timeout,
        }
    }
}

/// Executor running commands locally or over SSH.
pub struct SshExecutor {
    config: SshExecutorConfig,
}

impl SshExecutor {
    /// Create a new executor
    pub fn new(config: SshExecutorConfig) -> Self {
        Self { config }
    }

    /// Create from orchestrator configuration
    pub fn from_config(config: &HostmeshConfig) -> Self {
        Self::new(SshExecutorConfig::from_config(config))
    }

    /// Build the process for `request` on `host`.
    fn command_for(&self, host: &HostTarget, request: &ExecRequest) -> Command {
        match host {
            HostTarget::Local => {
                let mut cmd = Command::new(request.program());
                cmd.args(request.argv.iter().skip(1));
                cmd
            }
            HostTarget::Remote(address) => {
                let mut cmd = Command::new("ssh");
                cmd.arg("-o")
                    .arg("BatchMode=yes")
                    .arg("-o")
                    .arg(format!(
                        "ConnectTimeout={}",
                        self.config.connect_timeout.as_secs()
                    ))
                    .arg("-o")
                    .arg("StrictHostKeyChecking=accept-new")
                    .arg("-p")
                    .arg(self.config.port.to_string());
                if let Some(identity) = &self.config.identity {
                    cmd.arg("-i").arg(identity);
                }
                cmd.arg(format!("{}@{}", self.config.user, address));
                cmd.arg("--");
                cmd.arg(request.to_shell());
                cmd
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for SshExecutor {
    fn executor_type(&self) -> &'static str {
        "ssh"
    }

    async fn exec(&self, host: &HostTarget, request: ExecRequest) -> Result<ExecOutput> {
        let timeout = request.timeout.unwrap_or(self.config.command_timeout);
        let mut cmd = self.command_for(host, &request);
        cmd.stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        debug!(host = %host, command = %request.to_shell(), "Executing command");

        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
            program: if host.is_local() {
                request.program().to_string()
            } else {
                "ssh".to_string()
            },
            reason: e.to_string(),
        })?;

        // Feed stdin concurrently so large archives cannot deadlock against
        // a full stdout pipe.
        let writer = match (child.stdin.take(), request.stdin) {
            (Some(mut stdin), Some(bytes)) => Some(tokio::spawn(async move {
                let result = stdin.write_all(&bytes).await;
                drop(stdin);
                result
            })),
            _ => None,
        };

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(host = %host, timeout_secs = timeout.as_secs(), "Command timed out");
                return Err(ExecError::Timeout {
                    host: host.to_string(),
                    timeout,
                });
            }
        };

        if let Some(writer) = writer
            && let Ok(Err(e)) = writer.await
        {
            debug!(host = %host, error = %e, "stdin closed early");
        }

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !host.is_local() && exit_code == SSH_CONNECTION_FAILURE {
            warn!(host = %host, stderr = %stderr.trim(), "SSH connection failed");
            return Err(ExecError::Unreachable(format!(
                "{}: {}",
                host,
                stderr.trim()
            )));
        }

        Ok(ExecOutput {
            exit_code,
            stdout: output.stdout,
            stderr,
        })
    }
}
