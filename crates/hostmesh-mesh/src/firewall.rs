// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Host firewall (ufw).
//!
//! SSH and the operator address are allowed before the default-deny
//! policy goes in, so applying the policy over SSH cannot lock the
//! operator out.

use hostmesh_core::{CommandExecutor, ExecRequest, HostTarget, HostmeshConfig};
use tracing::info;

use crate::error::Result;

/// Firewall policy for a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallPolicy {
    /// SSH port to keep open.
    pub ssh_port: u16,
    /// Operator address allowed on every port.
    pub operator_ip: Option<String>,
    /// Additional public TCP ports.
    pub extra_ports: Vec<u16>,
}

impl FirewallPolicy {
    /// Policy from the orchestrator config.
    pub fn from_config(config: &HostmeshConfig) -> Self {
        Self {
            ssh_port: config.ssh_port,
            operator_ip: config.operator_ip.clone(),
            extra_ports: Vec::new(),
        }
    }

    /// ufw commands in application order.
    pub fn commands(&self) -> Vec<ExecRequest> {
        let mut commands = vec![ExecRequest::new([
            "ufw".to_string(),
            "allow".to_string(),
            format!("{}/tcp", self.ssh_port),
        ])];
        if let Some(ip) = &self.operator_ip {
            commands.push(ExecRequest::new(["ufw", "allow", "from", ip.as_str()]));
        }
        commands.push(ExecRequest::new(["ufw", "default", "deny", "incoming"]));
        commands.push(ExecRequest::new(["ufw", "default", "allow", "outgoing"]));
        for port in [80, 443].into_iter().chain(self.extra_ports.iter().copied()) {
            commands.push(ExecRequest::new([
                "ufw".to_string(),
                "allow".to_string(),
                format!("{}/tcp", port),
            ]));
        }
        commands.push(ExecRequest::new(["ufw", "--force", "enable"]));
        commands
    }

    /// Apply the policy on `host`, stopping at the first failure.
    pub async fn apply(&self, executor: &dyn CommandExecutor, host: &HostTarget) -> Result<()> {
        for command in self.commands() {
            executor.run(host, command).await?;
        }
        info!(
            host = %host,
            ssh_port = self.ssh_port,
            operator_ip = ?self.operator_ip,
            "Firewall enabled"
        );
        Ok(())
    }
}
