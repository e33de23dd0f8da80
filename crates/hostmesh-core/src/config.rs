// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for hostmesh.
//!
//! Built once by the caller and passed to every component. Nothing in the
//! workspace reads the environment on its own.

use std::path::PathBuf;
use std::time::Duration;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct HostmeshConfig {
    /// Local root of the sync directory tree.
    pub local_root: PathBuf,
    /// Remote root of the sync directory tree on every host.
    pub remote_root: String,
    /// SSH login user.
    pub ssh_user: String,
    /// SSH port.
    pub ssh_port: u16,
    /// SSH identity file, `None` for the agent/default key.
    pub ssh_identity: Option<PathBuf>,
    /// Timeout applied to each remote command.
    pub command_timeout: Duration,
    /// Upper bound of concurrent host transfers.
    pub max_parallel_transfers: usize,
    /// Container registry account used in image names.
    pub registry_account: String,
    /// nginx configuration root on proxy hosts.
    pub proxy_root: String,
    /// Name of the proxy container.
    pub proxy_container: String,
    /// Root of the certificate storage tree on proxy hosts.
    pub cert_root: String,
    /// Image used for disposable helper containers.
    pub helper_image: String,
    /// Cloudflare API base URL.
    pub cloudflare_api: String,
    /// URL listing Cloudflare IPv4 ranges.
    pub cloudflare_ips_url: String,
    /// Public IP of the operator machine, whitelisted by the firewall.
    pub operator_ip: Option<String>,
}

impl Default for HostmeshConfig {
    fn default() -> Self {
        Self {
            local_root: PathBuf::from(".hostmesh"),
            remote_root: "/opt/hostmesh".to_string(),
            ssh_user: "root".to_string(),
            ssh_port: 22,
            ssh_identity: None,
            command_timeout: Duration::from_secs(300),
            max_parallel_transfers: 5,
            registry_account: "hostmesh".to_string(),
            proxy_root: "/etc/nginx".to_string(),
            proxy_container: "nginx".to_string(),
            cert_root: "/opt/hostmesh/certs".to_string(),
            helper_image: "alpine:3.20".to_string(),
            cloudflare_api: "https://api.cloudflare.com/client/v4".to_string(),
            cloudflare_ips_url: "https://www.cloudflare.com/ips-v4".to_string(),
            operator_ip: None,
        }
    }
}

impl HostmeshConfig {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional; unset ones keep their [`Default`] value.
    ///
    /// - `HOSTMESH_LOCAL_ROOT`, `HOSTMESH_REMOTE_ROOT`
    /// - `HOSTMESH_SSH_USER`, `HOSTMESH_SSH_PORT`, `HOSTMESH_SSH_KEY`
    /// - `HOSTMESH_COMMAND_TIMEOUT_SECS`, `HOSTMESH_MAX_PARALLEL_TRANSFERS`
    /// - `HOSTMESH_REGISTRY_ACCOUNT`
    /// - `HOSTMESH_PROXY_ROOT`, `HOSTMESH_PROXY_CONTAINER`, `HOSTMESH_CERT_ROOT`
    /// - `HOSTMESH_HELPER_IMAGE`
    /// - `HOSTMESH_CLOUDFLARE_API`, `HOSTMESH_CLOUDFLARE_IPS_URL`
    /// - `HOSTMESH_OPERATOR_IP`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ssh_port = match lookup("HOSTMESH_SSH_PORT") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Invalid("HOSTMESH_SSH_PORT", "must be a valid port"))?,
            None => defaults.ssh_port,
        };

        let command_timeout = match lookup("HOSTMESH_COMMAND_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(v.parse().map_err(|_| {
                ConfigError::Invalid(
                    "HOSTMESH_COMMAND_TIMEOUT_SECS",
                    "must be a number of seconds",
                )
            })?),
            None => defaults.command_timeout,
        };

        let max_parallel_transfers = match lookup("HOSTMESH_MAX_PARALLEL_TRANSFERS") {
            Some(v) => match v.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid(
                        "HOSTMESH_MAX_PARALLEL_TRANSFERS",
                        "must be a positive integer",
                    ));
                }
            },
            None => defaults.max_parallel_transfers,
        };

        Ok(Self {
            local_root: lookup("HOSTMESH_LOCAL_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.local_root),
            remote_root: lookup("HOSTMESH_REMOTE_ROOT").unwrap_or(defaults.remote_root),
            ssh_user: lookup("HOSTMESH_SSH_USER").unwrap_or(defaults.ssh_user),
            ssh_port,
            ssh_identity: lookup("HOSTMESH_SSH_KEY").map(PathBuf::from),
            command_timeout,
            max_parallel_transfers,
            registry_account: lookup("HOSTMESH_REGISTRY_ACCOUNT")
                .unwrap_or(defaults.registry_account),
            proxy_root: lookup("HOSTMESH_PROXY_ROOT").unwrap_or(defaults.proxy_root),
            proxy_container: lookup("HOSTMESH_PROXY_CONTAINER")
                .unwrap_or(defaults.proxy_container),
            cert_root: lookup("HOSTMESH_CERT_ROOT").unwrap_or(defaults.cert_root),
            helper_image: lookup("HOSTMESH_HELPER_IMAGE").unwrap_or(defaults.helper_image),
            cloudflare_api: lookup("HOSTMESH_CLOUDFLARE_API").unwrap_or(defaults.cloudflare_api),
            cloudflare_ips_url: lookup("HOSTMESH_CLOUDFLARE_IPS_URL")
                .unwrap_or(defaults.cloudflare_ips_url),
            operator_ip: lookup("HOSTMESH_OPERATOR_IP"),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
