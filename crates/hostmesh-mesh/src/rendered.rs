// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Generated proxy configuration artifacts.

use serde::{Deserialize, Serialize};

/// Which proxy context a config belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// Layer 7 virtual host, lives in `conf.d`.
    Http,
    /// Layer 4 TCP proxy, lives in `stream.d`.
    Stream,
}

/// A rendered configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedProxyConfig {
    /// Proxy context.
    pub kind: ProxyKind,
    /// File name inside the context directory.
    pub file_name: String,
    /// File contents.
    pub contents: String,
}

impl RenderedProxyConfig {
    /// Number of `upstream` blocks in the config.
    pub fn upstream_count(&self) -> usize {
        self.contents
            .lines()
            .filter(|l| l.trim_start().starts_with("upstream "))
            .count()
    }

    /// `server` lines inside `upstream` blocks.
    pub fn upstream_servers(&self) -> Vec<String> {
        let mut in_upstream = false;
        let mut servers = Vec::new();
        for line in self.contents.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("upstream ") {
                in_upstream = true;
            } else if in_upstream && trimmed == "}" {
                in_upstream = false;
            } else if in_upstream && let Some(rest) = trimmed.strip_prefix("server ") {
                servers.push(rest.trim_end_matches(';').to_string());
            }
        }
        servers
    }

    /// Ports from top-level `listen` directives.
    pub fn listen_ports(&self) -> Vec<u16> {
        self.contents
            .lines()
            .filter_map(|l| l.trim().strip_prefix("listen "))
            .filter_map(|rest| {
                let addr = rest.trim_end_matches(';').split_whitespace().next()?;
                addr.rsplit(':').next()?.parse().ok()
            })
            .collect()
    }
}
