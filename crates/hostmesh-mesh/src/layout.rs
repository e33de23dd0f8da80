// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Proxy file layout and main configuration.
//!
//! ```text
//! {root}/nginx.conf        main config, includes both directories
//! {root}/conf.d/*.conf     one HTTP virtual host per service
//! {root}/stream.d/*.conf   one stream proxy per service
//! ```
//!
//! The main config carries a managed block with the CDN's real-IP ranges
//! between [`REAL_IP_BEGIN`] and [`REAL_IP_END`]. The block is replaced in
//! place; everything outside the markers is left untouched.

use hostmesh_core::ResourceKey;
use hostmesh_core::naming;
use tracing::debug;

use crate::error::{MeshError, Result};
use crate::rendered::ProxyKind;
use crate::writer::BlockWriter;

/// Start marker of the managed real-IP block.
pub const REAL_IP_BEGIN: &str = "# BEGIN HOSTMESH REAL IP";

/// End marker of the managed real-IP block.
pub const REAL_IP_END: &str = "# END HOSTMESH REAL IP";

/// Shared `limit_req` zone declared in the main config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitZone {
    /// Zone name referenced by virtual hosts.
    pub name: String,
    /// Zone size, e.g. `10m`.
    pub size: String,
    /// Rate, e.g. `10r/s`.
    pub rate: String,
}

impl Default for RateLimitZone {
    fn default() -> Self {
        Self {
            name: "hostmesh_default".to_string(),
            size: "10m".to_string(),
            rate: "10r/s".to_string(),
        }
    }
}

/// Paths of the proxy configuration tree on a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyLayout {
    root: String,
}

impl ProxyLayout {
    /// Layout rooted at `root` (e.g. `/etc/nginx`).
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_end_matches('/').to_string(),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// HTTP virtual host directory.
    pub fn http_dir(&self) -> String {
        format!("{}/conf.d", self.root)
    }

    /// Stream proxy directory.
    pub fn stream_dir(&self) -> String {
        format!("{}/stream.d", self.root)
    }

    /// Main configuration file.
    pub fn main_config(&self) -> String {
        format!("{}/nginx.conf", self.root)
    }

    /// Directory for a proxy context.
    pub fn dir_for(&self, kind: ProxyKind) -> String {
        match kind {
            ProxyKind::Http => self.http_dir(),
            ProxyKind::Stream => self.stream_dir(),
        }
    }

    /// Config file path of `key` in a proxy context.
    pub fn config_path(&self, kind: ProxyKind, key: &ResourceKey) -> String {
        format!("{}/{}", self.dir_for(kind), naming::proxy_config_name(key))
    }
}

fn write_real_ip_block(w: &mut BlockWriter, ranges: &[String]) {
    w.line(REAL_IP_BEGIN);
    for range in ranges {
        w.directive(format!("set_real_ip_from {}", range));
    }
    if !ranges.is_empty() {
        w.directive("real_ip_header CF-Connecting-IP");
        w.directive("real_ip_recursive on");
    }
    w.line(REAL_IP_END);
}

/// Render the main configuration.
pub fn render_main_config(
    layout: &ProxyLayout,
    real_ip_ranges: &[String],
    zones: &[RateLimitZone],
) -> String {
    let mut w = BlockWriter::new();
    w.line("# Managed by hostmesh");
    w.directive("user nginx");
    w.directive("worker_processes auto");
    w.directive("error_log /var/log/nginx/error.log warn");
    w.directive("pid /var/run/nginx.pid");
    w.blank();
    w.open("events");
    w.directive("worker_connections 4096");
    w.close();
    w.blank();

    w.open("http");
    w.directive(format!("include {}/mime.types", layout.root()));
    w.directive("default_type application/octet-stream");
    w.directive("sendfile on");
    w.directive("tcp_nopush on");
    w.directive("keepalive_timeout 65");
    w.directive("server_tokens off");
    w.directive(
        r#"log_format main '$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent "$http_referer" "$http_user_agent"'"#,
    );
    w.directive("access_log /var/log/nginx/access.log main");
    w.blank();
    for zone in zones {
        w.directive(format!(
            "limit_req_zone $binary_remote_addr zone={}:{} rate={}",
            zone.name, zone.size, zone.rate
        ));
    }
    w.blank();
    write_real_ip_block(&mut w, real_ip_ranges);
    w.blank();
    w.directive(format!("include {}/*.conf", layout.http_dir()));
    w.close();
    w.blank();

    w.open("stream");
    w.directive(format!("include {}/*.conf", layout.stream_dir()));
    w.close();

    w.finish()
}

/// Replace the managed real-IP block inside an existing main config.
///
/// When the markers are missing, the block is inserted right after the
/// first `http {` line. Applying the same ranges twice yields the same text.
pub fn replace_managed_block(existing: &str, ranges: &[String]) -> Result<String> {
    let lines: Vec<&str> = existing.lines().collect();
    let begin = lines.iter().position(|l| l.trim() == REAL_IP_BEGIN);
    let end = lines.iter().position(|l| l.trim() == REAL_IP_END);

    let (insert_at, skip_until, indent) = match (begin, end) {
        (Some(b), Some(e)) if b < e => {
            let indent = lines[b].len() - lines[b].trim_start().len();
            (b, e + 1, indent)
        }
        (None, None) => {
            let http = lines
                .iter()
                .position(|l| l.trim_start().starts_with("http {"))
                .ok_or_else(|| MeshError::ManagedBlock("no http block".to_string()))?;
            let indent = lines[http].len() - lines[http].trim_start().len() + 4;
            (http + 1, http + 1, indent)
        }
        _ => {
            return Err(MeshError::ManagedBlock(
                "unbalanced real-IP markers".to_string(),
            ));
        }
    };

    let mut block = BlockWriter::new();
    write_real_ip_block(&mut block, ranges);
    let pad = " ".repeat(indent);

    let mut out = String::with_capacity(existing.len());
    for line in &lines[..insert_at] {
        out.push_str(line);
        out.push('\n');
    }
    for line in block.finish().lines() {
        out.push_str(&pad);
        out.push_str(line);
        out.push('\n');
    }
    for line in &lines[skip_until..] {
        out.push_str(line);
        out.push('\n');
    }

    debug!(ranges = ranges.len(), "Replaced managed real-IP block");
    Ok(out)
}

/// Parse a newline-separated list of CIDR ranges.
pub fn parse_ip_ranges(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && l.contains('/'))
        .map(str::to_string)
        .collect()
}

/// Fetch the CDN's published IP ranges.
pub async fn fetch_ip_ranges(client: &reqwest::Client, url: &str) -> Result<Vec<String>> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let ranges = parse_ip_ranges(&body);
    if ranges.is_empty() {
        return Err(MeshError::Dns(format!("no IP ranges returned by {}", url)));
    }
    Ok(ranges)
}
