// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! TCP stream proxy rendering.
//!
//! Stateful and internal services are published on the stable
//! [`internal_port`](hostmesh_core::ports::internal_port) of their key.
//! Consumers connect to `localhost:<internal port>` and the stream proxy
//! forwards to whichever replicas exist, on this host (container names) or
//! on others (IP addresses). This is the service discovery mechanism of
//! the whole platform.

use hostmesh_core::naming;
use hostmesh_core::ports::internal_port;
use hostmesh_core::service::BackendServer;
use hostmesh_core::ResourceKey;

use crate::error::{MeshError, Result};
use crate::rendered::{ProxyKind, RenderedProxyConfig};
use crate::writer::BlockWriter;

/// Timeouts and retry bounds for a stream proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    /// `proxy_connect_timeout` in seconds.
    pub connect_timeout_secs: u32,
    /// `proxy_timeout` in seconds (idle read/write).
    pub timeout_secs: u32,
    /// `proxy_next_upstream_tries`.
    pub next_upstream_tries: u32,
    /// `proxy_next_upstream_timeout` in seconds.
    pub next_upstream_timeout_secs: u32,
    /// Default `max_fails` for servers that do not set one.
    pub max_fails: u32,
    /// Default `fail_timeout` for servers that do not set one.
    pub fail_timeout_secs: u32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 2,
            timeout_secs: 30,
            next_upstream_tries: 3,
            next_upstream_timeout_secs: 10,
            max_fails: 3,
            fail_timeout_secs: 10,
        }
    }
}

/// Name of the stream upstream block for `key`.
pub fn stream_upstream_name(key: &ResourceKey) -> String {
    format!("{}_stream", naming::container_name(key))
}

/// Render the stream proxy for `key`.
///
/// The listener is always `internal_port(key)`, independent of how many
/// backends there are or where they run.
pub fn render_stream(
    key: &ResourceKey,
    backends: &[BackendServer],
    options: &StreamOptions,
) -> Result<RenderedProxyConfig> {
    if backends.is_empty() {
        return Err(MeshError::InvalidSpec(format!(
            "{} has no stream backends",
            key
        )));
    }

    let upstream = stream_upstream_name(key);
    let port = internal_port(key);

    let mut w = BlockWriter::new();
    w.line(format!("# Managed by hostmesh: {} (stream)", key));
    w.open(format!("upstream {}", upstream));
    for backend in backends {
        let mut line = format!(
            "server {} max_fails={} fail_timeout={}s",
            backend.target,
            backend.max_fails.unwrap_or(options.max_fails),
            backend.fail_timeout_secs.unwrap_or(options.fail_timeout_secs)
        );
        if let Some(weight) = backend.weight {
            line.push_str(&format!(" weight={}", weight));
        }
        w.directive(line);
    }
    w.close();
    w.blank();

    w.open("server");
    w.directive(format!("listen {}", port));
    w.directive(format!("proxy_pass {}", upstream));
    w.directive(format!(
        "proxy_connect_timeout {}s",
        options.connect_timeout_secs
    ));
    w.directive(format!("proxy_timeout {}s", options.timeout_secs));
    w.directive("proxy_next_upstream on");
    w.directive(format!(
        "proxy_next_upstream_tries {}",
        options.next_upstream_tries
    ));
    w.directive(format!(
        "proxy_next_upstream_timeout {}s",
        options.next_upstream_timeout_secs
    ));
    w.close();

    Ok(RenderedProxyConfig {
        kind: ProxyKind::Stream,
        file_name: naming::proxy_config_name(key),
        contents: w.finish(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_backends() {
        let key = ResourceKey::new("alice", "shop", "prod", "postgres");
        assert!(render_stream(&key, &[], &StreamOptions::default()).is_err());
    }

    #[test]
    fn test_backend_overrides() {
        let key = ResourceKey::new("alice", "shop", "prod", "postgres");
        let mut backend = BackendServer::address("10.0.0.2", 15432);
        backend.max_fails = Some(1);
        backend.weight = Some(5);
        let out = render_stream(&key, &[backend], &StreamOptions::default()).unwrap();
        assert_eq!(
            out.upstream_servers(),
            vec!["10.0.0.2:15432 max_fails=1 fail_timeout=10s weight=5"]
        );
        assert!(out.contents.contains("proxy_connect_timeout 2s;"));
        assert!(out.contents.contains("proxy_next_upstream_tries 3;"));
    }
}
