// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service specification.
//!
//! Declares what a service needs from the mesh and the platform: domains,
//! backends, ports, secrets, proxy features and TLS intent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a backend lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendTarget {
    /// Container reachable by name on the shared network (single-host).
    Container {
        /// Container name.
        name: String,
        /// Port inside the container.
        port: u16,
    },
    /// Host reachable by address (multi-host).
    Address {
        /// IP address or hostname.
        ip: String,
        /// Port on that host.
        port: u16,
    },
}

impl BackendTarget {
    /// Host part used in proxy configuration.
    pub fn host(&self) -> &str {
        match self {
            BackendTarget::Container { name, .. } => name,
            BackendTarget::Address { ip, .. } => ip,
        }
    }

    /// Port part used in proxy configuration.
    pub fn port(&self) -> u16 {
        match self {
            BackendTarget::Container { port, .. } | BackendTarget::Address { port, .. } => *port,
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host(), self.port())
    }
}

/// One backend server with optional load-balancing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendServer {
    /// Backend location.
    #[serde(flatten)]
    pub target: BackendTarget,
    /// Relative weight in the upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// Failures before the server is marked unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fails: Option<u32>,
    /// Seconds the server stays unavailable after `max_fails`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_timeout_secs: Option<u32>,
}

impl BackendServer {
    /// Backend addressed by container name.
    pub fn container(name: impl Into<String>, port: u16) -> Self {
        Self::from_target(BackendTarget::Container {
            name: name.into(),
            port,
        })
    }

    /// Backend addressed by IP.
    pub fn address(ip: impl Into<String>, port: u16) -> Self {
        Self::from_target(BackendTarget::Address {
            ip: ip.into(),
            port,
        })
    }

    fn from_target(target: BackendTarget) -> Self {
        Self {
            target,
            weight: None,
            max_fails: None,
            fail_timeout_secs: None,
        }
    }
}

/// Upstream balancing strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    /// nginx default.
    #[default]
    RoundRobin,
    /// `least_conn`
    LeastConnections,
    /// `ip_hash`
    IpHash,
    /// `random`
    Random,
}

/// Request rate limit bound to a shared zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Shared memory zone name declared in the main config.
    pub zone: String,
    /// Allowed burst above the zone rate.
    pub burst: u32,
}

/// HTTP basic auth settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    /// Realm shown to clients.
    pub realm: String,
    /// Path of the htpasswd file on the proxy host.
    pub htpasswd_path: String,
}

/// Optional proxy features for an HTTP virtual host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyFeatures {
    /// Forward websocket upgrade headers.
    pub websocket: bool,
    /// Apply `limit_req`.
    pub rate_limit: Option<RateLimit>,
    /// Long-lived cache headers for static assets.
    pub static_cache: bool,
    /// Path answered directly by the proxy with a fixed 200.
    pub health_check_path: Option<String>,
    /// Protect the vhost with basic auth.
    pub basic_auth: Option<BasicAuth>,
    /// Emit standard security headers.
    pub security_headers: bool,
    /// Enable gzip compression.
    pub gzip: bool,
    /// `client_max_body_size` value, e.g. `50m`.
    pub client_max_body_size: Option<String>,
    /// Balancing strategy when more than one backend is present.
    pub balance: BalanceStrategy,
    /// Raw configuration appended inside the server block.
    pub extra_config: Option<String>,
}

impl Default for ProxyFeatures {
    fn default() -> Self {
        Self {
            websocket: false,
            rate_limit: None,
            static_cache: false,
            health_check_path: None,
            basic_auth: None,
            security_headers: true,
            gzip: true,
            client_max_body_size: None,
            balance: BalanceStrategy::default(),
            extra_config: None,
        }
    }
}

/// ACME challenge preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationIntent {
    /// Pick from whatever credentials are present.
    #[default]
    Auto,
    /// Require HTTP-01.
    Http01,
    /// Require DNS-01.
    Dns01,
}

/// TLS settings and credentials for a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsIntent {
    /// Serve HTTPS at all.
    pub enabled: bool,
    /// ACME account email.
    pub email: Option<String>,
    /// Cloudflare API token for DNS-01.
    pub cloudflare_token: Option<String>,
    /// Requested challenge type.
    pub verification: VerificationIntent,
}

/// Backend topology derived from the backend list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Backends are container names on one host.
    SingleHost,
    /// At least one backend is addressed by IP.
    MultiHost,
}

/// Everything the mesh and platform need to know about a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSpec {
    /// Public domain names.
    pub domains: Vec<String>,
    /// Backend servers.
    pub backends: Vec<BackendServer>,
    /// Ports the container listens on.
    pub container_ports: Vec<u16>,
    /// Secret keys the service requires.
    pub secret_keys: Vec<String>,
    /// HTTP proxy features.
    pub features: ProxyFeatures,
    /// TLS intent.
    pub tls: TlsIntent,
    /// Stateful services (databases, caches) are reached through the
    /// stream proxy and share their secrets with consumers.
    pub stateful: bool,
}

impl ServiceSpec {
    /// Topology implied by the backends.
    pub fn topology(&self) -> Topology {
        if self
            .backends
            .iter()
            .any(|b| matches!(b.target, BackendTarget::Address { .. }))
        {
            Topology::MultiHost
        } else {
            Topology::SingleHost
        }
    }

    /// Primary domain, if any.
    pub fn primary_domain(&self) -> Option<&str> {
        self.domains.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology() {
        let mut spec = ServiceSpec {
            backends: vec![BackendServer::container("a", 80)],
            ..Default::default()
        };
        assert_eq!(spec.topology(), Topology::SingleHost);

        spec.backends.push(BackendServer::address("10.0.0.2", 80));
        assert_eq!(spec.topology(), Topology::MultiHost);
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: ServiceSpec = serde_json::from_value(serde_json::json!({
            "domains": ["shop.example.com"],
            "backends": [{"kind": "container", "name": "alice_shop_prod_api", "port": 8080, "weight": 2}]
        }))
        .unwrap();

        assert_eq!(spec.primary_domain(), Some("shop.example.com"));
        assert_eq!(spec.backends[0].weight, Some(2));
        assert_eq!(spec.backends[0].target.to_string(), "alice_shop_prod_api:8080");
        assert!(spec.features.security_headers);
        assert!(!spec.tls.enabled);
    }
}
