// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostmesh Mesh - Reverse Proxy and Service Mesh
//!
//! Generates nginx configuration for every service and applies it to
//! proxy hosts through the [`CommandExecutor`](hostmesh_core::CommandExecutor)
//! seam.
//!
//! - Public services get an HTTP virtual host (`conf.d`). One backend is
//!   proxied directly; several share a named `upstream`.
//! - Stateful services get a TCP stream proxy (`stream.d`) listening on
//!   the service's stable internal port. Consumers always connect to
//!   `localhost:<internal port>` regardless of where replicas run.
//!
//! # Modules
//!
//! - [`http`]: HTTP virtual host rendering
//! - [`stream`]: TCP stream proxy rendering
//! - [`layout`]: File layout, main config and managed real-IP block
//! - [`certs`]: Self-signed, HTTP-01 and DNS-01 certificates
//! - [`dns`]: DNS provider seam and Cloudflare client
//! - [`firewall`]: ufw policy
//! - [`configurator`]: Write, validate, reload

#![deny(missing_docs)]

mod writer;

/// Certificate issuance.
pub mod certs;

/// Config application to hosts.
pub mod configurator;

/// DNS records.
pub mod dns;

/// Error types.
pub mod error;

/// Firewall policy.
pub mod firewall;

/// HTTP virtual hosts.
pub mod http;

/// Proxy file layout.
pub mod layout;

/// Rendered config artifacts.
pub mod rendered;

/// TCP stream proxies.
pub mod stream;

pub use certs::{CertificateIssuer, CertificateMode};
pub use configurator::MeshConfigurator;
pub use dns::{CloudflareClient, DnsProvider, DnsRecord};
pub use error::{MeshError, Result};
pub use firewall::FirewallPolicy;
pub use http::render_http;
pub use rendered::{ProxyKind, RenderedProxyConfig};
pub use stream::render_stream;
