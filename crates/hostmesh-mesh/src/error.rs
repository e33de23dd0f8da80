// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for hostmesh-mesh.

use thiserror::Error;

/// Mesh errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MeshError {
    /// Service specification cannot be rendered.
    #[error("Invalid service spec: {0}")]
    InvalidSpec(String),

    /// Let's Encrypt requested without an account email.
    #[error("Let's Encrypt requires an email address")]
    MissingEmail,

    /// DNS-01 requested without a Cloudflare token.
    #[error("DNS-01 verification requires a Cloudflare API token")]
    MissingDnsToken,

    /// Certificate issuance failed.
    #[error("Certificate issuance failed for {domain}: {reason}")]
    Certificate {
        /// First domain of the request.
        domain: String,
        /// Underlying reason.
        reason: String,
    },

    /// Proxy could not be brought back after certificate issuance.
    #[error("Proxy restart failed: {0}")]
    ProxyRestart(String),

    /// Proxy rejected the generated configuration.
    #[error("Proxy configuration test failed: {0}")]
    ConfigTest(String),

    /// Managed block markers are missing and there is no `http {` to anchor on.
    #[error("Cannot place managed block: {0}")]
    ManagedBlock(String),

    /// Cloudflare API returned an error.
    #[error("DNS provider error: {0}")]
    Dns(String),

    /// Zone for a domain was not found.
    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Command execution failed.
    #[error("Exec error: {0}")]
    Exec(#[from] hostmesh_core::ExecError),

    /// Self-signed certificate generation failed.
    #[error("Key generation error: {0}")]
    KeyGen(#[from] rcgen::Error),
}

/// Result type using MeshError.
pub type Result<T> = std::result::Result<T, MeshError>;
