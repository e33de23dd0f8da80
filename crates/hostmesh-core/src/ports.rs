// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hash-based port allocation.
//!
//! Ports are a SHA-256 digest of the identity truncated to 32 bits and
//! mapped into a fixed window per allocation class. Nothing is recorded
//! anywhere, so two identities can land on the same port. That risk is
//! accepted in exchange for needing no coordination service; callers that
//! need a guarantee can check a set of keys with [`PortLedger`].

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::naming;
use crate::resource::ResourceKey;

/// Lowest port handed out by [`internal_port`] and the default base for
/// [`host_port`].
pub const WIDE_RANGE_START: u16 = 5000;

/// Exclusive upper bound of the wide range.
pub const WIDE_RANGE_END: u16 = 65535;

/// Errors from port allocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PortError {
    /// Allocation class string is not recognized.
    #[error("Unknown allocation class: {0}")]
    UnknownClass(String),
}

/// Allocation class for [`hash_port`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// HTTP applications, `[8000, 10000)`.
    Web,
    /// Databases, `[5000, 6000)`.
    Database,
    /// Caches, `[6000, 7000)`.
    Cache,
    /// Search engines, `[9000, 10000)`.
    Search,
    /// Proxies, `[7000, 8000)`.
    Proxy,
    /// Background workers expose nothing.
    Worker,
}

impl ServiceType {
    /// `(start, width)` of the class window, `None` for classes without a port.
    pub fn window(&self) -> Option<(u16, u16)> {
        match self {
            ServiceType::Web => Some((8000, 2000)),
            ServiceType::Database => Some((5000, 1000)),
            ServiceType::Cache => Some((6000, 1000)),
            ServiceType::Search => Some((9000, 1000)),
            ServiceType::Proxy => Some((7000, 1000)),
            ServiceType::Worker => None,
        }
    }

    /// Name hashed into the digest.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Web => "web",
            ServiceType::Database => "database",
            ServiceType::Cache => "cache",
            ServiceType::Search => "search",
            ServiceType::Proxy => "proxy",
            ServiceType::Worker => "worker",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "web" => Ok(ServiceType::Web),
            "database" | "db" => Ok(ServiceType::Database),
            "cache" => Ok(ServiceType::Cache),
            "search" => Ok(ServiceType::Search),
            "proxy" => Ok(ServiceType::Proxy),
            "worker" => Ok(ServiceType::Worker),
            _ => Err(PortError::UnknownClass(s.to_string())),
        }
    }
}

/// First 32 bits of SHA-256 over `input`, big-endian.
fn digest32(input: &str) -> u32 {
    let digest = Sha256::digest(input.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

fn map_into(hash: u32, start: u16, width: u16) -> u16 {
    if width == 0 {
        return start;
    }
    // hash % width < width, so the sum stays below start + width
    start + (hash % u32::from(width)) as u16
}

/// Port for a service class within a project environment.
pub fn hash_port(service_type: ServiceType, project: &str, env: &str) -> Option<u16> {
    let (start, width) = service_type.window()?;
    let hash = digest32(&format!("{}-{}-{}", project, env, service_type));
    Some(map_into(hash, start, width))
}

/// Hash input for `key`. Fields are sanitized the same way container names
/// are, so keys that name the same container get the same ports.
fn identity(key: &ResourceKey) -> String {
    format!(
        "{}-{}-{}-{}",
        naming::sanitize(&key.owner),
        naming::sanitize(&key.project),
        naming::sanitize(&key.environment),
        naming::sanitize(&key.service)
    )
}

/// Stable port the stream proxy listens on for `key`.
///
/// Depends only on the identity, so it never changes across redeploys,
/// replica counts or host topology.
pub fn internal_port(key: &ResourceKey) -> u16 {
    let hash = digest32(&identity(key));
    map_into(hash, WIDE_RANGE_START, WIDE_RANGE_END - WIDE_RANGE_START)
}

/// Host-facing port for `container_port` of `key`, at or above `base`.
///
/// `base` is clamped to `WIDE_RANGE_END - 1` so the window is never empty.
pub fn host_port(key: &ResourceKey, container_port: u16, base: u16) -> u16 {
    let hash = digest32(&format!("{}-{}", identity(key), container_port));
    let start = base.min(WIDE_RANGE_END - 1);
    map_into(hash, start, WIDE_RANGE_END - start)
}

/// Which allocation produced a port, for collision reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// From [`internal_port`].
    Internal(ResourceKey),
    /// From [`host_port`] with the given container port.
    Host(ResourceKey, u16),
}

/// Opt-in uniqueness check over a known set of allocations.
///
/// Allocation itself stays stateless; the ledger only reports ports that
/// were handed to more than one identity.
#[derive(Debug, Default)]
pub struct PortLedger {
    ports: BTreeMap<u16, Vec<Allocation>>,
}

impl PortLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the internal port of `key`; returns the port.
    pub fn record_internal(&mut self, key: &ResourceKey) -> u16 {
        let port = internal_port(key);
        self.ports
            .entry(port)
            .or_default()
            .push(Allocation::Internal(key.clone()));
        port
    }

    /// Record a host port of `key`; returns the port.
    pub fn record_host(&mut self, key: &ResourceKey, container_port: u16, base: u16) -> u16 {
        let port = host_port(key, container_port, base);
        self.ports
            .entry(port)
            .or_default()
            .push(Allocation::Host(key.clone(), container_port));
        port
    }

    /// Ports claimed more than once.
    pub fn collisions(&self) -> Vec<(u16, &[Allocation])> {
        self.ports
            .iter()
            .filter(|(_, owners)| owners.len() > 1)
            .map(|(port, owners)| (*port, owners.as_slice()))
            .collect()
    }
}
