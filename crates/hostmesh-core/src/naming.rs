// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deterministic artifact naming.
//!
//! Every name is a pure function of a [`ResourceKey`]. Segments are
//! lower-cased and stripped of anything outside `[a-z0-9_.-]` before being
//! joined with [`SEPARATOR`].
//!
//! [`parse_container_name`] is the lossy inverse: the first three fields
//! are taken as single tokens and everything after them is the service.
//! A service name that itself contains `_` therefore parses back
//! correctly, but an owner, project or environment containing `_` does
//! not. This greedy-suffix behavior is relied upon and kept as is.

use thiserror::Error;

use crate::category::SyncCategory;
use crate::resource::ResourceKey;

/// Field separator for composite names.
pub const SEPARATOR: char = '_';

/// Network shared by all tenants. Isolation comes from unique names and
/// per-tenant hashed ports, not from separate networks.
pub const SHARED_NETWORK: &str = "hostmesh_network";

/// Errors from name parsing and category validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum NamingError {
    /// Name does not have at least four separator-delimited fields.
    #[error("Invalid container name: {0}")]
    InvalidContainerName(String),

    /// Category string is not one of the fixed categories.
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// Category cannot be backed by a volume.
    #[error("Category {0} is not volume-backed")]
    NotVolumeCategory(SyncCategory),
}

/// Result type for naming operations.
pub type Result<T> = std::result::Result<T, NamingError>;

/// Lower-case and drop characters outside `[a-z0-9_.-]`.
pub fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'))
        .collect()
}

fn join(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| sanitize(s))
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// `{owner}_{project}_{env}_{service}`
pub fn container_name(key: &ResourceKey) -> String {
    join(&[&key.owner, &key.project, &key.environment, &key.service])
}

/// Container name followed by `*`, matching the primary container and any
/// secondary or toggle variant sharing the prefix.
pub fn container_name_pattern(key: &ResourceKey) -> String {
    format!("{}*", container_name(key))
}

/// Inverse of [`container_name`].
pub fn parse_container_name(name: &str) -> Result<ResourceKey> {
    let mut parts = name.splitn(4, SEPARATOR);
    let (Some(owner), Some(project), Some(environment), Some(service)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(NamingError::InvalidContainerName(name.to_string()));
    };

    if [owner, project, environment, service]
        .iter()
        .any(|s| s.is_empty())
    {
        return Err(NamingError::InvalidContainerName(name.to_string()));
    }

    Ok(ResourceKey::new(owner, project, environment, service))
}

/// `{account}/{container_name}:{version}`
pub fn image_name(registry_account: &str, key: &ResourceKey, version: &str) -> String {
    format!(
        "{}/{}:{}",
        sanitize(registry_account),
        container_name(key),
        sanitize(version)
    )
}

/// `Dockerfile.{container_name}`
pub fn dockerfile_name(key: &ResourceKey) -> String {
    format!("Dockerfile.{}", container_name(key))
}

/// `{container_name}.conf`, used for both HTTP and stream proxy files.
pub fn proxy_config_name(key: &ResourceKey) -> String {
    format!("{}.conf", container_name(key))
}

/// The shared network name.
pub fn network_name() -> &'static str {
    SHARED_NETWORK
}

/// `{owner}_{project}_{env}_{category}[_{service}]`
///
/// The key's own service is ignored; pass `service` for per-service
/// ("exploded") volumes.
pub fn volume_name(
    key: &ResourceKey,
    category: SyncCategory,
    service: Option<&str>,
) -> Result<String> {
    if !category.volume_capable() {
        return Err(NamingError::NotVolumeCategory(category));
    }
    let mut segments = vec![
        key.owner.as_str(),
        key.project.as_str(),
        key.environment.as_str(),
        category.as_str(),
    ];
    if let Some(service) = service {
        segments.push(service);
    }
    Ok(join(&segments))
}

/// DNS-1123 label form of a name (Kubernetes object names).
///
/// `_` and `.` become `-`, leading/trailing `-` are trimmed.
pub fn kubernetes_name(name: &str) -> String {
    sanitize(name)
        .replace(['_', '.'], "-")
        .trim_matches('-')
        .to_string()
}

/// Filesystem-safe directory name for a host address.
pub fn host_dir_name(host: &str) -> String {
    host.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
