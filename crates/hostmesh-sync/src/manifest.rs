// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Where each category lives locally and on hosts.
//!
//! Both sides share the layout `<root>/<owner>/<project>/<environment>/<category>`.
//! Pull categories may instead live in platform volumes named by
//! [`naming::volume_name`].

use hostmesh_core::category::{Direction, SyncCategory};
use hostmesh_core::naming;
use hostmesh_core::{HostmeshConfig, ResourceKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Storage backing a pull category on hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullStorage {
    /// Host directory bind-mounted into containers.
    HostMounted,
    /// Platform-managed volume.
    Volume,
}

impl PullStorage {
    /// Default storage of `category`.
    pub fn default_for(category: SyncCategory) -> Self {
        match category {
            SyncCategory::Data | SyncCategory::Monitoring => PullStorage::Volume,
            _ => PullStorage::HostMounted,
        }
    }
}

/// Remote side of a manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum RemoteLocation {
    /// Directory on the host.
    Path(String),
    /// Volume name prefix; per-service volumes append `_<service>`.
    Volume(String),
}

/// One category of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Category.
    pub category: SyncCategory,
    /// Directory on the operator machine.
    pub local_path: PathBuf,
    /// Directory or volume on hosts.
    pub remote: RemoteLocation,
    /// Transfer direction, fixed by the category.
    pub direction: Direction,
}

/// Sync layout of one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncManifest {
    key: ResourceKey,
    local_base: PathBuf,
    remote_base: String,
    entries: Vec<ManifestEntry>,
}

/// Overrides of the default pull storage.
pub type StorageOverrides = BTreeMap<SyncCategory, PullStorage>;

impl SyncManifest {
    /// Manifest with the default pull storage.
    pub fn new(config: &HostmeshConfig, key: &ResourceKey) -> Result<Self> {
        Self::with_storage(config, key, &StorageOverrides::new())
    }

    /// Manifest with some pull categories moved between host mounts and
    /// volumes. Overrides for push categories are ignored.
    pub fn with_storage(
        config: &HostmeshConfig,
        key: &ResourceKey,
        overrides: &StorageOverrides,
    ) -> Result<Self> {
        let local_base = config
            .local_root
            .join(&key.owner)
            .join(&key.project)
            .join(&key.environment);
        let remote_base = format!(
            "{}/{}/{}/{}",
            config.remote_root.trim_end_matches('/'),
            key.owner,
            key.project,
            key.environment
        );

        let mut entries = Vec::with_capacity(SyncCategory::ALL.len());
        for category in SyncCategory::ALL {
            let storage = match category.direction() {
                Direction::Push => PullStorage::HostMounted,
                Direction::Pull => overrides
                    .get(&category)
                    .copied()
                    .unwrap_or_else(|| PullStorage::default_for(category)),
            };
            let remote = match storage {
                PullStorage::HostMounted => {
                    RemoteLocation::Path(format!("{}/{}", remote_base, category.as_str()))
                }
                PullStorage::Volume => {
                    RemoteLocation::Volume(naming::volume_name(key, category, None)?)
                }
            };
            entries.push(ManifestEntry {
                category,
                local_path: local_base.join(category.as_str()),
                remote,
                direction: category.direction(),
            });
        }

        Ok(Self {
            key: key.clone(),
            local_base,
            remote_base,
            entries,
        })
    }

    /// Environment identity.
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// `<local_root>/<owner>/<project>/<environment>`
    pub fn local_base(&self) -> &Path {
        &self.local_base
    }

    /// `<remote_root>/<owner>/<project>/<environment>`
    pub fn remote_base(&self) -> &str {
        &self.remote_base
    }

    /// All seven entries in category order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Entry of `category`.
    pub fn entry(&self, category: SyncCategory) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.category == category)
    }

    /// Entries in one direction.
    pub fn by_direction(&self, direction: Direction) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(move |e| e.direction == direction)
    }
}
