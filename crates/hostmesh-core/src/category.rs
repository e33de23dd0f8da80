// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Synchronization categories.
//!
//! The seven fixed directory categories every environment owns. Direction
//! is a property of the category, never of the call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::naming::NamingError;

/// Transfer direction of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Operator machine to hosts.
    Push,
    /// Hosts to operator machine.
    Pull,
}

/// Directory category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncCategory {
    /// Service configuration files.
    Config,
    /// Credentials, one directory per service.
    Secrets,
    /// Static files bind-mounted into containers.
    Files,
    /// Application data.
    Data,
    /// Service logs.
    Logs,
    /// Backup dumps.
    Backups,
    /// Metrics and monitoring state.
    Monitoring,
}

impl SyncCategory {
    /// All categories in a stable order.
    pub const ALL: [SyncCategory; 7] = [
        SyncCategory::Config,
        SyncCategory::Secrets,
        SyncCategory::Files,
        SyncCategory::Data,
        SyncCategory::Logs,
        SyncCategory::Backups,
        SyncCategory::Monitoring,
    ];

    /// Categories sent to hosts.
    pub const PUSH: [SyncCategory; 3] = [
        SyncCategory::Config,
        SyncCategory::Secrets,
        SyncCategory::Files,
    ];

    /// Categories fetched from hosts.
    pub const PULL: [SyncCategory; 4] = [
        SyncCategory::Data,
        SyncCategory::Logs,
        SyncCategory::Backups,
        SyncCategory::Monitoring,
    ];

    /// Directory / volume segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncCategory::Config => "config",
            SyncCategory::Secrets => "secrets",
            SyncCategory::Files => "files",
            SyncCategory::Data => "data",
            SyncCategory::Logs => "logs",
            SyncCategory::Backups => "backups",
            SyncCategory::Monitoring => "monitoring",
        }
    }

    /// Fixed direction.
    pub fn direction(&self) -> Direction {
        match self {
            SyncCategory::Config | SyncCategory::Secrets | SyncCategory::Files => Direction::Push,
            _ => Direction::Pull,
        }
    }

    /// Whether the category may live in a platform-managed volume.
    ///
    /// Push categories are always host bind mounts.
    pub fn volume_capable(&self) -> bool {
        self.direction() == Direction::Pull
    }
}

impl fmt::Display for SyncCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncCategory {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| NamingError::UnknownCategory(s.to_string()))
    }
}
