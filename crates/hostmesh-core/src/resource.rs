// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource identity.
//!
//! A [`ResourceKey`] names one service of one environment of one project
//! belonging to one owner. Every container, image, volume, proxy file and
//! port the orchestrator touches is derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity tuple for a deployed service.
///
/// All fields are opaque strings supplied by the caller. The key is never
/// persisted by hostmesh itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Tenant that owns the project.
    pub owner: String,
    /// Project name.
    pub project: String,
    /// Environment name (e.g. `prod`, `staging`).
    pub environment: String,
    /// Service name within the environment.
    pub service: String,
}

impl ResourceKey {
    /// Create a new resource key.
    pub fn new(
        owner: impl Into<String>,
        project: impl Into<String>,
        environment: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            project: project.into(),
            environment: environment.into(),
            service: service.into(),
        }
    }

    /// Same owner/project/environment, different service.
    pub fn with_service(&self, service: impl Into<String>) -> Self {
        Self {
            owner: self.owner.clone(),
            project: self.project.clone(),
            environment: self.environment.clone(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.owner, self.project, self.environment, self.service
        )
    }
}
