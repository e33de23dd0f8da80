// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Secret fan-out.
//!
//! Consumers of a database or cache need its credentials. Before a push,
//! every file under `secrets/<stateful>/` is copied into
//! `secrets/<consumer>/` of each non-stateful service, keeping file names.
//! Copies overwrite, so fan-out can run before every push.

use hostmesh_core::naming;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// A service of the environment being pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRole {
    /// Service name, the directory under `secrets/`.
    pub name: String,
    /// Databases, caches and search engines.
    pub stateful: bool,
}

impl ServiceRole {
    /// Stateful service.
    pub fn stateful(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stateful: true,
        }
    }

    /// Consumer service.
    pub fn consumer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stateful: false,
        }
    }

    fn dir_name(&self) -> String {
        naming::sanitize(&self.name)
    }
}

/// Copy stateful secrets into consumer directories under `secrets_root`.
///
/// Returns the number of files written. Stateful services without a
/// secrets directory contribute nothing.
pub fn fan_out_secrets(secrets_root: &Path, services: &[ServiceRole]) -> Result<usize> {
    let consumers: Vec<&ServiceRole> = services.iter().filter(|s| !s.stateful).collect();
    if consumers.is_empty() {
        return Ok(0);
    }

    let mut providers: Vec<&ServiceRole> = services.iter().filter(|s| s.stateful).collect();
    // Sorted so that clashing file names resolve the same way every run.
    providers.sort_by(|a, b| a.name.cmp(&b.name));

    let mut written = 0;
    for provider in providers {
        let source = secrets_root.join(provider.dir_name());
        if !source.is_dir() {
            debug!(service = %provider.name, "No secrets to fan out");
            continue;
        }
        for consumer in &consumers {
            let target = secrets_root.join(consumer.dir_name());
            written += copy_files(&source, &target)?;
        }
        debug!(service = %provider.name, consumers = consumers.len(), "Fanned out secrets");
    }

    if written > 0 {
        info!(files = written, "Secret fan-out complete");
    }
    Ok(written)
}

fn copy_files(source: &Path, target: &Path) -> Result<usize> {
    fs::create_dir_all(target).map_err(|e| SyncError::io(target, e))?;
    let mut copied = 0;
    for entry in fs::read_dir(source).map_err(|e| SyncError::io(source, e))? {
        let entry = entry.map_err(|e| SyncError::io(source, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| SyncError::io(&path, e))?;
        let dest = target.join(entry.file_name());
        if file_type.is_dir() {
            copied += copy_files(&path, &dest)?;
        } else if file_type.is_file() {
            fs::copy(&path, &dest).map_err(|e| SyncError::io(&dest, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn secrets() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("postgres")).unwrap();
        fs::create_dir_all(dir.path().join("api")).unwrap();
        fs::write(dir.path().join("postgres/POSTGRES_PASSWORD"), "pg").unwrap();
        fs::write(dir.path().join("api/API_KEY"), "k").unwrap();
        dir
    }

    #[test]
    fn test_stateful_secrets_reach_every_consumer() {
        let dir = secrets();
        let services = [
            ServiceRole::stateful("postgres"),
            ServiceRole::stateful("redis"),
            ServiceRole::consumer("api"),
            ServiceRole::consumer("worker"),
        ];
        assert_eq!(fan_out_secrets(dir.path(), &services).unwrap(), 2);

        for consumer in ["api", "worker"] {
            assert_eq!(
                fs::read_to_string(dir.path().join(consumer).join("POSTGRES_PASSWORD")).unwrap(),
                "pg"
            );
        }
        assert!(dir.path().join("api/API_KEY").exists());
        assert!(!dir.path().join("postgres/API_KEY").exists());
    }

    #[test]
    fn test_fan_out_is_repeatable() {
        let dir = secrets();
        let services = [ServiceRole::stateful("postgres"), ServiceRole::consumer("api")];
        assert_eq!(fan_out_secrets(dir.path(), &services).unwrap(), 1);
        assert_eq!(fan_out_secrets(dir.path(), &services).unwrap(), 1);
        assert_eq!(fs::read_dir(dir.path().join("api")).unwrap().count(), 2);
    }

    #[test]
    fn test_no_consumers() {
        let dir = secrets();
        assert_eq!(
            fan_out_secrets(dir.path(), &[ServiceRole::stateful("postgres")]).unwrap(),
            0
        );
    }
}
