// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parallel push and pull across hosts.
//!
//! # Push
//!
//! 1. Fan stateful secrets out to consumers.
//! 2. Pack `config`, `secrets` and `files` into one tar.gz.
//! 3. Stream it to every host, at most `max_parallel_transfers` at a time:
//!    `mkdir -p`, `tar -xzf -`, then tighten `secrets` to 0700/0600.
//!
//! # Pull
//!
//! Every pull category on every host is one job. Host-mounted categories
//! are streamed with `tar -czf -`. Volume-backed categories go through a
//! disposable helper container; volumes named `<volume>_<service>` land in
//! a per-service subdirectory.
//!
//! A failing host never cancels the others. Only local preparation errors
//! are returned as `Err`.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use hostmesh_core::category::{Direction, SyncCategory};
use hostmesh_core::naming;
use hostmesh_core::{CommandExecutor, ExecError, ExecRequest, HostTarget, HostmeshConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::archive::{pack_dirs, unpack};
use crate::error::Result;
use crate::fanout::{ServiceRole, fan_out_secrets};
use crate::manifest::{ManifestEntry, RemoteLocation, SyncManifest};
use crate::report::{SyncOperation, SyncReport, TransferOutcome};

const PUSH_TARGET: &str = "push";
const MISSING_DIR: &str = "No such file or directory";
/// GNU tar exit status when files changed while being archived.
const TAR_FILES_CHANGED: i32 = 1;

/// Sync engine bound to an executor and configuration.
pub struct SyncEngine {
    executor: Arc<dyn CommandExecutor>,
    max_parallel: usize,
    helper_image: String,
}

impl SyncEngine {
    /// Create an engine.
    pub fn new(executor: Arc<dyn CommandExecutor>, config: &HostmeshConfig) -> Self {
        Self {
            executor,
            max_parallel: config.max_parallel_transfers.max(1),
            helper_image: config.helper_image.clone(),
        }
    }

    fn concurrency(&self, jobs: usize) -> usize {
        self.max_parallel.min(jobs).max(1)
    }

    /// Push configuration, secrets and files to every host.
    pub async fn push(
        &self,
        manifest: &SyncManifest,
        services: &[ServiceRole],
        hosts: &[HostTarget],
    ) -> Result<SyncReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let local_base = manifest.local_base();

        fan_out_secrets(&local_base.join(SyncCategory::Secrets.as_str()), services)?;
        let dirs: Vec<&str> = SyncCategory::PUSH.iter().map(SyncCategory::as_str).collect();
        let archive = pack_dirs(local_base, &dirs)?;

        info!(
            environment = %manifest.remote_base(),
            hosts = hosts.len(),
            bytes = archive.len(),
            "Pushing"
        );

        let outcomes: Vec<TransferOutcome> = stream::iter(hosts)
            .map(|host| self.push_host(host, manifest.remote_base(), &archive))
            .buffer_unordered(self.concurrency(hosts.len()))
            .collect()
            .await;

        let report = SyncReport::new(SyncOperation::Push, started_at, start.elapsed(), outcomes);
        info!(
            success = report.success(),
            failed = report.failures().count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Push finished"
        );
        Ok(report)
    }

    async fn push_host(&self, host: &HostTarget, remote_base: &str, archive: &[u8]) -> TransferOutcome {
        let start = Instant::now();
        match self.extract_on(host, remote_base, archive).await {
            Ok(()) => {
                debug!(host = %host, "Push complete");
                TransferOutcome::ok(host, PUSH_TARGET, archive.len() as u64, start.elapsed())
            }
            Err(e) => {
                warn!(host = %host, error = %e, "Push failed");
                TransferOutcome::failed(host, PUSH_TARGET, e, start.elapsed())
            }
        }
    }

    async fn extract_on(
        &self,
        host: &HostTarget,
        remote_base: &str,
        archive: &[u8],
    ) -> std::result::Result<(), ExecError> {
        let mut mkdir = vec!["mkdir".to_string(), "-p".to_string()];
        mkdir.extend(
            SyncCategory::PUSH
                .iter()
                .map(|c| format!("{}/{}", remote_base, c.as_str())),
        );
        self.executor.run(host, ExecRequest::new(mkdir)).await?;

        self.executor
            .run(
                host,
                ExecRequest::new(["tar", "-xzf", "-", "-C", remote_base]).with_stdin(archive.to_vec()),
            )
            .await?;

        let secrets = format!("{}/{}", remote_base, SyncCategory::Secrets.as_str());
        for (kind, mode) in [("d", "700"), ("f", "600")] {
            self.executor
                .run(
                    host,
                    ExecRequest::new([
                        "find",
                        secrets.as_str(),
                        "-type",
                        kind,
                        "-exec",
                        "chmod",
                        mode,
                        "{}",
                        "+",
                    ]),
                )
                .await?;
        }
        Ok(())
    }

    /// Pull data, logs, backups and monitoring from every host.
    pub async fn pull(&self, manifest: &SyncManifest, hosts: &[HostTarget]) -> Result<SyncReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        let jobs: Vec<(&ManifestEntry, &HostTarget)> = manifest
            .by_direction(Direction::Pull)
            .flat_map(|entry| hosts.iter().map(move |host| (entry, host)))
            .collect();
        info!(environment = %manifest.remote_base(), hosts = hosts.len(), jobs = jobs.len(), "Pulling");

        let concurrency = self.concurrency(jobs.len());
        let outcomes: Vec<TransferOutcome> = stream::iter(jobs)
            .map(|(entry, host)| self.pull_entry(entry, host))
            .buffer_unordered(concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        let report = SyncReport::new(SyncOperation::Pull, started_at, start.elapsed(), outcomes);
        info!(
            success = report.success(),
            failed = report.failures().count(),
            bytes = report.total_bytes(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Pull finished"
        );
        Ok(report)
    }

    async fn pull_entry(&self, entry: &ManifestEntry, host: &HostTarget) -> Vec<TransferOutcome> {
        let dest = entry
            .local_path
            .join(naming::host_dir_name(host.address()));
        match &entry.remote {
            RemoteLocation::Path(dir) => vec![self.pull_dir(host, entry.category, dir, &dest).await],
            RemoteLocation::Volume(volume) => {
                self.pull_volumes(host, entry.category, volume, &dest).await
            }
        }
    }

    async fn pull_dir(
        &self,
        host: &HostTarget,
        category: SyncCategory,
        dir: &str,
        dest: &Path,
    ) -> TransferOutcome {
        let start = Instant::now();
        let target = category.as_str();
        let out = match self
            .executor
            .exec(host, ExecRequest::new(["tar", "-czf", "-", "-C", dir, "."]))
            .await
        {
            Ok(out) => out,
            Err(e) => {
                warn!(host = %host, category = %category, error = %e, "Pull failed");
                return TransferOutcome::failed(host, target, e, start.elapsed());
            }
        };
        if out.exit_code == TAR_FILES_CHANGED && !out.stdout.is_empty() {
            warn!(
                host = %host,
                category = %category,
                stderr = %out.stderr.trim(),
                "Files changed during pull"
            );
        } else if !out.success() {
            if out.stderr.contains(MISSING_DIR) {
                debug!(host = %host, dir = %dir, "Nothing to pull");
                return TransferOutcome::ok(host, target, 0, start.elapsed());
            }
            warn!(host = %host, category = %category, stderr = %out.stderr.trim(), "Pull failed");
            return TransferOutcome::failed(host, target, out.stderr.trim(), start.elapsed());
        }
        self.unpack_into(host, target.to_string(), &out.stdout, dest, start)
    }

    async fn pull_volumes(
        &self,
        host: &HostTarget,
        category: SyncCategory,
        volume: &str,
        dest: &Path,
    ) -> Vec<TransferOutcome> {
        let start = Instant::now();
        let filter = format!("name={}", volume);
        let listed = self
            .executor
            .run(
                host,
                ExecRequest::new([
                    "docker",
                    "volume",
                    "ls",
                    "--filter",
                    filter.as_str(),
                    "--format",
                    "{{.Name}}",
                ]),
            )
            .await;
        let listed = match listed {
            Ok(out) => out.stdout_str(),
            Err(e) => {
                warn!(host = %host, category = %category, error = %e, "Volume listing failed");
                return vec![TransferOutcome::failed(host, category.as_str(), e, start.elapsed())];
            }
        };

        let volumes = exploded_volumes(volume, &listed);
        if volumes.is_empty() {
            debug!(host = %host, volume = %volume, "No volumes to pull");
            return vec![TransferOutcome::ok(host, category.as_str(), 0, start.elapsed())];
        }

        let pulls = volumes.into_iter().map(|(name, service)| {
            let (target, dest) = match &service {
                Some(service) => (format!("{}/{}", category, service), dest.join(service)),
                None => (category.as_str().to_string(), dest.to_path_buf()),
            };
            async move { self.pull_volume(host, &name, target, &dest).await }
        });
        futures::future::join_all(pulls).await
    }

    async fn pull_volume(
        &self,
        host: &HostTarget,
        volume: &str,
        target: String,
        dest: &Path,
    ) -> TransferOutcome {
        let start = Instant::now();
        let from = format!("{}:/from:ro", volume);

        if host.is_local() {
            // Local volumes are copied straight into the destination.
            let dest = match local_dir(dest) {
                Ok(dest) => dest,
                Err(e) => return TransferOutcome::failed(host, target, e, start.elapsed()),
            };
            let to = format!("{}:/to", dest.display());
            let result = self
                .executor
                .run(
                    host,
                    ExecRequest::new([
                        "docker",
                        "run",
                        "--rm",
                        "-v",
                        from.as_str(),
                        "-v",
                        to.as_str(),
                        self.helper_image.as_str(),
                        "cp",
                        "-a",
                        "/from/.",
                        "/to/",
                    ]),
                )
                .await;
            return match result {
                Ok(_) => TransferOutcome::ok(host, target, 0, start.elapsed()),
                Err(e) => {
                    warn!(host = %host, volume = %volume, error = %e, "Volume copy failed");
                    TransferOutcome::failed(host, target, e, start.elapsed())
                }
            };
        }

        let result = self
            .executor
            .run(
                host,
                ExecRequest::new([
                    "docker",
                    "run",
                    "--rm",
                    "-v",
                    from.as_str(),
                    self.helper_image.as_str(),
                    "tar",
                    "-czf",
                    "-",
                    "-C",
                    "/from",
                    ".",
                ]),
            )
            .await;
        match result {
            Ok(out) => self.unpack_into(host, target, &out.stdout, dest, start),
            Err(e) => {
                warn!(host = %host, volume = %volume, error = %e, "Volume pull failed");
                TransferOutcome::failed(host, target, e, start.elapsed())
            }
        }
    }

    fn unpack_into(
        &self,
        host: &HostTarget,
        target: String,
        data: &[u8],
        dest: &Path,
        start: Instant,
    ) -> TransferOutcome {
        match unpack(data, dest) {
            Ok(stats) => {
                debug!(
                    host = %host,
                    target = %target,
                    files = stats.files,
                    skipped = stats.skipped,
                    "Extracted"
                );
                TransferOutcome::ok(host, target, data.len() as u64, start.elapsed())
            }
            Err(e) => {
                warn!(host = %host, target = %target, error = %e, "Extraction failed");
                TransferOutcome::failed(host, target, e, start.elapsed())
            }
        }
    }
}

/// Base volume and `<volume>_<service>` volumes among `docker volume ls` lines.
///
/// The name filter is a substring match, so other lines are ignored.
pub fn exploded_volumes(volume: &str, listing: &str) -> Vec<(String, Option<String>)> {
    let prefix = format!("{}_", volume);
    let mut volumes: Vec<(String, Option<String>)> = listing
        .lines()
        .map(str::trim)
        .filter_map(|name| {
            if name == volume {
                Some((name.to_string(), None))
            } else {
                name.strip_prefix(&prefix)
                    .filter(|service| !service.is_empty())
                    .map(|service| (name.to_string(), Some(service.to_string())))
            }
        })
        .collect();
    volumes.sort();
    volumes.dedup();
    volumes
}

fn local_dir(dest: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dest)?;
    std::path::absolute(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exploded_volumes() {
        let listing = "alice_shop_prod_data\nalice_shop_prod_data_postgres\nalice_shop_prod_database\n\
                       alice_shop_prod_data_redis\nbob_alice_shop_prod_data\n";
        assert_eq!(
            exploded_volumes("alice_shop_prod_data", listing),
            vec![
                ("alice_shop_prod_data".to_string(), None),
                (
                    "alice_shop_prod_data_postgres".to_string(),
                    Some("postgres".to_string())
                ),
                (
                    "alice_shop_prod_data_redis".to_string(),
                    Some("redis".to_string())
                ),
            ]
        );
        assert!(exploded_volumes("alice_shop_prod_data", "").is_empty());
    }
}
