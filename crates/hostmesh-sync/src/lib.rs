// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostmesh Sync - Multi-Host Synchronization
//!
//! Moves an environment's directories between the operator machine and its
//! hosts as streamed tar.gz archives over the
//! [`CommandExecutor`](hostmesh_core::CommandExecutor) seam.
//!
//! | Category | Direction | Remote storage |
//! |----------|-----------|----------------|
//! | `config`, `secrets`, `files` | push | host directory |
//! | `logs`, `backups` | pull | host directory (default) |
//! | `data`, `monitoring` | pull | volume (default) |
//!
//! Pulled data lands in `<category>/<host>/`, per-service volumes in
//! `<category>/<host>/<service>/`.
//!
//! # Modules
//!
//! - [`manifest`]: Local and remote location of each category
//! - [`fanout`]: Copy stateful secrets to consumers
//! - [`archive`]: Deterministic tar.gz packing and safe extraction
//! - [`engine`]: Parallel push and pull
//! - [`report`]: Per-host outcomes

#![deny(missing_docs)]

/// Archive packing and extraction.
pub mod archive;

/// Push and pull.
pub mod engine;

/// Error types.
pub mod error;

/// Secret fan-out.
pub mod fanout;

/// Category locations.
pub mod manifest;

/// Sync reports.
pub mod report;

pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use fanout::{ServiceRole, fan_out_secrets};
pub use manifest::{PullStorage, RemoteLocation, SyncManifest};
pub use report::{SyncOperation, SyncReport, TransferOutcome};
