// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for hostmesh-sync.
//!
//! Only local preparation fails a whole operation. Per-host transfer
//! failures are reported in [`SyncReport`](crate::SyncReport) instead.

use hostmesh_core::ExecError;
use hostmesh_core::naming::NamingError;
use std::path::PathBuf;
use thiserror::Error;

/// Sync errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Local filesystem operation failed.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Archive could not be built or read.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Archive entry escapes the destination directory.
    #[error("Unsafe archive path: {0}")]
    UnsafePath(String),

    /// Volume name could not be derived.
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// Host command failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
