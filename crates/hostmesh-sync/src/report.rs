// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Aggregated outcome of a push or pull.

use chrono::{DateTime, Utc};
use hostmesh_core::HostTarget;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    /// Operator machine to hosts.
    Push,
    /// Hosts to operator machine.
    Pull,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOperation::Push => f.write_str("push"),
            SyncOperation::Pull => f.write_str("pull"),
        }
    }
}

/// Result of one transfer to or from one host.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    /// Host address.
    #[serde(serialize_with = "serialize_host")]
    pub host: HostTarget,
    /// What was transferred: `push`, a category, or `<category>/<service>`.
    pub target: String,
    /// Whether the transfer completed.
    pub success: bool,
    /// Failure message.
    pub error: Option<String>,
    /// Bytes sent or received.
    pub bytes: u64,
    /// Wall time of the transfer.
    pub elapsed: Duration,
}

fn serialize_host<S: serde::Serializer>(host: &HostTarget, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(host.address())
}

impl TransferOutcome {
    pub(crate) fn ok(host: &HostTarget, target: impl Into<String>, bytes: u64, elapsed: Duration) -> Self {
        Self {
            host: host.clone(),
            target: target.into(),
            success: true,
            error: None,
            bytes,
            elapsed,
        }
    }

    pub(crate) fn failed(
        host: &HostTarget,
        target: impl Into<String>,
        error: impl fmt::Display,
        elapsed: Duration,
    ) -> Self {
        Self {
            host: host.clone(),
            target: target.into(),
            success: false,
            error: Some(error.to_string()),
            bytes: 0,
            elapsed,
        }
    }
}

/// Per-host outcomes of one operation.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Push or pull.
    pub operation: SyncOperation,
    /// When the operation started.
    pub started_at: DateTime<Utc>,
    /// Total wall time.
    pub elapsed: Duration,
    /// One entry per transfer, sorted by host then target.
    pub outcomes: Vec<TransferOutcome>,
}

impl SyncReport {
    pub(crate) fn new(
        operation: SyncOperation,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        mut outcomes: Vec<TransferOutcome>,
    ) -> Self {
        outcomes.sort_by(|a, b| a.host.cmp(&b.host).then_with(|| a.target.cmp(&b.target)));
        Self {
            operation,
            started_at,
            elapsed,
            outcomes,
        }
    }

    /// Whether every transfer succeeded.
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    /// Failed transfers.
    pub fn failures(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    /// Outcomes for one host.
    pub fn for_host<'a>(&'a self, host: &'a HostTarget) -> impl Iterator<Item = &'a TransferOutcome> {
        self.outcomes.iter().filter(move |o| &o.host == host)
    }

    /// Total bytes moved.
    pub fn total_bytes(&self) -> u64 {
        self.outcomes.iter().map(|o| o.bytes).sum()
    }
}
