// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for hostmesh-platform.

use thiserror::Error;

/// Platform errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlatformError {
    /// Platform string is not `docker` or `kubernetes`.
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    /// Render context is not valid for the platform.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A generated name exceeds the platform limit.
    #[error("Name {name} exceeds the {max} character limit")]
    NameTooLong {
        /// Offending name.
        name: String,
        /// Platform limit.
        max: usize,
    },

    /// The platform cannot provide a requested feature.
    #[error("{platform} does not support {feature}")]
    Unsupported {
        /// Platform name.
        platform: &'static str,
        /// Feature requested.
        feature: &'static str,
    },

    /// Platform CLI output could not be understood.
    #[error("Unexpected output from {command}: {reason}")]
    UnexpectedOutput {
        /// Command that produced the output.
        command: String,
        /// What was wrong.
        reason: String,
    },

    /// Naming failed.
    #[error("Naming error: {0}")]
    Naming(#[from] hostmesh_core::naming::NamingError),

    /// YAML serialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Command execution failed.
    #[error("Exec error: {0}")]
    Exec(#[from] hostmesh_core::ExecError),
}

/// Result type using PlatformError.
pub type Result<T> = std::result::Result<T, PlatformError>;
