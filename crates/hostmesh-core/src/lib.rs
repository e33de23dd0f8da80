// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostmesh Core - Resource Identity and Execution Primitives
//!
//! Leaf crate shared by the mesh, platform and sync crates. It owns the
//! identity of every deployed artifact and the seam through which all
//! host commands are issued.
//!
//! # Naming
//!
//! | Function | Result |
//! |----------|--------|
//! | `container_name` | `{owner}_{project}_{env}_{service}` |
//! | `container_name_pattern` | container name + `*` |
//! | `image_name` | `{account}/{container_name}:{version}` |
//! | `dockerfile_name` | `Dockerfile.{container_name}` |
//! | `proxy_config_name` | `{container_name}.conf` |
//! | `network_name` | `hostmesh_network` (shared) |
//! | `volume_name` | `{owner}_{project}_{env}_{category}[_{service}]` |
//!
//! # Port Classes
//!
//! | Class | Range |
//! |-------|-------|
//! | web | `[8000, 10000)` |
//! | database | `[5000, 6000)` |
//! | cache | `[6000, 7000)` |
//! | search | `[9000, 10000)` |
//! | proxy | `[7000, 8000)` |
//! | worker | none |
//! | internal / host | `[5000, 65535)` |
//!
//! Allocation is a stateless hash; collisions are possible and accepted.
//!
//! # Modules
//!
//! - [`category`]: The seven sync categories and their fixed direction
//! - [`config`]: Orchestrator configuration from environment variables
//! - [`exec`]: Command executors (SSH/local, mock)
//! - [`naming`]: Deterministic artifact names
//! - [`ports`]: Hash-based port allocation
//! - [`resource`]: The `ResourceKey` identity tuple
//! - [`service`]: Service specification consumed by mesh and platform

#![deny(missing_docs)]

/// Sync categories and directions.
pub mod category;

/// Orchestrator configuration.
pub mod config;

/// Command execution seam.
pub mod exec;

/// Deterministic artifact naming.
pub mod naming;

/// Hash-based port allocation.
pub mod ports;

/// Resource identity.
pub mod resource;

/// Service specification.
pub mod service;

pub use category::{Direction, SyncCategory};
pub use config::HostmeshConfig;
pub use exec::{CommandExecutor, ExecError, ExecOutput, ExecRequest, HostTarget};
pub use resource::ResourceKey;
pub use service::ServiceSpec;
