// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker platform: compose files, `docker compose` runtime, `docker secret`.

pub mod compose;
pub mod runtime;
pub mod secrets;

pub use compose::ComposeTemplate;
pub use runtime::{DOCKER_CAPABILITIES, DockerRuntime};
pub use secrets::DockerSecrets;
