// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kubernetes platform: manifests, `kubectl` runtime, namespaced Secrets.

pub mod manifests;
pub mod runtime;
pub mod secrets;

pub use manifests::ManifestTemplate;
pub use runtime::{KUBERNETES_CAPABILITIES, KubernetesRuntime};
pub use secrets::KubernetesSecrets;
