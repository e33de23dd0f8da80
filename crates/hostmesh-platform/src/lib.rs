// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hostmesh Platform - Container Platform Abstraction
//!
//! One interface over Docker Compose and Kubernetes. The deployment
//! pipeline is the same for both:
//!
//! ```text
//! RenderContext -> validate -> inject secrets reference -> render -> apply
//! ```
//!
//! | | Docker | Kubernetes |
//! |---|---|---|
//! | Descriptor | `docker-compose.{name}.yml` | `{name}.k8s.yaml` (multi-doc) |
//! | Secrets | one `docker secret` per key, `*_FILE` env | one Secret per project/env, `envFrom` |
//! | Ingress | no (nginx from the mesh crate) | yes |
//! | Max name length | 128 | 63 |
//!
//! # Modules
//!
//! - [`traits`]: `Runtime`, `TemplateEngine`, `SecretHandler` and their types
//! - [`docker`]: Compose template, runtime and secrets
//! - [`kubernetes`]: Manifests, kubectl runtime and secrets
//! - [`manager`]: `Platform` selection and the deployment pipeline

#![deny(missing_docs)]

/// Docker Compose platform.
pub mod docker;

/// Error types.
pub mod error;

/// Kubernetes platform.
pub mod kubernetes;

/// Platform selection.
pub mod manager;

/// Platform traits.
pub mod traits;

pub use error::{PlatformError, Result};
pub use manager::{Platform, PlatformManager};
pub use traits::{
    BuildRequest, MountSpec, PlatformCapabilities, RenderContext, RenderedDescriptor, Runtime,
    SecretHandler, SecretScope, SecretsReference, ServiceStatus, TemplateEngine,
};
