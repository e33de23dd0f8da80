// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform trait definitions.
//!
//! A platform is three cooperating pieces: a [`Runtime`] that drives the
//! platform CLI, a [`TemplateEngine`] that renders the deployment
//! descriptor, and a [`SecretHandler`] that stores secrets where the
//! descriptor expects them.

use async_trait::async_trait;
use hostmesh_core::category::SyncCategory;
use hostmesh_core::{ExecRequest, HostTarget, ResourceKey, ServiceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::manager::Platform;

/// Observed state of a deployed service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Every replica is running.
    Running,
    /// Deployed but nothing is running.
    Stopped,
    /// Some replicas are running.
    PartiallyRunning {
        /// Running replicas.
        running: u32,
        /// Desired or known replicas.
        total: u32,
    },
    /// Nothing deployed under this key.
    NotFound,
    /// The platform reports a failure.
    Error {
        /// Platform message.
        message: String,
    },
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Running => f.write_str("running"),
            ServiceStatus::Stopped => f.write_str("stopped"),
            ServiceStatus::PartiallyRunning { running, total } => {
                write!(f, "partially running ({}/{})", running, total)
            }
            ServiceStatus::NotFound => f.write_str("not found"),
            ServiceStatus::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// Static description of what a platform can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    /// Native secret storage.
    pub supports_secrets: bool,
    /// Shared network between services.
    pub supports_networking: bool,
    /// Native ingress objects.
    pub supports_ingress: bool,
    /// Longest generated name the platform accepts.
    pub max_name_length: usize,
}

/// Secrets are scoped to one project environment of one owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretScope {
    /// Owning account.
    pub owner: String,
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
}

impl SecretScope {
    /// Scope of `key`.
    pub fn of(key: &ResourceKey) -> Self {
        Self {
            owner: key.owner.clone(),
            project: key.project.clone(),
            environment: key.environment.clone(),
        }
    }
}

/// How a rendered descriptor refers to secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretsReference {
    /// One external Docker secret per key, keyed by the env name.
    DockerSecrets {
        /// Secret key to Docker secret name.
        names: BTreeMap<String, String>,
    },
    /// One namespaced Kubernetes Secret holding every key.
    KubernetesSecret {
        /// Secret object name.
        name: String,
        /// Keys expected in the Secret.
        keys: Vec<String>,
    },
}

/// A storage mount for the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MountSpec {
    /// Platform volume named after the key and a pull category.
    Volume {
        /// Category backing the volume.
        category: SyncCategory,
        /// Path inside the container.
        target: String,
        /// Use a per-service volume instead of the shared one.
        per_service: bool,
    },
    /// Host directory.
    Bind {
        /// Path on the host.
        source: String,
        /// Path inside the container.
        target: String,
        /// Mount read-only.
        read_only: bool,
    },
}

/// Everything needed to render a deployment descriptor.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Service identity.
    pub key: ResourceKey,
    /// Service specification.
    pub spec: ServiceSpec,
    /// Image reference.
    pub image: String,
    /// Desired replicas.
    pub replicas: u32,
    /// Plain environment variables.
    pub env: BTreeMap<String, String>,
    /// Storage mounts.
    pub mounts: Vec<MountSpec>,
    /// Publish container ports on hashed host ports (multi-host).
    pub publish_ports: bool,
    /// Lower bound of published host ports.
    pub host_port_base: u16,
    /// Emit a native ingress object for the domains.
    pub ingress: bool,
    /// Secret values rendered into the descriptor where the platform
    /// keeps them alongside the deployment.
    pub secret_values: BTreeMap<String, String>,
    /// Injected by the manager before rendering.
    pub secrets: Option<SecretsReference>,
}

impl RenderContext {
    /// Context with one replica and no extras.
    pub fn new(key: ResourceKey, spec: ServiceSpec, image: impl Into<String>) -> Self {
        Self {
            key,
            spec,
            image: image.into(),
            replicas: 1,
            env: BTreeMap::new(),
            mounts: Vec::new(),
            publish_ports: false,
            host_port_base: 10000,
            ingress: false,
            secret_values: BTreeMap::new(),
            secrets: None,
        }
    }
}

/// A rendered deployment descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDescriptor {
    /// Platform the descriptor is for.
    pub platform: Platform,
    /// Suggested file name.
    pub file_name: String,
    /// YAML contents.
    pub contents: String,
}

/// Image build parameters.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Service identity.
    pub key: ResourceKey,
    /// Build context directory on the build host.
    pub context_dir: String,
    /// Image version tag.
    pub version: String,
    /// Registry account prefix.
    pub registry_account: String,
    /// Push after building.
    pub push: bool,
}

/// Trait for container runtimes.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Platform this runtime drives.
    fn platform(&self) -> Platform;

    /// Static capabilities.
    fn capabilities(&self) -> PlatformCapabilities;

    /// Build (and optionally push) the image, returning its reference.
    async fn build_image(&self, host: &HostTarget, request: &BuildRequest) -> Result<String>;

    /// Apply a rendered descriptor.
    async fn deploy_from_descriptor(
        &self,
        host: &HostTarget,
        key: &ResourceKey,
        descriptor: &RenderedDescriptor,
    ) -> Result<()>;

    /// Current status.
    async fn service_status(&self, host: &HostTarget, key: &ResourceKey) -> Result<ServiceStatus>;

    /// Last `tail` lines of logs.
    async fn service_logs(&self, host: &HostTarget, key: &ResourceKey, tail: usize)
    -> Result<String>;

    /// Stop without removing.
    async fn stop(&self, host: &HostTarget, key: &ResourceKey) -> Result<()>;

    /// Remove everything deployed for the key.
    async fn remove(&self, host: &HostTarget, key: &ResourceKey) -> Result<()>;

    /// Restart running workloads.
    async fn restart(&self, host: &HostTarget, key: &ResourceKey) -> Result<()>;

    /// Command that deploys a descriptor already stored at `descriptor_path`.
    fn deploy_command(&self, key: &ResourceKey, descriptor_path: &str) -> ExecRequest;
}

/// Trait for descriptor renderers.
pub trait TemplateEngine: Send + Sync {
    /// Render the deployment descriptor.
    fn render(&self, ctx: &RenderContext) -> Result<RenderedDescriptor>;
}

/// Trait for platform secret storage.
#[async_trait]
pub trait SecretHandler: Send + Sync {
    /// How descriptors should reference `keys` in `scope`.
    fn secrets_reference(&self, scope: &SecretScope, keys: &[String]) -> SecretsReference;

    /// Store new secrets.
    async fn create_secrets(
        &self,
        host: &HostTarget,
        scope: &SecretScope,
        values: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Replace the values of existing secrets.
    async fn update_secrets(
        &self,
        host: &HostTarget,
        scope: &SecretScope,
        values: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Delete secrets by key.
    async fn delete_secrets(&self, host: &HostTarget, scope: &SecretScope, keys: &[String])
    -> Result<()>;

    /// Keys currently stored in `scope`.
    async fn list_secrets(&self, host: &HostTarget, scope: &SecretScope) -> Result<Vec<String>>;

    /// Remove every secret of `scope`. Succeeds when nothing is stored.
    async fn cleanup_secrets(&self, host: &HostTarget, scope: &SecretScope) -> Result<()>;
}
