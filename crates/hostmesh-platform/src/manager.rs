// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform selection and the render/deploy pipeline.
//!
//! [`Platform`] is a closed set; [`PlatformManager::new`] is the only place
//! that maps a platform to its runtime, template engine and secret handler.

use hostmesh_core::naming;
use hostmesh_core::service::BackendTarget;
use hostmesh_core::{CommandExecutor, HostTarget, ServiceSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::docker::{ComposeTemplate, DockerRuntime, DockerSecrets};
use crate::error::{PlatformError, Result};
use crate::kubernetes::manifests::workload_name;
use crate::kubernetes::{KubernetesRuntime, KubernetesSecrets, ManifestTemplate};
use crate::traits::{
    PlatformCapabilities, RenderContext, RenderedDescriptor, Runtime, SecretHandler, SecretScope,
    TemplateEngine,
};

/// Supported container platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Docker with Compose.
    Docker,
    /// Kubernetes via kubectl.
    Kubernetes,
}

impl Platform {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Docker => "docker",
            Platform::Kubernetes => "kubernetes",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" | "compose" => Ok(Platform::Docker),
            "kubernetes" | "k8s" => Ok(Platform::Kubernetes),
            other => Err(PlatformError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Runtime, template engine and secret handler of one platform.
pub struct PlatformManager {
    platform: Platform,
    runtime: Box<dyn Runtime>,
    templates: Box<dyn TemplateEngine>,
    secrets: Box<dyn SecretHandler>,
}

impl PlatformManager {
    /// Build the components for `platform`.
    pub fn new(platform: Platform, executor: Arc<dyn CommandExecutor>) -> Self {
        let (runtime, templates, secrets): (
            Box<dyn Runtime>,
            Box<dyn TemplateEngine>,
            Box<dyn SecretHandler>,
        ) = match platform {
            Platform::Docker => (
                Box::new(DockerRuntime::new(executor.clone())),
                Box::new(ComposeTemplate),
                Box::new(DockerSecrets::new(executor)),
            ),
            Platform::Kubernetes => (
                Box::new(KubernetesRuntime::new(executor.clone())),
                Box::new(ManifestTemplate),
                Box::new(KubernetesSecrets::new(executor)),
            ),
        };
        debug!(platform = %platform, "Platform manager created");
        Self {
            platform,
            runtime,
            templates,
            secrets,
        }
    }

    /// Selected platform.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Static capabilities.
    pub fn capabilities(&self) -> PlatformCapabilities {
        self.runtime.capabilities()
    }

    /// Runtime.
    pub fn runtime(&self) -> &dyn Runtime {
        self.runtime.as_ref()
    }

    /// Secret handler.
    pub fn secrets(&self) -> &dyn SecretHandler {
        self.secrets.as_ref()
    }

    /// Check `ctx` against the platform's capabilities.
    pub fn validate(&self, ctx: &RenderContext) -> Result<()> {
        check_capabilities(self.platform, &self.capabilities(), ctx)
    }

    /// Validate, inject the secrets reference, and render.
    pub fn render(&self, ctx: &RenderContext) -> Result<RenderedDescriptor> {
        self.validate(ctx)?;
        let mut ctx = ctx.clone();
        ctx.secrets = if ctx.spec.secret_keys.is_empty() {
            None
        } else {
            Some(
                self.secrets
                    .secrets_reference(&SecretScope::of(&ctx.key), &ctx.spec.secret_keys),
            )
        };
        self.templates.render(&ctx)
    }

    /// Render and apply on `host`.
    pub async fn deploy(&self, host: &HostTarget, ctx: &RenderContext) -> Result<RenderedDescriptor> {
        let descriptor = self.render(ctx)?;
        self.runtime
            .deploy_from_descriptor(host, &ctx.key, &descriptor)
            .await?;
        info!(
            host = %host,
            platform = %self.platform,
            service = %ctx.key,
            "Service deployed"
        );
        Ok(descriptor)
    }
}

/// Whether `spec` relies on the shared network: a backend addressed by
/// container name, or a stateful service reached through the stream proxy.
fn needs_shared_network(spec: &ServiceSpec) -> bool {
    spec.stateful
        || spec
            .backends
            .iter()
            .any(|b| matches!(b.target, BackendTarget::Container { .. }))
}

fn check_capabilities(
    platform: Platform,
    caps: &PlatformCapabilities,
    ctx: &RenderContext,
) -> Result<()> {
    let name = match platform {
        Platform::Docker => naming::container_name(&ctx.key),
        Platform::Kubernetes => workload_name(&ctx.key),
    };
    if name.is_empty() {
        return Err(PlatformError::Validation(format!(
            "{} produces an empty name",
            ctx.key
        )));
    }
    if name.len() > caps.max_name_length {
        return Err(PlatformError::NameTooLong {
            name,
            max: caps.max_name_length,
        });
    }

    if ctx.replicas == 0 {
        return Err(PlatformError::Validation(
            "replicas must be at least 1".to_string(),
        ));
    }
    if !ctx.spec.secret_keys.is_empty() && !caps.supports_secrets {
        return Err(PlatformError::Unsupported {
            platform: platform.as_str(),
            feature: "secrets",
        });
    }
    if needs_shared_network(&ctx.spec) && !caps.supports_networking {
        return Err(PlatformError::Unsupported {
            platform: platform.as_str(),
            feature: "networking",
        });
    }
    if ctx.ingress && !caps.supports_ingress {
        return Err(PlatformError::Unsupported {
            platform: platform.as_str(),
            feature: "ingress",
        });
    }
    if ctx.spec.features.health_check_path.is_some() && ctx.spec.container_ports.is_empty() {
        return Err(PlatformError::Validation(
            "health check requires a container port".to_string(),
        ));
    }
    Ok(())
}
