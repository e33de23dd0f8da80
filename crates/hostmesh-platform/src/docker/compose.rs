// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compose file rendering.
//!
//! One compose project per service, named after the container name. Every
//! service joins the shared external network so the proxy can reach it by
//! container name.

use hostmesh_core::naming;
use hostmesh_core::ports::host_port;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::manager::Platform;
use crate::traits::{MountSpec, RenderContext, RenderedDescriptor, SecretsReference, TemplateEngine};

/// Label carrying the container name on every compose service.
pub const CONTAINER_LABEL: &str = "io.hostmesh.container";

/// Compose file (`docker-compose.yml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeFile {
    /// Services by name.
    pub services: BTreeMap<String, ComposeService>,
    /// Networks by name.
    pub networks: BTreeMap<String, ComposeExternal>,
    /// Named volumes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, ComposeExternal>,
    /// External secrets.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, ComposeExternal>,
}

/// A compose service.
#[allow(missing_docs)] // Fields mirror the compose file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeService {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub restart: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expose: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    pub networks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<ComposeHealthcheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<ComposeDeploy>,
}

/// Container healthcheck.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeHealthcheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
    pub start_period: String,
}

/// Deploy section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeDeploy {
    /// Replica count.
    pub replicas: u32,
}

/// Reference to an object managed outside the compose project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeExternal {
    /// Always `true`.
    pub external: bool,
    /// Name outside the project.
    pub name: String,
}

impl ComposeExternal {
    fn named(name: impl Into<String>) -> Self {
        Self {
            external: true,
            name: name.into(),
        }
    }
}

/// Renders compose files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeTemplate;

impl ComposeTemplate {
    /// Build the compose document without serializing it.
    pub fn compose_file(&self, ctx: &RenderContext) -> Result<ComposeFile> {
        let key = &ctx.key;
        let cname = naming::container_name(key);
        let network = naming::network_name().to_string();

        let mut service = ComposeService {
            image: ctx.image.clone(),
            // Fixed names only work with a single replica.
            container_name: (ctx.replicas <= 1).then(|| cname.clone()),
            restart: "unless-stopped".to_string(),
            environment: ctx.env.clone(),
            networks: vec![network.clone()],
            ..Default::default()
        };

        for port in &ctx.spec.container_ports {
            if ctx.publish_ports {
                service.ports.push(format!(
                    "{}:{}",
                    host_port(key, *port, ctx.host_port_base),
                    port
                ));
            } else {
                service.expose.push(port.to_string());
            }
        }

        let mut file = ComposeFile::default();
        file.networks
            .insert(network.clone(), ComposeExternal::named(network));

        for mount in &ctx.mounts {
            match mount {
                MountSpec::Volume {
                    category,
                    target,
                    per_service,
                } => {
                    let service_name = per_service.then_some(key.service.as_str());
                    let volume = naming::volume_name(key, *category, service_name)?;
                    service.volumes.push(format!("{}:{}", volume, target));
                    file.volumes
                        .insert(volume.clone(), ComposeExternal::named(volume));
                }
                MountSpec::Bind {
                    source,
                    target,
                    read_only,
                } => {
                    let suffix = if *read_only { ":ro" } else { "" };
                    service.volumes.push(format!("{}:{}{}", source, target, suffix));
                }
            }
        }

        if let Some(SecretsReference::DockerSecrets { names }) = &ctx.secrets {
            for (secret_key, secret_name) in names {
                service.secrets.push(secret_name.clone());
                service.environment.insert(
                    format!("{}_FILE", secret_key.to_uppercase()),
                    format!("/run/secrets/{}", secret_name),
                );
                file.secrets
                    .insert(secret_name.clone(), ComposeExternal::named(secret_name.clone()));
            }
        }

        if let (Some(path), Some(port)) = (
            &ctx.spec.features.health_check_path,
            ctx.spec.container_ports.first(),
        ) {
            service.healthcheck = Some(ComposeHealthcheck {
                test: vec![
                    "CMD-SHELL".to_string(),
                    format!("wget -qO- http://localhost:{}{} || exit 1", port, path),
                ],
                interval: "30s".to_string(),
                timeout: "5s".to_string(),
                retries: 3,
                start_period: "10s".to_string(),
            });
        }

        if ctx.replicas > 1 {
            service.deploy = Some(ComposeDeploy {
                replicas: ctx.replicas,
            });
        }

        service.labels = BTreeMap::from([
            (CONTAINER_LABEL.to_string(), cname.clone()),
            ("io.hostmesh.owner".to_string(), key.owner.clone()),
            ("io.hostmesh.project".to_string(), key.project.clone()),
            ("io.hostmesh.environment".to_string(), key.environment.clone()),
            ("io.hostmesh.service".to_string(), key.service.clone()),
        ]);

        file.services.insert(naming::sanitize(&key.service), service);
        Ok(file)
    }
}

impl TemplateEngine for ComposeTemplate {
    fn render(&self, ctx: &RenderContext) -> Result<RenderedDescriptor> {
        let file = self.compose_file(ctx)?;
        Ok(RenderedDescriptor {
            platform: Platform::Docker,
            file_name: format!("docker-compose.{}.yml", naming::container_name(&ctx.key)),
            contents: serde_yaml::to_string(&file)?,
        })
    }
}
