// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker runtime.
//!
//! Drives `docker` and `docker compose` through the executor. Each service
//! is its own compose project named after its container name.

use async_trait::async_trait;
use hostmesh_core::naming;
use hostmesh_core::{CommandExecutor, ExecRequest, HostTarget, ResourceKey};
use std::sync::Arc;
use tracing::{debug, info};

use super::compose::CONTAINER_LABEL;
use crate::error::Result;
use crate::manager::Platform;
use crate::traits::{
    BuildRequest, PlatformCapabilities, RenderedDescriptor, Runtime, ServiceStatus,
};

/// Docker capabilities.
pub const DOCKER_CAPABILITIES: PlatformCapabilities = PlatformCapabilities {
    supports_secrets: true,
    supports_networking: true,
    supports_ingress: false,
    max_name_length: 128,
};

/// Runtime backed by Docker Compose.
pub struct DockerRuntime {
    executor: Arc<dyn CommandExecutor>,
}

impl DockerRuntime {
    /// Create a runtime.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    fn compose(key: &ResourceKey, args: &[&str]) -> ExecRequest {
        let project = naming::container_name(key);
        let mut argv = vec!["docker", "compose", "-p", project.as_str()];
        argv.extend_from_slice(args);
        ExecRequest::new(argv)
    }

    /// Create the shared network when it does not exist yet.
    pub async fn ensure_network(&self, host: &HostTarget) -> Result<()> {
        let network = naming::network_name();
        let inspect = self
            .executor
            .exec(host, ExecRequest::new(["docker", "network", "inspect", network]))
            .await?;
        if !inspect.success() {
            self.executor
                .run(host, ExecRequest::new(["docker", "network", "create", network]))
                .await?;
            info!(host = %host, network = %network, "Created shared network");
        }
        Ok(())
    }
}

/// Derive a status from `docker ps` state words (one per container).
pub fn status_from_states(states: &[&str]) -> ServiceStatus {
    if states.is_empty() {
        return ServiceStatus::NotFound;
    }
    let total = states.len() as u32;
    let running = states.iter().filter(|s| **s == "running").count() as u32;
    let failing: Vec<&str> = states
        .iter()
        .copied()
        .filter(|s| matches!(*s, "dead" | "restarting"))
        .collect();

    if running == total {
        ServiceStatus::Running
    } else if running > 0 {
        ServiceStatus::PartiallyRunning { running, total }
    } else if !failing.is_empty() {
        ServiceStatus::Error {
            message: format!("containers {}", failing.join(", ")),
        }
    } else {
        ServiceStatus::Stopped
    }
}

#[async_trait]
impl Runtime for DockerRuntime {
    fn platform(&self) -> Platform {
        Platform::Docker
    }

    fn capabilities(&self) -> PlatformCapabilities {
        DOCKER_CAPABILITIES
    }

    async fn build_image(&self, host: &HostTarget, request: &BuildRequest) -> Result<String> {
        let image = naming::image_name(&request.registry_account, &request.key, &request.version);
        let context = request.context_dir.trim_end_matches('/');
        let dockerfile = format!("{}/{}", context, naming::dockerfile_name(&request.key));

        info!(host = %host, image = %image, "Building image");
        self.executor
            .run(
                host,
                ExecRequest::new(["docker", "build", "-t", image.as_str(), "-f", dockerfile.as_str(), context]),
            )
            .await?;

        if request.push {
            self.executor
                .run(host, ExecRequest::new(["docker", "push", image.as_str()]))
                .await?;
            debug!(host = %host, image = %image, "Pushed image");
        }
        Ok(image)
    }

    async fn deploy_from_descriptor(
        &self,
        host: &HostTarget,
        key: &ResourceKey,
        descriptor: &RenderedDescriptor,
    ) -> Result<()> {
        self.ensure_network(host).await?;
        self.executor
            .run(
                host,
                Self::compose(key, &["-f", "-", "up", "-d", "--remove-orphans"])
                    .with_stdin(descriptor.contents.as_bytes().to_vec()),
            )
            .await?;
        info!(host = %host, container = %naming::container_name(key), "Deployed compose project");
        Ok(())
    }

    async fn service_status(&self, host: &HostTarget, key: &ResourceKey) -> Result<ServiceStatus> {
        let filter = format!("label={}={}", CONTAINER_LABEL, naming::container_name(key));
        let out = self
            .executor
            .run(
                host,
                ExecRequest::new([
                    "docker",
                    "ps",
                    "-a",
                    "--filter",
                    filter.as_str(),
                    "--format",
                    "{{.State}}",
                ]),
            )
            .await?;
        let stdout = out.stdout_str();
        let states: Vec<&str> = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        Ok(status_from_states(&states))
    }

    async fn service_logs(
        &self,
        host: &HostTarget,
        key: &ResourceKey,
        tail: usize,
    ) -> Result<String> {
        let tail = tail.to_string();
        let out = self
            .executor
            .run(host, Self::compose(key, &["logs", "--no-color", "--tail", tail.as_str()]))
            .await?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn stop(&self, host: &HostTarget, key: &ResourceKey) -> Result<()> {
        self.executor.run(host, Self::compose(key, &["stop"])).await?;
        info!(host = %host, container = %naming::container_name(key), "Stopped");
        Ok(())
    }

    async fn remove(&self, host: &HostTarget, key: &ResourceKey) -> Result<()> {
        self.executor
            .run(host, Self::compose(key, &["down", "--remove-orphans"]))
            .await?;
        info!(host = %host, container = %naming::container_name(key), "Removed");
        Ok(())
    }

    async fn restart(&self, host: &HostTarget, key: &ResourceKey) -> Result<()> {
        self.executor
            .run(host, Self::compose(key, &["restart"]))
            .await?;
        Ok(())
    }

    fn deploy_command(&self, key: &ResourceKey, descriptor_path: &str) -> ExecRequest {
        Self::compose(key, &["-f", descriptor_path, "up", "-d", "--remove-orphans"])
    }
}
