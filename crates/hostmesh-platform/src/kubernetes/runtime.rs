// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kubernetes runtime.
//!
//! Drives `kubectl` on a host that has cluster credentials. Images are
//! built with `docker` on the same host and always pushed, since the
//! cluster pulls from the registry.

use async_trait::async_trait;
use hostmesh_core::naming;
use hostmesh_core::{CommandExecutor, ExecRequest, HostTarget, ResourceKey};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::manifests::{namespace, workload_name};
use crate::error::{PlatformError, Result};
use crate::manager::Platform;
use crate::traits::{
    BuildRequest, PlatformCapabilities, RenderedDescriptor, Runtime, ServiceStatus,
};

/// Kubernetes capabilities.
pub const KUBERNETES_CAPABILITIES: PlatformCapabilities = PlatformCapabilities {
    supports_secrets: true,
    supports_networking: true,
    supports_ingress: true,
    max_name_length: 63,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentStatus {
    #[serde(default)]
    ready_replicas: u32,
    #[serde(default)]
    conditions: Vec<DeploymentCondition>,
}

#[derive(Debug, Deserialize)]
struct DeploymentCondition {
    #[serde(rename = "type")]
    condition_type: String,
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentSpec {
    #[serde(default)]
    replicas: u32,
}

#[derive(Debug, Deserialize)]
struct Deployment {
    #[serde(default)]
    spec: DeploymentSpec,
    #[serde(default)]
    status: DeploymentStatus,
}

/// Derive a status from `kubectl get deployment -o json` output.
pub fn status_from_deployment_json(json: &str) -> Result<ServiceStatus> {
    let deployment: Deployment =
        serde_json::from_str(json).map_err(|e| PlatformError::UnexpectedOutput {
            command: "kubectl get deployment".to_string(),
            reason: e.to_string(),
        })?;
    let desired = deployment.spec.replicas;
    let ready = deployment.status.ready_replicas;

    if let Some(failed) = deployment
        .status
        .conditions
        .iter()
        .find(|c| c.condition_type == "ReplicaFailure" && c.status == "True")
    {
        return Ok(ServiceStatus::Error {
            message: failed.message.clone(),
        });
    }

    Ok(match (desired, ready) {
        (0, _) => ServiceStatus::Stopped,
        (d, r) if r >= d => ServiceStatus::Running,
        (_, 0) => ServiceStatus::Stopped,
        (d, r) => ServiceStatus::PartiallyRunning {
            running: r,
            total: d,
        },
    })
}

/// Runtime backed by `kubectl`.
pub struct KubernetesRuntime {
    executor: Arc<dyn CommandExecutor>,
}

impl KubernetesRuntime {
    /// Create a runtime.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    fn kubectl(key: &ResourceKey, args: &[&str]) -> ExecRequest {
        let ns = namespace(key);
        let mut argv = vec!["kubectl", "-n", ns.as_str()];
        argv.extend_from_slice(args);
        ExecRequest::new(argv)
    }
}

#[async_trait]
impl Runtime for KubernetesRuntime {
    fn platform(&self) -> Platform {
        Platform::Kubernetes
    }

    fn capabilities(&self) -> PlatformCapabilities {
        KUBERNETES_CAPABILITIES
    }

    async fn build_image(&self, host: &HostTarget, request: &BuildRequest) -> Result<String> {
        let image = naming::image_name(&request.registry_account, &request.key, &request.version);
        let context = request.context_dir.trim_end_matches('/');
        let dockerfile = format!("{}/{}", context, naming::dockerfile_name(&request.key));

        info!(host = %host, image = %image, "Building image for cluster");
        self.executor
            .run(
                host,
                ExecRequest::new(["docker", "build", "-t", image.as_str(), "-f", dockerfile.as_str(), context]),
            )
            .await?;
        self.executor
            .run(host, ExecRequest::new(["docker", "push", image.as_str()]))
            .await?;
        Ok(image)
    }

    async fn deploy_from_descriptor(
        &self,
        host: &HostTarget,
        key: &ResourceKey,
        descriptor: &RenderedDescriptor,
    ) -> Result<()> {
        self.executor
            .run(
                host,
                ExecRequest::new(["kubectl", "apply", "-f", "-"])
                    .with_stdin(descriptor.contents.as_bytes().to_vec()),
            )
            .await?;
        info!(host = %host, deployment = %workload_name(key), namespace = %namespace(key), "Applied manifests");
        Ok(())
    }

    async fn service_status(&self, host: &HostTarget, key: &ResourceKey) -> Result<ServiceStatus> {
        let name = workload_name(key);
        let out = self
            .executor
            .exec(
                host,
                Self::kubectl(key, &["get", "deployment", name.as_str(), "-o", "json"]),
            )
            .await?;
        if !out.success() {
            if out.stderr.contains("NotFound") || out.stderr.contains("not found") {
                return Ok(ServiceStatus::NotFound);
            }
            out.checked()?;
            return Ok(ServiceStatus::NotFound);
        }
        debug!(host = %host, deployment = %name, "Parsing deployment status");
        status_from_deployment_json(&String::from_utf8_lossy(&out.stdout))
    }

    async fn service_logs(
        &self,
        host: &HostTarget,
        key: &ResourceKey,
        tail: usize,
    ) -> Result<String> {
        let target = format!("deployment/{}", workload_name(key));
        let tail = format!("--tail={}", tail);
        let out = self
            .executor
            .run(
                host,
                Self::kubectl(key, &["logs", target.as_str(), "--all-containers", tail.as_str()]),
            )
            .await?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn stop(&self, host: &HostTarget, key: &ResourceKey) -> Result<()> {
        let name = workload_name(key);
        self.executor
            .run(
                host,
                Self::kubectl(key, &["scale", "deployment", name.as_str(), "--replicas=0"]),
            )
            .await?;
        info!(host = %host, deployment = %name, "Scaled to zero");
        Ok(())
    }

    async fn remove(&self, host: &HostTarget, key: &ResourceKey) -> Result<()> {
        let selector = format!("app.kubernetes.io/name={}", workload_name(key));
        self.executor
            .run(
                host,
                Self::kubectl(
                    key,
                    &[
                        "delete",
                        "deployment,service,ingress",
                        "-l",
                        selector.as_str(),
                        "--ignore-not-found",
                    ],
                ),
            )
            .await?;
        info!(host = %host, deployment = %workload_name(key), "Removed workload");
        Ok(())
    }

    async fn restart(&self, host: &HostTarget, key: &ResourceKey) -> Result<()> {
        let target = format!("deployment/{}", workload_name(key));
        self.executor
            .run(host, Self::kubectl(key, &["rollout", "restart", target.as_str()]))
            .await?;
        Ok(())
    }

    fn deploy_command(&self, _key: &ResourceKey, descriptor_path: &str) -> ExecRequest {
        ExecRequest::new(["kubectl", "apply", "-f", descriptor_path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        let running = r#"{"spec":{"replicas":2},"status":{"replicas":2,"readyReplicas":2}}"#;
        assert_eq!(status_from_deployment_json(running).unwrap(), ServiceStatus::Running);

        let partial = r#"{"spec":{"replicas":3},"status":{"replicas":3,"readyReplicas":1}}"#;
        assert_eq!(
            status_from_deployment_json(partial).unwrap(),
            ServiceStatus::PartiallyRunning { running: 1, total: 3 }
        );

        let scaled_down = r#"{"spec":{"replicas":0},"status":{}}"#;
        assert_eq!(status_from_deployment_json(scaled_down).unwrap(), ServiceStatus::Stopped);

        let failing = r#"{"spec":{"replicas":1},"status":{"conditions":[
            {"type":"ReplicaFailure","status":"True","message":"quota exceeded"}]}}"#;
        assert_eq!(
            status_from_deployment_json(failing).unwrap(),
            ServiceStatus::Error {
                message: "quota exceeded".to_string()
            }
        );

        assert!(matches!(
            status_from_deployment_json("not json"),
            Err(PlatformError::UnexpectedOutput { .. })
        ));
    }
}
