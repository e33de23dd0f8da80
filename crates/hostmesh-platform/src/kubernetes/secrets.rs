// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kubernetes secrets: one namespaced Secret per scope holding every key.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use hostmesh_core::naming;
use hostmesh_core::{CommandExecutor, ExecRequest, HostTarget};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::manifests::{secret_manifest, secret_name, to_yaml_stream};
use crate::error::Result;
use crate::traits::{SecretHandler, SecretScope, SecretsReference};

#[derive(Debug, Deserialize)]
struct SecretObject {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

/// Secret handler backed by `kubectl`.
pub struct KubernetesSecrets {
    executor: Arc<dyn CommandExecutor>,
}

impl KubernetesSecrets {
    /// Create a handler.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Namespace of `scope`.
    pub fn namespace(scope: &SecretScope) -> String {
        naming::kubernetes_name(&format!(
            "{}_{}_{}",
            scope.owner, scope.project, scope.environment
        ))
    }

    async fn patch(&self, host: &HostTarget, scope: &SecretScope, data: Value) -> Result<()> {
        let ns = Self::namespace(scope);
        let name = secret_name(&scope.project, &scope.environment);
        let patch = serde_json::to_string(&json!({ "data": data }))?;
        self.executor
            .run(
                host,
                ExecRequest::new([
                    "kubectl",
                    "-n",
                    ns.as_str(),
                    "patch",
                    "secret",
                    name.as_str(),
                    "--type",
                    "merge",
                    "-p",
                    patch.as_str(),
                ]),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SecretHandler for KubernetesSecrets {
    fn secrets_reference(&self, scope: &SecretScope, keys: &[String]) -> SecretsReference {
        SecretsReference::KubernetesSecret {
            name: secret_name(&scope.project, &scope.environment),
            keys: keys.to_vec(),
        }
    }

    async fn create_secrets(
        &self,
        host: &HostTarget,
        scope: &SecretScope,
        values: &BTreeMap<String, String>,
    ) -> Result<()> {
        let ns = Self::namespace(scope);
        let namespace = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": ns },
        });
        let secret = secret_manifest(&ns, &secret_name(&scope.project, &scope.environment), values);
        let yaml = to_yaml_stream(&[namespace, secret])?;
        self.executor
            .run(
                host,
                ExecRequest::new(["kubectl", "apply", "-f", "-"]).with_stdin(yaml.into_bytes()),
            )
            .await?;
        info!(host = %host, namespace = %ns, count = values.len(), "Kubernetes secret applied");
        Ok(())
    }

    async fn update_secrets(
        &self,
        host: &HostTarget,
        scope: &SecretScope,
        values: &BTreeMap<String, String>,
    ) -> Result<()> {
        let data: Map<String, Value> = values
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(general_purpose::STANDARD.encode(v))))
            .collect();
        self.patch(host, scope, Value::Object(data)).await
    }

    async fn delete_secrets(
        &self,
        host: &HostTarget,
        scope: &SecretScope,
        keys: &[String],
    ) -> Result<()> {
        // A merge patch with null values drops the keys.
        let data: Map<String, Value> = keys.iter().map(|k| (k.clone(), Value::Null)).collect();
        self.patch(host, scope, Value::Object(data)).await
    }

    async fn list_secrets(&self, host: &HostTarget, scope: &SecretScope) -> Result<Vec<String>> {
        let ns = Self::namespace(scope);
        let name = secret_name(&scope.project, &scope.environment);
        let out = self
            .executor
            .exec(
                host,
                ExecRequest::new(["kubectl", "-n", ns.as_str(), "get", "secret", name.as_str(), "-o", "json"]),
            )
            .await?;
        if !out.success() {
            if out.stderr.contains("NotFound") {
                return Ok(Vec::new());
            }
            out.checked()?;
            return Ok(Vec::new());
        }
        let secret: SecretObject = serde_json::from_slice(&out.stdout)?;
        Ok(secret.data.into_keys().collect())
    }

    async fn cleanup_secrets(&self, host: &HostTarget, scope: &SecretScope) -> Result<()> {
        let ns = Self::namespace(scope);
        let name = secret_name(&scope.project, &scope.environment);
        self.executor
            .run(
                host,
                ExecRequest::new([
                    "kubectl",
                    "delete",
                    "secret",
                    name.as_str(),
                    "-n",
                    ns.as_str(),
                    "--ignore-not-found",
                ]),
            )
            .await?;
        info!(host = %host, namespace = %ns, secret = %name, "Kubernetes secret removed");
        Ok(())
    }
}
