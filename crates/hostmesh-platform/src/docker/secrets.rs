// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker secrets, one per key.
//!
//! Docker secrets are immutable, so an update removes the secret and
//! creates it again with the new value.

use async_trait::async_trait;
use hostmesh_core::naming;
use hostmesh_core::{CommandExecutor, ExecRequest, HostTarget};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::traits::{SecretHandler, SecretScope, SecretsReference};

/// Secret handler backed by `docker secret`.
pub struct DockerSecrets {
    executor: Arc<dyn CommandExecutor>,
}

impl DockerSecrets {
    /// Create a handler.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Name prefix shared by every secret in `scope`.
    pub fn prefix(scope: &SecretScope) -> String {
        format!(
            "{}_{}_{}_",
            naming::sanitize(&scope.owner),
            naming::sanitize(&scope.project),
            naming::sanitize(&scope.environment)
        )
    }

    /// Docker secret name for `key` in `scope`.
    pub fn secret_name(scope: &SecretScope, key: &str) -> String {
        format!("{}{}", Self::prefix(scope), naming::sanitize(key))
    }

    async fn create_one(&self, host: &HostTarget, name: &str, value: &str) -> Result<()> {
        self.executor
            .run(
                host,
                ExecRequest::new(["docker", "secret", "create", name, "-"])
                    .with_stdin(value.as_bytes().to_vec()),
            )
            .await?;
        debug!(host = %host, secret = %name, "Created docker secret");
        Ok(())
    }

    async fn remove_one(&self, host: &HostTarget, name: &str) -> Result<()> {
        let out = self
            .executor
            .exec(host, ExecRequest::new(["docker", "secret", "rm", name]))
            .await?;
        if !out.success() && !out.stderr.contains("not found") {
            out.checked()?;
        }
        Ok(())
    }
}

#[async_trait]
impl SecretHandler for DockerSecrets {
    fn secrets_reference(&self, scope: &SecretScope, keys: &[String]) -> SecretsReference {
        SecretsReference::DockerSecrets {
            names: keys
                .iter()
                .map(|k| (k.clone(), Self::secret_name(scope, k)))
                .collect(),
        }
    }

    async fn create_secrets(
        &self,
        host: &HostTarget,
        scope: &SecretScope,
        values: &BTreeMap<String, String>,
    ) -> Result<()> {
        for (key, value) in values {
            self.create_one(host, &Self::secret_name(scope, key), value)
                .await?;
        }
        info!(host = %host, count = values.len(), "Docker secrets created");
        Ok(())
    }

    async fn update_secrets(
        &self,
        host: &HostTarget,
        scope: &SecretScope,
        values: &BTreeMap<String, String>,
    ) -> Result<()> {
        for (key, value) in values {
            let name = Self::secret_name(scope, key);
            self.remove_one(host, &name).await?;
            self.create_one(host, &name, value).await?;
        }
        info!(host = %host, count = values.len(), "Docker secrets updated");
        Ok(())
    }

    async fn delete_secrets(
        &self,
        host: &HostTarget,
        scope: &SecretScope,
        keys: &[String],
    ) -> Result<()> {
        for key in keys {
            self.remove_one(host, &Self::secret_name(scope, key)).await?;
        }
        Ok(())
    }

    async fn list_secrets(&self, host: &HostTarget, scope: &SecretScope) -> Result<Vec<String>> {
        let prefix = Self::prefix(scope);
        let out = self
            .executor
            .run(
                host,
                ExecRequest::new([
                    "docker".to_string(),
                    "secret".to_string(),
                    "ls".to_string(),
                    "--filter".to_string(),
                    format!("name={}", prefix),
                    "--format".to_string(),
                    "{{.Name}}".to_string(),
                ]),
            )
            .await?;
        // The name filter is a substring match; keep exact prefix hits only.
        Ok(out
            .stdout_str()
            .lines()
            .filter_map(|line| line.trim().strip_prefix(&prefix))
            .map(str::to_string)
            .collect())
    }

    async fn cleanup_secrets(&self, host: &HostTarget, scope: &SecretScope) -> Result<()> {
        let prefix = Self::prefix(scope);
        let suffixes = self.list_secrets(host, scope).await?;
        for suffix in &suffixes {
            self.remove_one(host, &format!("{}{}", prefix, suffix)).await?;
        }
        info!(host = %host, count = suffixes.len(), "Docker secrets removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostmesh_core::exec::MockExecutor;
    use hostmesh_core::ExecOutput;

    fn scope() -> SecretScope {
        SecretScope {
            owner: "alice".to_string(),
            project: "shop".to_string(),
            environment: "prod".to_string(),
        }
    }

    #[test]
    fn test_secret_names() {
        assert_eq!(
            DockerSecrets::secret_name(&scope(), "DB_PASSWORD"),
            "alice_shop_prod_db_password"
        );
    }

    #[tokio::test]
    async fn test_update_removes_then_creates() {
        let mock = Arc::new(MockExecutor::new());
        let handler = DockerSecrets::new(mock.clone());
        let values = BTreeMap::from([("DB_PASSWORD".to_string(), "s3cret".to_string())]);
        handler
            .update_secrets(&HostTarget::Local, &scope(), &values)
            .await
            .unwrap();

        assert_eq!(
            mock.commands(),
            vec![
                "docker secret rm alice_shop_prod_db_password",
                "docker secret create alice_shop_prod_db_password -",
            ]
        );
        assert_eq!(mock.calls()[1].stdin.as_deref(), Some(&b"s3cret"[..]));
    }

    #[tokio::test]
    async fn test_update_tolerates_missing_secret() {
        let mock = Arc::new(MockExecutor::new());
        mock.respond_to(
            &["docker", "secret", "rm"],
            ExecOutput::failed(1, "Error: No such secret: x not found"),
        );
        let handler = DockerSecrets::new(mock.clone());
        let values = BTreeMap::from([("API_KEY".to_string(), "k".to_string())]);
        handler
            .update_secrets(&HostTarget::Local, &scope(), &values)
            .await
            .unwrap();
        assert_eq!(mock.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_list_strips_prefix() {
        let mock = Arc::new(MockExecutor::new());
        mock.respond_to(
            &["docker", "secret", "ls"],
            ExecOutput::ok("alice_shop_prod_db_password\nalice_shop_prod_api_key\nxalice_shop_prod_other\n"),
        );
        let handler = DockerSecrets::new(mock.clone());
        let keys = handler.list_secrets(&HostTarget::Local, &scope()).await.unwrap();
        assert_eq!(keys, vec!["db_password", "api_key"]);
    }
}
