// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Applies generated proxy configuration to hosts.
//!
//! Every change follows the same sequence: write files, `nginx -t` inside
//! the proxy container, then `nginx -s reload`. A failed test puts back
//! what was there before, so the next reload does not pick up a broken file.

use std::sync::Arc;

use hostmesh_core::{
    CommandExecutor, ExecRequest, HostTarget, HostmeshConfig, ResourceKey, ServiceSpec,
};
use tracing::{debug, error, info, warn};

use crate::certs::{CertificateConfig, CertificateIssuer, IssuedCertificate};
use crate::dns::{DnsProvider, DnsRecord, RecordChange};
use crate::error::{MeshError, Result};
use crate::http::{TlsPaths, render_http};
use crate::layout::{
    ProxyLayout, RateLimitZone, fetch_ip_ranges, render_main_config, replace_managed_block,
};
use crate::rendered::{ProxyKind, RenderedProxyConfig};
use crate::stream::{StreamOptions, render_stream};

/// Outcome of configuring one service.
#[derive(Debug, Clone)]
pub struct AppliedService {
    /// Paths written on the host.
    pub written: Vec<String>,
    /// Certificate used, when TLS is enabled.
    pub certificate: Option<IssuedCertificate>,
}

/// Writes, validates and reloads proxy configuration.
pub struct MeshConfigurator {
    executor: Arc<dyn CommandExecutor>,
    layout: ProxyLayout,
    proxy_container: String,
    stream_options: StreamOptions,
    issuer: CertificateIssuer,
}

impl MeshConfigurator {
    /// Configurator from the orchestrator config.
    pub fn new(executor: Arc<dyn CommandExecutor>, config: &HostmeshConfig) -> Self {
        Self {
            issuer: CertificateIssuer::new(
                executor.clone(),
                CertificateConfig::from_config(config),
            ),
            executor,
            layout: ProxyLayout::new(config.proxy_root.clone()),
            proxy_container: config.proxy_container.clone(),
            stream_options: StreamOptions::default(),
        }
    }

    /// Override stream proxy timeouts.
    pub fn with_stream_options(mut self, options: StreamOptions) -> Self {
        self.stream_options = options;
        self
    }

    /// Proxy file layout.
    pub fn layout(&self) -> &ProxyLayout {
        &self.layout
    }

    /// Certificate issuer.
    pub fn issuer(&self) -> &CertificateIssuer {
        &self.issuer
    }

    /// Render every config `spec` needs.
    ///
    /// Services with domains get an HTTP virtual host; stateful services
    /// get a stream proxy.
    pub fn render(
        &self,
        key: &ResourceKey,
        spec: &ServiceSpec,
        tls: Option<&TlsPaths>,
    ) -> Result<Vec<RenderedProxyConfig>> {
        let mut rendered = Vec::new();
        if !spec.domains.is_empty() {
            rendered.push(render_http(key, spec, tls)?);
        }
        if spec.stateful {
            rendered.push(render_stream(key, &spec.backends, &self.stream_options)?);
        }
        if rendered.is_empty() {
            return Err(MeshError::InvalidSpec(format!(
                "{} has neither domains nor a stream endpoint",
                key
            )));
        }
        Ok(rendered)
    }

    /// Issue certificates when needed, then write and activate configs.
    pub async fn apply(
        &self,
        host: &HostTarget,
        key: &ResourceKey,
        spec: &ServiceSpec,
    ) -> Result<AppliedService> {
        let certificate = if spec.tls.enabled && !spec.domains.is_empty() {
            Some(
                self.issuer
                    .issue(host, &spec.domains, &spec.tls, false)
                    .await?,
            )
        } else {
            None
        };

        let rendered = self.render(key, spec, certificate.as_ref().map(|c| &c.paths))?;
        let written = self.write_configs(host, &rendered).await?;
        Ok(AppliedService {
            written,
            certificate,
        })
    }

    /// Write rendered configs, test and reload.
    ///
    /// When the test fails, files that existed before are restored and
    /// files this call created are removed.
    pub async fn write_configs(
        &self,
        host: &HostTarget,
        configs: &[RenderedProxyConfig],
    ) -> Result<Vec<String>> {
        let mut written = Vec::with_capacity(configs.len());
        let mut previous = Vec::with_capacity(configs.len());
        for config in configs {
            let path = format!("{}/{}", self.layout.dir_for(config.kind), config.file_name);
            previous.push(self.read_existing(host, &path).await?);
            debug!(host = %host, path = %path, "Writing proxy config");
            self.executor
                .write_file(host, &path, config.contents.clone().into_bytes())
                .await?;
            written.push(path);
        }

        if let Err(e) = self.test_config(host).await {
            warn!(host = %host, files = ?written, "Rolling back proxy configs");
            for (path, old) in written.iter().zip(previous) {
                let restored = match old {
                    Some(contents) => self.executor.write_file(host, path, contents).await,
                    None => self.executor.remove_file(host, path).await,
                };
                if let Err(rb) = restored {
                    error!(host = %host, path = %path, error = %rb, "Rollback failed");
                }
            }
            return Err(e);
        }
        self.reload(host).await?;
        info!(host = %host, files = written.len(), "Proxy configuration applied");
        Ok(written)
    }

    /// Current contents of `path`, `None` when it does not exist.
    async fn read_existing(&self, host: &HostTarget, path: &str) -> Result<Option<Vec<u8>>> {
        let out = self
            .executor
            .exec(host, ExecRequest::new(["cat", path]))
            .await?;
        Ok(out.success().then_some(out.stdout))
    }

    /// Remove every config of `key` and reload.
    pub async fn remove_service(&self, host: &HostTarget, key: &ResourceKey) -> Result<()> {
        for kind in [ProxyKind::Http, ProxyKind::Stream] {
            self.executor
                .remove_file(host, &self.layout.config_path(kind, key))
                .await?;
        }
        self.test_config(host).await?;
        self.reload(host).await?;
        info!(host = %host, service = %key, "Proxy configuration removed");
        Ok(())
    }

    /// Write a fresh main config.
    pub async fn write_main_config(
        &self,
        host: &HostTarget,
        real_ip_ranges: &[String],
        zones: &[RateLimitZone],
    ) -> Result<()> {
        let contents = render_main_config(&self.layout, real_ip_ranges, zones);
        self.executor
            .write_file(host, &self.layout.main_config(), contents.into_bytes())
            .await?;
        self.test_config(host).await?;
        self.reload(host).await
    }

    /// Replace the managed real-IP block with freshly fetched ranges.
    ///
    /// The file is only rewritten when the block actually changes.
    pub async fn refresh_real_ip(
        &self,
        host: &HostTarget,
        client: &reqwest::Client,
        ranges_url: &str,
    ) -> Result<bool> {
        let ranges = fetch_ip_ranges(client, ranges_url).await?;
        let path = self.layout.main_config();
        let current = self
            .executor
            .run(host, ExecRequest::new(["cat", path.as_str()]))
            .await?;
        let current = String::from_utf8_lossy(&current.stdout).into_owned();
        let updated = replace_managed_block(&current, &ranges)?;
        if updated == current {
            debug!(host = %host, "Real-IP block already current");
            return Ok(false);
        }

        self.executor
            .write_file(host, &path, updated.into_bytes())
            .await?;
        if let Err(e) = self.test_config(host).await {
            warn!(host = %host, "Restoring previous main config");
            self.executor
                .write_file(host, &path, current.into_bytes())
                .await?;
            return Err(e);
        }
        self.reload(host).await?;
        info!(host = %host, ranges = ranges.len(), "Real-IP ranges refreshed");
        Ok(true)
    }

    /// Point every domain of `spec` at `ip`.
    pub async fn publish_dns(
        &self,
        provider: &dyn DnsProvider,
        spec: &ServiceSpec,
        ip: &str,
        proxied: bool,
    ) -> Result<Vec<RecordChange>> {
        let mut changes = Vec::with_capacity(spec.domains.len());
        for domain in &spec.domains {
            changes.push(
                provider
                    .upsert_record(&DnsRecord::a(domain.clone(), ip, proxied))
                    .await?,
            );
        }
        Ok(changes)
    }

    /// `nginx -t` inside the proxy container.
    pub async fn test_config(&self, host: &HostTarget) -> Result<()> {
        let out = self
            .executor
            .exec(
                host,
                ExecRequest::new(["docker", "exec", self.proxy_container.as_str(), "nginx", "-t"]),
            )
            .await?;
        if out.success() {
            Ok(())
        } else {
            Err(MeshError::ConfigTest(out.stderr.trim().to_string()))
        }
    }

    /// `nginx -s reload` inside the proxy container.
    pub async fn reload(&self, host: &HostTarget) -> Result<()> {
        self.executor
            .run(
                host,
                ExecRequest::new([
                    "docker",
                    "exec",
                    self.proxy_container.as_str(),
                    "nginx",
                    "-s",
                    "reload",
                ]),
            )
            .await?;
        Ok(())
    }
}
