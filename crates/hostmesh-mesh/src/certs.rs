// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! TLS certificate issuance.
//!
//! The mode is chosen from the credentials on the [`TlsIntent`]:
//!
//! | email | token | intent | mode |
//! |-------|-------|--------|------|
//! | - | - | auto | self-signed |
//! | yes | - | auto | HTTP-01 |
//! | yes | yes | auto | DNS-01 |
//! | - | * | http01 / dns01 | error |
//! | yes | - | dns01 | error |
//!
//! Selection happens before anything touches a host, so a missing
//! credential never leaves the proxy stopped or a credentials file behind.
//!
//! Certificates live under `cert_root` on the proxy host:
//!
//! ```text
//! {cert_root}/ssl/{domain}/fullchain.pem        self-signed
//! {cert_root}/letsencrypt/live/{domain}/...     Let's Encrypt
//! {cert_root}/letsencrypt_var, letsencrypt_log  certbot state
//! ```
//!
//! The proxy container mounts `cert_root` at the same path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hostmesh_core::service::{TlsIntent, VerificationIntent};
use hostmesh_core::{CommandExecutor, ExecRequest, HostTarget, HostmeshConfig};
use tracing::{debug, error, info, warn};

use crate::error::{MeshError, Result};
use crate::http::TlsPaths;

/// How a certificate is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateMode {
    /// Generated locally, not trusted by browsers.
    SelfSigned,
    /// Let's Encrypt with the standalone HTTP-01 challenge.
    Http01 {
        /// ACME account email.
        email: String,
    },
    /// Let's Encrypt with the Cloudflare DNS-01 challenge.
    Dns01 {
        /// ACME account email.
        email: String,
        /// Cloudflare API token.
        token: String,
    },
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl CertificateMode {
    /// Pick the mode for `intent`, failing on missing credentials.
    pub fn select(intent: &TlsIntent) -> Result<Self> {
        let email = present(&intent.email);
        let token = present(&intent.cloudflare_token);

        match (intent.verification, email, token) {
            (VerificationIntent::Auto, None, _) => Ok(CertificateMode::SelfSigned),
            (VerificationIntent::Auto, Some(email), None) => Ok(CertificateMode::Http01 { email }),
            (VerificationIntent::Auto, Some(email), Some(token)) => {
                Ok(CertificateMode::Dns01 { email, token })
            }
            (VerificationIntent::Http01, Some(email), _) => Ok(CertificateMode::Http01 { email }),
            (VerificationIntent::Dns01, Some(email), Some(token)) => {
                Ok(CertificateMode::Dns01 { email, token })
            }
            (VerificationIntent::Dns01, Some(_), None) => Err(MeshError::MissingDnsToken),
            (VerificationIntent::Http01 | VerificationIntent::Dns01, None, _) => {
                Err(MeshError::MissingEmail)
            }
        }
    }

    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateMode::SelfSigned => "self-signed",
            CertificateMode::Http01 { .. } => "http-01",
            CertificateMode::Dns01 { .. } => "dns-01",
        }
    }

    /// Whether the certificate comes from Let's Encrypt.
    pub fn is_acme(&self) -> bool {
        !matches!(self, CertificateMode::SelfSigned)
    }
}

/// Certificate issuer settings.
#[derive(Debug, Clone)]
pub struct CertificateConfig {
    /// Root of the certificate tree on the proxy host.
    pub cert_root: String,
    /// Proxy container stopped during HTTP-01.
    pub proxy_container: String,
    /// certbot image for HTTP-01.
    pub certbot_image: String,
    /// certbot image with the Cloudflare plugin.
    pub dns_plugin_image: String,
    /// Seconds certbot waits for DNS propagation.
    pub propagation_seconds: u32,
}

impl CertificateConfig {
    /// Settings derived from the orchestrator config.
    pub fn from_config(config: &HostmeshConfig) -> Self {
        Self {
            cert_root: config.cert_root.trim_end_matches('/').to_string(),
            proxy_container: config.proxy_container.clone(),
            certbot_image: "certbot/certbot:latest".to_string(),
            dns_plugin_image: "certbot/dns-cloudflare:latest".to_string(),
            propagation_seconds: 30,
        }
    }

    /// Certificate paths for `domain` under `mode`.
    pub fn paths_for(&self, mode: &CertificateMode, domain: &str) -> TlsPaths {
        let dir = if mode.is_acme() {
            format!("{}/letsencrypt/live/{}", self.cert_root, domain)
        } else {
            format!("{}/ssl/{}", self.cert_root, domain)
        };
        TlsPaths {
            certificate: format!("{}/fullchain.pem", dir),
            key: format!("{}/privkey.pem", dir),
        }
    }

    fn credentials_path(&self, domain: &str) -> String {
        format!("{}/cloudflare/{}.ini", self.cert_root, domain)
    }
}

/// Result of a successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    /// Mode used.
    pub mode: CertificateMode,
    /// Paths for the primary domain.
    pub paths: TlsPaths,
    /// Whether an existing certificate was reused.
    pub reused: bool,
    /// When issuance finished.
    pub issued_at: DateTime<Utc>,
}

/// Obtains certificates on a proxy host.
pub struct CertificateIssuer {
    executor: Arc<dyn CommandExecutor>,
    config: CertificateConfig,
}

impl CertificateIssuer {
    /// Create an issuer.
    pub fn new(executor: Arc<dyn CommandExecutor>, config: CertificateConfig) -> Self {
        Self { executor, config }
    }

    /// Issuer settings.
    pub fn config(&self) -> &CertificateConfig {
        &self.config
    }

    /// Whether a non-empty certificate already exists for `domain`.
    pub async fn has_certificate(
        &self,
        host: &HostTarget,
        mode: &CertificateMode,
        domain: &str,
    ) -> Result<bool> {
        let paths = self.config.paths_for(mode, domain);
        let out = self
            .executor
            .exec(host, ExecRequest::new(["test", "-s", paths.certificate.as_str()]))
            .await?;
        Ok(out.success())
    }

    /// Ensure a certificate covering `domains` exists on `host`.
    ///
    /// Existing certificates are reused unless `force` is set.
    pub async fn issue(
        &self,
        host: &HostTarget,
        domains: &[String],
        intent: &TlsIntent,
        force: bool,
    ) -> Result<IssuedCertificate> {
        let mode = CertificateMode::select(intent)?;
        let primary = domains
            .first()
            .ok_or_else(|| MeshError::InvalidSpec("certificate without domains".to_string()))?;

        if !force && self.has_certificate(host, &mode, primary).await? {
            debug!(host = %host, domain = %primary, mode = mode.as_str(), "Reusing certificate");
            return Ok(IssuedCertificate {
                paths: self.config.paths_for(&mode, primary),
                mode,
                reused: true,
                issued_at: Utc::now(),
            });
        }

        info!(host = %host, domain = %primary, mode = mode.as_str(), "Issuing certificate");
        match &mode {
            CertificateMode::SelfSigned => self.issue_self_signed(host, domains).await?,
            CertificateMode::Http01 { email } => self.issue_http01(host, domains, email).await?,
            CertificateMode::Dns01 { email, token } => {
                self.issue_dns01(host, domains, email, token).await?
            }
        }

        Ok(IssuedCertificate {
            paths: self.config.paths_for(&mode, primary),
            mode,
            reused: false,
            issued_at: Utc::now(),
        })
    }

    /// One SAN certificate for all domains, stored under each domain.
    async fn issue_self_signed(&self, host: &HostTarget, domains: &[String]) -> Result<()> {
        let cert = rcgen::generate_simple_self_signed(domains.to_vec())?;
        let cert_pem = cert.cert.pem().into_bytes();
        let key_pem = cert.key_pair.serialize_pem().into_bytes();

        for domain in domains {
            let paths = self.config.paths_for(&CertificateMode::SelfSigned, domain);
            self.executor
                .write_file(host, &paths.certificate, cert_pem.clone())
                .await?;
            self.write_private(host, &paths.key, key_pem.clone()).await?;
        }
        Ok(())
    }

    fn certbot_mounts(&self) -> Vec<String> {
        let root = &self.config.cert_root;
        vec![
            "-v".to_string(),
            format!("{}/letsencrypt:/etc/letsencrypt", root),
            "-v".to_string(),
            format!("{}/letsencrypt_var:/var/lib/letsencrypt", root),
            "-v".to_string(),
            format!("{}/letsencrypt_log:/var/log/letsencrypt", root),
        ]
    }

    fn certbot_args(email: &str, domains: &[String]) -> Vec<String> {
        let mut args = vec![
            "certonly".to_string(),
            "--non-interactive".to_string(),
            "--agree-tos".to_string(),
            "--keep-until-expiring".to_string(),
            "--email".to_string(),
            email.to_string(),
        ];
        for domain in domains {
            args.push("-d".to_string());
            args.push(domain.clone());
        }
        args
    }

    /// Stop the proxy, run certbot standalone on port 80, start the proxy.
    ///
    /// The proxy is started again whatever certbot did.
    async fn issue_http01(&self, host: &HostTarget, domains: &[String], email: &str) -> Result<()> {
        let proxy = self.config.proxy_container.as_str();
        let primary = domains.first().map(String::as_str).unwrap_or_default();

        self.executor
            .run(host, ExecRequest::new(["docker", "stop", proxy]))
            .await
            .map_err(|e| MeshError::Certificate {
                domain: primary.to_string(),
                reason: format!("could not stop proxy: {}", e),
            })?;

        let mut argv = vec![
            "docker".to_string(),
            "run".to_string(),
            "--rm".to_string(),
            "-p".to_string(),
            "80:80".to_string(),
        ];
        argv.extend(self.certbot_mounts());
        argv.push(self.config.certbot_image.clone());
        argv.extend(Self::certbot_args(email, domains));
        argv.push("--standalone".to_string());

        let issued = self.executor.run(host, ExecRequest::new(argv)).await;

        let restarted = self
            .executor
            .run(host, ExecRequest::new(["docker", "start", proxy]))
            .await;

        if let Err(e) = restarted {
            error!(host = %host, container = %proxy, error = %e, "Proxy did not come back after HTTP-01");
            if let Err(issue_err) = &issued {
                warn!(host = %host, domain = %primary, error = %issue_err, "certbot also failed");
            }
            return Err(MeshError::ProxyRestart(e.to_string()));
        }

        issued.map(|_| ()).map_err(|e| MeshError::Certificate {
            domain: primary.to_string(),
            reason: e.to_string(),
        })
    }

    /// Write a short-lived credentials file, run the Cloudflare plugin,
    /// remove the file.
    async fn issue_dns01(
        &self,
        host: &HostTarget,
        domains: &[String],
        email: &str,
        token: &str,
    ) -> Result<()> {
        let primary = domains.first().map(String::as_str).unwrap_or_default();
        let credentials = self.config.credentials_path(primary);
        let contents = format!("dns_cloudflare_api_token = {}\n", token).into_bytes();

        let result = match self.write_private(host, &credentials, contents).await {
            Ok(()) => {
                let mut argv = vec!["docker".to_string(), "run".to_string(), "--rm".to_string()];
                argv.extend(self.certbot_mounts());
                argv.push("-v".to_string());
                argv.push(format!("{}:/cloudflare.ini:ro", credentials));
                argv.push(self.config.dns_plugin_image.clone());
                argv.extend(Self::certbot_args(email, domains));
                argv.extend([
                    "--dns-cloudflare".to_string(),
                    "--dns-cloudflare-credentials".to_string(),
                    "/cloudflare.ini".to_string(),
                    "--dns-cloudflare-propagation-seconds".to_string(),
                    self.config.propagation_seconds.to_string(),
                ]);
                self.executor
                    .run(host, ExecRequest::new(argv))
                    .await
                    .map(|_| ())
                    .map_err(|e| MeshError::Certificate {
                        domain: primary.to_string(),
                        reason: e.to_string(),
                    })
            }
            Err(e) => Err(e),
        };

        if let Err(e) = self.executor.remove_file(host, &credentials).await {
            error!(host = %host, path = %credentials, error = %e, "Failed to remove DNS credentials");
            if result.is_ok() {
                return Err(e.into());
            }
        }
        result
    }

    /// Create `path` with mode 0600 before any content is written.
    async fn write_private(&self, host: &HostTarget, path: &str, contents: Vec<u8>) -> Result<()> {
        if let Some((parent, _)) = path.rsplit_once('/')
            && !parent.is_empty()
        {
            self.executor
                .run(host, ExecRequest::new(["mkdir", "-p", parent]))
                .await?;
        }
        self.executor
            .run(host, ExecRequest::new(["touch", path]))
            .await?;
        self.executor
            .run(host, ExecRequest::new(["chmod", "600", path]))
            .await?;
        self.executor
            .run(host, ExecRequest::new(["tee", path]).with_stdin(contents))
            .await?;
        Ok(())
    }
}
