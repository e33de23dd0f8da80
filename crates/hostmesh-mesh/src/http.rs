// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP virtual host rendering.
//!
//! One backend is proxied to directly. More than one gets a named
//! `upstream` block carrying the balancing strategy and per-server
//! weight and failure thresholds.

use hostmesh_core::naming;
use hostmesh_core::service::{BackendServer, BalanceStrategy, ServiceSpec};
use hostmesh_core::ResourceKey;

use crate::error::{MeshError, Result};
use crate::rendered::{ProxyKind, RenderedProxyConfig};
use crate::writer::BlockWriter;

/// Webroot served for ACME HTTP-01 challenges while the proxy is up.
pub const ACME_WEBROOT: &str = "/var/www/certbot";

const STATIC_ASSET_PATTERN: &str =
    r"~* \.(?:css|js|mjs|map|jpg|jpeg|png|gif|webp|avif|ico|svg|woff2?|ttf|eot)$";

const GZIP_TYPES: &str = "text/plain text/css text/xml application/json application/javascript application/xml+rss application/atom+xml image/svg+xml";

/// Certificate and key paths as seen by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// Full chain PEM.
    pub certificate: String,
    /// Private key PEM.
    pub key: String,
}

/// Name of the upstream block for `key`.
pub fn upstream_name(key: &ResourceKey) -> String {
    format!("{}_backend", naming::container_name(key))
}

fn upstream_server_line(backend: &BackendServer) -> String {
    let mut line = format!("server {}", backend.target);
    if let Some(weight) = backend.weight {
        line.push_str(&format!(" weight={}", weight));
    }
    if let Some(max_fails) = backend.max_fails {
        line.push_str(&format!(" max_fails={}", max_fails));
    }
    if let Some(fail_timeout) = backend.fail_timeout_secs {
        line.push_str(&format!(" fail_timeout={}s", fail_timeout));
    }
    line
}

fn balance_directive(strategy: BalanceStrategy) -> Option<&'static str> {
    match strategy {
        BalanceStrategy::RoundRobin => None,
        BalanceStrategy::LeastConnections => Some("least_conn"),
        BalanceStrategy::IpHash => Some("ip_hash"),
        BalanceStrategy::Random => Some("random"),
    }
}

/// Render the HTTP virtual host for `key`.
///
/// `tls` must be provided when `spec.tls.enabled` is set; it carries the
/// certificate paths chosen by the issuer.
pub fn render_http(
    key: &ResourceKey,
    spec: &ServiceSpec,
    tls: Option<&TlsPaths>,
) -> Result<RenderedProxyConfig> {
    if spec.domains.is_empty() {
        return Err(MeshError::InvalidSpec(format!("{} has no domains", key)));
    }
    if spec.backends.is_empty() {
        return Err(MeshError::InvalidSpec(format!("{} has no backends", key)));
    }
    let tls = match (spec.tls.enabled, tls) {
        (true, Some(paths)) => Some(paths),
        (true, None) => {
            return Err(MeshError::InvalidSpec(format!(
                "{} enables TLS without certificate paths",
                key
            )));
        }
        (false, _) => None,
    };

    let server_names = spec.domains.join(" ");
    let mut w = BlockWriter::new();
    w.line(format!("# Managed by hostmesh: {}", key));

    let proxy_target = if spec.backends.len() == 1 {
        spec.backends[0].target.to_string()
    } else {
        let name = upstream_name(key);
        w.open(format!("upstream {}", name));
        if let Some(directive) = balance_directive(spec.features.balance) {
            w.directive(directive);
        }
        for backend in &spec.backends {
            w.directive(upstream_server_line(backend));
        }
        w.directive("keepalive 16");
        w.close();
        w.blank();
        name
    };

    match tls {
        Some(paths) => {
            // Plain HTTP only answers ACME challenges and redirects.
            w.open("server");
            w.directive("listen 80");
            w.directive("listen [::]:80");
            w.directive(format!("server_name {}", server_names));
            w.open("location /.well-known/acme-challenge/");
            w.directive(format!("root {}", ACME_WEBROOT));
            w.close();
            w.open("location /");
            w.directive("return 301 https://$host$request_uri");
            w.close();
            w.close();
            w.blank();

            w.open("server");
            w.directive("listen 443 ssl");
            w.directive("listen [::]:443 ssl");
            w.directive("http2 on");
            w.directive(format!("server_name {}", server_names));
            w.directive(format!("ssl_certificate {}", paths.certificate));
            w.directive(format!("ssl_certificate_key {}", paths.key));
            w.directive("ssl_protocols TLSv1.2 TLSv1.3");
            w.directive("ssl_prefer_server_ciphers off");
            w.directive("ssl_session_cache shared:SSL:10m");
            w.directive("ssl_session_timeout 1d");
            write_server_body(&mut w, spec, &proxy_target, true);
            w.close();
        }
        None => {
            w.open("server");
            w.directive("listen 80");
            w.directive("listen [::]:80");
            w.directive(format!("server_name {}", server_names));
            write_server_body(&mut w, spec, &proxy_target, false);
            w.close();
        }
    }

    Ok(RenderedProxyConfig {
        kind: ProxyKind::Http,
        file_name: naming::proxy_config_name(key),
        contents: w.finish(),
    })
}

fn write_server_body(w: &mut BlockWriter, spec: &ServiceSpec, proxy_target: &str, tls: bool) {
    let features = &spec.features;

    if features.security_headers {
        w.directive(r#"add_header X-Frame-Options "SAMEORIGIN" always"#);
        w.directive(r#"add_header X-Content-Type-Options "nosniff" always"#);
        w.directive(r#"add_header Referrer-Policy "strict-origin-when-cross-origin" always"#);
        w.directive(r#"add_header X-XSS-Protection "1; mode=block" always"#);
        if tls {
            w.directive(
                r#"add_header Strict-Transport-Security "max-age=31536000; includeSubDomains" always"#,
            );
        }
    }

    if features.gzip {
        w.directive("gzip on");
        w.directive("gzip_vary on");
        w.directive("gzip_proxied any");
        w.directive("gzip_comp_level 6");
        w.directive(format!("gzip_types {}", GZIP_TYPES));
    }

    if let Some(size) = &features.client_max_body_size {
        w.directive(format!("client_max_body_size {}", size));
    }

    if let Some(path) = &features.health_check_path {
        w.open(format!("location = {}", path));
        w.directive("access_log off");
        w.directive("default_type text/plain");
        w.directive(r#"return 200 "healthy\n""#);
        w.close();
    }

    if features.static_cache {
        w.open(format!("location {}", STATIC_ASSET_PATTERN));
        write_proxy_directives(w, spec, proxy_target);
        w.directive("expires 30d");
        w.directive(r#"add_header Cache-Control "public, immutable""#);
        w.directive("access_log off");
        w.close();
    }

    w.open("location /");
    if let Some(limit) = &features.rate_limit {
        w.directive(format!(
            "limit_req zone={} burst={} nodelay",
            limit.zone, limit.burst
        ));
    }
    if let Some(auth) = &features.basic_auth {
        w.directive(format!(r#"auth_basic "{}""#, auth.realm.replace('"', "")));
        w.directive(format!("auth_basic_user_file {}", auth.htpasswd_path));
    }
    write_proxy_directives(w, spec, proxy_target);
    w.close();

    if let Some(extra) = &features.extra_config {
        w.raw(extra);
    }
}

fn write_proxy_directives(w: &mut BlockWriter, spec: &ServiceSpec, proxy_target: &str) {
    w.directive(format!("proxy_pass http://{}", proxy_target));
    w.directive("proxy_http_version 1.1");
    if spec.features.websocket {
        w.directive("proxy_set_header Upgrade $http_upgrade");
        w.directive(r#"proxy_set_header Connection "upgrade""#);
        w.directive("proxy_read_timeout 86400s");
    } else {
        w.directive(r#"proxy_set_header Connection """#);
    }
    w.directive("proxy_set_header Host $host");
    w.directive("proxy_set_header X-Real-IP $remote_addr");
    w.directive("proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for");
    w.directive("proxy_set_header X-Forwarded-Proto $scheme");
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostmesh_core::service::{BasicAuth, RateLimit};

    fn key() -> ResourceKey {
        ResourceKey::new("alice", "shop", "prod", "api")
    }

    fn spec(backends: Vec<BackendServer>) -> ServiceSpec {
        ServiceSpec {
            domains: vec!["shop.example.com".to_string()],
            backends,
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_domains_and_backends() {
        let mut s = spec(vec![]);
        assert!(matches!(
            render_http(&key(), &s, None),
            Err(MeshError::InvalidSpec(_))
        ));
        s.backends.push(BackendServer::container("a", 80));
        s.domains.clear();
        assert!(render_http(&key(), &s, None).is_err());
    }

    #[test]
    fn test_tls_requires_paths() {
        let mut s = spec(vec![BackendServer::container("a", 80)]);
        s.tls.enabled = true;
        assert!(render_http(&key(), &s, None).is_err());
    }

    #[test]
    fn test_tls_redirect_and_hsts() {
        let mut s = spec(vec![BackendServer::container("alice_shop_prod_api", 8080)]);
        s.tls.enabled = true;
        let paths = TlsPaths {
            certificate: "/etc/letsencrypt/live/shop.example.com/fullchain.pem".to_string(),
            key: "/etc/letsencrypt/live/shop.example.com/privkey.pem".to_string(),
        };
        let out = render_http(&key(), &s, Some(&paths)).unwrap();
        assert!(out.contents.contains("return 301 https://$host$request_uri;"));
        assert!(out.contents.contains("listen 443 ssl;"));
        assert!(out.contents.contains(&format!("ssl_certificate {};", paths.certificate)));
        assert!(out.contents.contains("Strict-Transport-Security"));
        assert_eq!(out.listen_ports(), vec![80, 80, 443, 443]);
    }

    #[test]
    fn test_optional_features() {
        let mut s = spec(vec![BackendServer::container("a", 80)]);
        s.features.websocket = true;
        s.features.static_cache = true;
        s.features.health_check_path = Some("/healthz".to_string());
        s.features.rate_limit = Some(RateLimit {
            zone: "api_limit".to_string(),
            burst: 20,
        });
        s.features.basic_auth = Some(BasicAuth {
            realm: "Staff".to_string(),
            htpasswd_path: "/etc/nginx/htpasswd/shop".to_string(),
        });
        s.features.extra_config = Some("location /legacy {\n    return 410;\n}".to_string());

        let out = render_http(&key(), &s, None).unwrap();
        let c = &out.contents;
        assert!(c.contains("proxy_set_header Upgrade $http_upgrade;"));
        assert!(c.contains("expires 30d;"));
        assert!(c.contains("location = /healthz {"));
        assert!(c.contains(r#"return 200 "healthy\n";"#));
        assert!(c.contains("limit_req zone=api_limit burst=20 nodelay;"));
        assert!(c.contains(r#"auth_basic "Staff";"#));
        assert!(c.contains("        return 410;"));
        assert!(!c.contains("Strict-Transport-Security"));
    }

    #[test]
    fn test_features_off() {
        let mut s = spec(vec![BackendServer::container("a", 80)]);
        s.features.gzip = false;
        s.features.security_headers = false;
        let out = render_http(&key(), &s, None).unwrap();
        assert!(!out.contents.contains("gzip on;"));
        assert!(!out.contents.contains("X-Frame-Options"));
        assert!(!out.contents.contains("location = "));
    }
}
