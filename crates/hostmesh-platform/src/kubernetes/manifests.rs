// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kubernetes manifest rendering.
//!
//! Produces a multi-document YAML stream in apply order: Namespace,
//! Secret (when values are supplied), PersistentVolumeClaims, Deployment,
//! Service, and an Ingress when requested.

use base64::{Engine as _, engine::general_purpose};
use hostmesh_core::naming;
use hostmesh_core::{ResourceKey, SyncCategory};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::error::{PlatformError, Result};
use crate::manager::Platform;
use crate::traits::{MountSpec, RenderContext, RenderedDescriptor, SecretsReference, TemplateEngine};

/// Namespace holding every workload of one project environment.
pub fn namespace(key: &ResourceKey) -> String {
    naming::kubernetes_name(&format!("{}_{}_{}", key.owner, key.project, key.environment))
}

/// Deployment, Service and Ingress name.
pub fn workload_name(key: &ResourceKey) -> String {
    naming::kubernetes_name(&naming::container_name(key))
}

/// Name of the scope's Secret object.
pub fn secret_name(project: &str, environment: &str) -> String {
    naming::kubernetes_name(&format!("{}_{}_secrets", project, environment))
}

/// PersistentVolumeClaim name for a volume mount.
pub fn claim_name(key: &ResourceKey, category: SyncCategory, per_service: bool) -> Result<String> {
    let service = per_service.then_some(key.service.as_str());
    Ok(naming::kubernetes_name(&naming::volume_name(key, category, service)?))
}

fn labels(key: &ResourceKey) -> Value {
    json!({
        "app.kubernetes.io/name": workload_name(key),
        "app.kubernetes.io/managed-by": "hostmesh",
        "hostmesh.io/owner": naming::kubernetes_name(&key.owner),
        "hostmesh.io/project": naming::kubernetes_name(&key.project),
        "hostmesh.io/environment": naming::kubernetes_name(&key.environment),
    })
}

fn selector(key: &ResourceKey) -> Value {
    json!({ "app.kubernetes.io/name": workload_name(key) })
}

/// Secret manifest holding `values` base64-encoded.
pub fn secret_manifest(namespace: &str, name: &str, values: &BTreeMap<String, String>) -> Value {
    let data: BTreeMap<&str, String> = values
        .iter()
        .map(|(k, v)| (k.as_str(), general_purpose::STANDARD.encode(v)))
        .collect();
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { "app.kubernetes.io/managed-by": "hostmesh" },
        },
        "type": "Opaque",
        "data": data,
    })
}

fn probe(path: &str, port: u16, initial_delay: u32) -> Value {
    json!({
        "httpGet": { "path": path, "port": port },
        "initialDelaySeconds": initial_delay,
        "periodSeconds": 10,
        "timeoutSeconds": 5,
        "failureThreshold": 3,
    })
}

/// Serialize manifests as one YAML stream.
pub fn to_yaml_stream(manifests: &[Value]) -> Result<String> {
    let mut out = String::new();
    for manifest in manifests {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(manifest)?);
    }
    Ok(out)
}

/// Renders Kubernetes manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestTemplate;

impl ManifestTemplate {
    /// Build the manifests without serializing them.
    pub fn manifests(&self, ctx: &RenderContext) -> Result<Vec<Value>> {
        let key = &ctx.key;
        let ns = namespace(key);
        let name = workload_name(key);
        let mut manifests = vec![json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": ns },
        })];

        let secret_ref = match &ctx.secrets {
            Some(SecretsReference::KubernetesSecret { name, .. }) => Some(name.clone()),
            Some(SecretsReference::DockerSecrets { .. }) => {
                return Err(PlatformError::Validation(
                    "docker secrets cannot be referenced from kubernetes manifests".to_string(),
                ));
            }
            None => None,
        };
        if let Some(secret) = &secret_ref
            && !ctx.secret_values.is_empty()
        {
            manifests.push(secret_manifest(&ns, secret, &ctx.secret_values));
        }

        let mut volumes = Vec::new();
        let mut volume_mounts = Vec::new();
        for (index, mount) in ctx.mounts.iter().enumerate() {
            let volume_name = format!("vol-{}", index);
            match mount {
                MountSpec::Volume {
                    category,
                    target,
                    per_service,
                } => {
                    let claim = claim_name(key, *category, *per_service)?;
                    manifests.push(json!({
                        "apiVersion": "v1",
                        "kind": "PersistentVolumeClaim",
                        "metadata": { "name": claim, "namespace": ns, "labels": labels(key) },
                        "spec": {
                            "accessModes": ["ReadWriteOnce"],
                            "resources": { "requests": { "storage": "1Gi" } },
                        },
                    }));
                    volumes.push(json!({
                        "name": volume_name,
                        "persistentVolumeClaim": { "claimName": claim },
                    }));
                    volume_mounts.push(json!({ "name": volume_name, "mountPath": target }));
                }
                MountSpec::Bind {
                    source,
                    target,
                    read_only,
                } => {
                    volumes.push(json!({
                        "name": volume_name,
                        "hostPath": { "path": source, "type": "DirectoryOrCreate" },
                    }));
                    volume_mounts.push(json!({
                        "name": volume_name,
                        "mountPath": target,
                        "readOnly": read_only,
                    }));
                }
            }
        }

        let env: Vec<Value> = ctx
            .env
            .iter()
            .map(|(k, v)| json!({ "name": k, "value": v }))
            .collect();
        let ports: Vec<Value> = ctx
            .spec
            .container_ports
            .iter()
            .map(|p| json!({ "containerPort": p }))
            .collect();

        let mut container = json!({
            "name": naming::kubernetes_name(&key.service),
            "image": ctx.image,
            "ports": ports,
            "env": env,
            "volumeMounts": volume_mounts,
        });
        if let Some(secret) = &secret_ref {
            container["envFrom"] = json!([{ "secretRef": { "name": secret } }]);
        }
        if let (Some(path), Some(port)) = (
            &ctx.spec.features.health_check_path,
            ctx.spec.container_ports.first(),
        ) {
            container["livenessProbe"] = probe(path, *port, 30);
            container["readinessProbe"] = probe(path, *port, 5);
        }

        manifests.push(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": name, "namespace": ns, "labels": labels(key) },
            "spec": {
                "replicas": ctx.replicas,
                "selector": { "matchLabels": selector(key) },
                "template": {
                    "metadata": { "labels": labels(key) },
                    "spec": {
                        "containers": [container],
                        "volumes": volumes,
                    },
                },
            },
        }));

        if !ctx.spec.container_ports.is_empty() {
            let service_ports: Vec<Value> = ctx
                .spec
                .container_ports
                .iter()
                .map(|p| json!({ "name": format!("port-{}", p), "port": p, "targetPort": p }))
                .collect();
            manifests.push(json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": { "name": name, "namespace": ns, "labels": labels(key) },
                "spec": {
                    "type": "ClusterIP",
                    "selector": selector(key),
                    "ports": service_ports,
                },
            }));
        }

        if ctx.ingress && !ctx.spec.domains.is_empty() {
            let port = ctx.spec.container_ports.first().copied().ok_or_else(|| {
                PlatformError::Validation("ingress requires a container port".to_string())
            })?;
            manifests.push(ingress(ctx, &ns, &name, port));
        }

        Ok(manifests)
    }
}

fn ingress(ctx: &RenderContext, ns: &str, name: &str, port: u16) -> Value {
    let rules: Vec<Value> = ctx
        .spec
        .domains
        .iter()
        .map(|domain| {
            json!({
                "host": domain,
                "http": { "paths": [{
                    "path": "/",
                    "pathType": "Prefix",
                    "backend": { "service": { "name": name, "port": { "number": port } } },
                }]},
            })
        })
        .collect();

    let mut ingress = json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": { "name": name, "namespace": ns, "labels": labels(&ctx.key) },
        "spec": { "rules": rules },
    });
    if ctx.spec.tls.enabled {
        ingress["spec"]["tls"] = json!([{
            "hosts": ctx.spec.domains,
            "secretName": format!("{}-tls", name),
        }]);
        if ctx.spec.tls.email.is_some() {
            ingress["metadata"]["annotations"] =
                json!({ "cert-manager.io/cluster-issuer": "letsencrypt" });
        }
    }
    ingress
}

impl TemplateEngine for ManifestTemplate {
    fn render(&self, ctx: &RenderContext) -> Result<RenderedDescriptor> {
        let manifests = self.manifests(ctx)?;
        Ok(RenderedDescriptor {
            platform: Platform::Kubernetes,
            file_name: format!("{}.k8s.yaml", workload_name(&ctx.key)),
            contents: to_yaml_stream(&manifests)?,
        })
    }
}
