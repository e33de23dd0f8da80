// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! DNS record management.
//!
//! [`DnsProvider`] is the seam; [`CloudflareClient`] talks to the
//! Cloudflare v4 REST API with a bearer token. Records are upserted by
//! `(type, name)`: read first, then create or update.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MeshError, Result};

/// A DNS record to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Record type, e.g. `A`.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Fully qualified name.
    pub name: String,
    /// Record value.
    pub content: String,
    /// TTL in seconds, `1` means automatic.
    pub ttl: u32,
    /// Route through the CDN.
    pub proxied: bool,
}

impl DnsRecord {
    /// `A` record with automatic TTL.
    pub fn a(name: impl Into<String>, ip: impl Into<String>, proxied: bool) -> Self {
        Self {
            record_type: "A".to_string(),
            name: name.into(),
            content: ip.into(),
            ttl: 1,
            proxied,
        }
    }
}

/// What an upsert did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    /// A new record was created.
    Created(String),
    /// An existing record was changed.
    Updated(String),
    /// The record already matched.
    Unchanged(String),
}

impl RecordChange {
    /// Provider record id.
    pub fn id(&self) -> &str {
        match self {
            RecordChange::Created(id) | RecordChange::Updated(id) | RecordChange::Unchanged(id) => {
                id
            }
        }
    }
}

/// DNS provider abstraction.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Provider identifier.
    fn provider_type(&self) -> &'static str;

    /// Zone id owning `domain`.
    async fn zone_id(&self, domain: &str) -> Result<String>;

    /// Create or update `record`.
    async fn upsert_record(&self, record: &DnsRecord) -> Result<RecordChange>;
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ExistingRecord {
    id: String,
    content: String,
    #[serde(default)]
    proxied: bool,
    #[serde(default)]
    ttl: u32,
}

/// Cloudflare v4 API client.
pub struct CloudflareClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl CloudflareClient {
    /// Client for `base_url` (e.g. `https://api.cloudflare.com/client/v4`).
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    /// Client reusing an existing HTTP client.
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let envelope: Envelope<T> = response.json().await?;
        if !envelope.success {
            let detail = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(MeshError::Dns(format!("{}: {}", status, detail)));
        }
        envelope
            .result
            .ok_or_else(|| MeshError::Dns(format!("{}: empty result", status)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn find_records(&self, zone_id: &str, record: &DnsRecord) -> Result<Vec<ExistingRecord>> {
        self.get(
            &format!("/zones/{}/dns_records", zone_id),
            &[
                ("type", record.record_type.as_str()),
                ("name", record.name.as_str()),
            ],
        )
        .await
    }
}

/// Candidate zone names for `domain`, most specific first.
///
/// `api.shop.example.com` yields `api.shop.example.com`,
/// `shop.example.com`, `example.com`.
pub fn zone_candidates(domain: &str) -> Vec<String> {
    let labels: Vec<&str> = domain
        .trim_end_matches('.')
        .split('.')
        .filter(|l| !l.is_empty())
        .collect();
    (0..labels.len().saturating_sub(1))
        .map(|i| labels[i..].join("."))
        .collect()
}

#[async_trait]
impl DnsProvider for CloudflareClient {
    fn provider_type(&self) -> &'static str {
        "cloudflare"
    }

    async fn zone_id(&self, domain: &str) -> Result<String> {
        for candidate in zone_candidates(domain) {
            let zones: Vec<Zone> = self.get("/zones", &[("name", candidate.as_str())]).await?;
            if let Some(zone) = zones.into_iter().next() {
                debug!(domain = %domain, zone = %candidate, zone_id = %zone.id, "Resolved zone");
                return Ok(zone.id);
            }
        }
        Err(MeshError::ZoneNotFound(domain.to_string()))
    }

    async fn upsert_record(&self, record: &DnsRecord) -> Result<RecordChange> {
        let zone_id = self.zone_id(&record.name).await?;
        let existing = self.find_records(&zone_id, record).await?;

        match existing.into_iter().next() {
            Some(current)
                if current.content == record.content
                    && current.proxied == record.proxied
                    && current.ttl == record.ttl =>
            {
                debug!(name = %record.name, id = %current.id, "DNS record unchanged");
                Ok(RecordChange::Unchanged(current.id))
            }
            Some(current) => {
                let response = self
                    .http
                    .put(format!(
                        "{}/zones/{}/dns_records/{}",
                        self.base_url, zone_id, current.id
                    ))
                    .bearer_auth(&self.token)
                    .json(record)
                    .send()
                    .await?;
                let updated: ExistingRecord = Self::decode(response).await?;
                info!(name = %record.name, content = %record.content, "Updated DNS record");
                Ok(RecordChange::Updated(updated.id))
            }
            None => {
                let response = self
                    .http
                    .post(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
                    .bearer_auth(&self.token)
                    .json(record)
                    .send()
                    .await?;
                let created: ExistingRecord = Self::decode(response).await?;
                info!(name = %record.name, content = %record.content, "Created DNS record");
                Ok(RecordChange::Created(created.id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_candidates() {
        assert_eq!(
            zone_candidates("api.shop.example.com."),
            vec!["api.shop.example.com", "shop.example.com", "example.com"]
        );
        assert_eq!(zone_candidates("example.com"), vec!["example.com"]);
        assert!(zone_candidates("localhost").is_empty());
    }

    #[test]
    fn test_record_serializes_type_field() {
        let json = serde_json::to_value(DnsRecord::a("shop.example.com", "203.0.113.10", true))
            .unwrap();
        assert_eq!(json["type"], "A");
        assert_eq!(json["ttl"], 1);
        assert_eq!(json["proxied"], true);
    }
}
