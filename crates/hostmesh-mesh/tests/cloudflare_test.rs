// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the Cloudflare client and real-IP refresh against a mock HTTP
//! server.

use std::sync::Arc;

use hostmesh_core::exec::MockExecutor;
use hostmesh_core::{ExecOutput, HostTarget, HostmeshConfig};
use hostmesh_mesh::dns::RecordChange;
use hostmesh_mesh::layout::{ProxyLayout, render_main_config};
use hostmesh_mesh::{CloudflareClient, DnsProvider, DnsRecord, MeshConfigurator, MeshError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "cf-test-token";

fn ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result,
    }))
}

async fn server_with_zone() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("name", "shop.example.com"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("name", "example.com"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(ok(json!([{"id": "zone-1", "name": "example.com"}])))
        .mount(&server)
        .await;
    server
}

fn existing(content: &str) -> serde_json::Value {
    json!([{
        "id": "rec-1",
        "type": "A",
        "name": "shop.example.com",
        "content": content,
        "proxied": true,
        "ttl": 1
    }])
}

#[tokio::test]
async fn test_zone_lookup_walks_up_labels() {
    let server = server_with_zone().await;
    let client = CloudflareClient::new(server.uri(), TOKEN);
    assert_eq!(client.zone_id("shop.example.com").await.unwrap(), "zone-1");
}

#[tokio::test]
async fn test_missing_zone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;
    let client = CloudflareClient::new(server.uri(), TOKEN);
    assert!(matches!(
        client.zone_id("shop.example.com").await,
        Err(MeshError::ZoneNotFound(_))
    ));
}

#[tokio::test]
async fn test_upsert_creates_missing_record() {
    let server = server_with_zone().await;
    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .and(query_param("type", "A"))
        .and(query_param("name", "shop.example.com"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/zones/zone-1/dns_records"))
        .and(body_partial_json(json!({
            "type": "A",
            "name": "shop.example.com",
            "content": "203.0.113.10",
            "proxied": true
        })))
        .respond_with(ok(json!({
            "id": "rec-new",
            "content": "203.0.113.10",
            "proxied": true,
            "ttl": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CloudflareClient::new(server.uri(), TOKEN);
    let change = client
        .upsert_record(&DnsRecord::a("shop.example.com", "203.0.113.10", true))
        .await
        .unwrap();
    assert_eq!(change, RecordChange::Created("rec-new".to_string()));
}

#[tokio::test]
async fn test_upsert_updates_changed_record() {
    let server = server_with_zone().await;
    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(ok(existing("198.51.100.1")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/zones/zone-1/dns_records/rec-1"))
        .and(body_partial_json(json!({"content": "203.0.113.10"})))
        .respond_with(ok(json!({
            "id": "rec-1",
            "content": "203.0.113.10",
            "proxied": true,
            "ttl": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CloudflareClient::new(server.uri(), TOKEN);
    let change = client
        .upsert_record(&DnsRecord::a("shop.example.com", "203.0.113.10", true))
        .await
        .unwrap();
    assert_eq!(change, RecordChange::Updated("rec-1".to_string()));
}

#[tokio::test]
async fn test_upsert_leaves_matching_record() {
    let server = server_with_zone().await;
    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(ok(existing("203.0.113.10")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ok(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = CloudflareClient::new(server.uri(), TOKEN);
    let change = client
        .upsert_record(&DnsRecord::a("shop.example.com", "203.0.113.10", true))
        .await
        .unwrap();
    assert_eq!(change.id(), "rec-1");
    assert!(matches!(change, RecordChange::Unchanged(_)));
}

#[tokio::test]
async fn test_api_errors_are_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "success": false,
            "errors": [{"code": 9109, "message": "Invalid access token"}],
            "result": null
        })))
        .mount(&server)
        .await;

    let client = CloudflareClient::new(server.uri(), TOKEN);
    match client.zone_id("shop.example.com").await {
        Err(MeshError::Dns(msg)) => assert!(msg.contains("Invalid access token (9109)")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_dns_for_every_domain() {
    let server = server_with_zone().await;
    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(ok(json!({"id": "rec-x", "content": "203.0.113.10"})))
        .expect(1)
        .mount(&server)
        .await;

    let mock = Arc::new(MockExecutor::new());
    let configurator = MeshConfigurator::new(mock, &HostmeshConfig::default());
    let client = CloudflareClient::new(server.uri(), TOKEN);
    let spec = hostmesh_core::ServiceSpec {
        domains: vec!["shop.example.com".to_string()],
        ..Default::default()
    };
    let changes = configurator
        .publish_dns(&client, &spec, "203.0.113.10", false)
        .await
        .unwrap();
    assert_eq!(changes.len(), 1);
}

// ============================================================================
// Real-IP refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_real_ip_rewrites_managed_block() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ips-v4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("173.245.48.0/20\n103.21.244.0/22\n"))
        .mount(&server)
        .await;

    let layout = ProxyLayout::new("/etc/nginx");
    let stale = render_main_config(&layout, &["192.0.2.0/24".to_string()], &[]);
    let mock = Arc::new(MockExecutor::new());
    mock.respond_to(&["cat", "/etc/nginx/nginx.conf"], ExecOutput::ok(stale));

    let configurator = MeshConfigurator::new(mock.clone(), &HostmeshConfig::default());
    let host = HostTarget::remote("203.0.113.10");
    let changed = configurator
        .refresh_real_ip(&host, &reqwest::Client::new(), &format!("{}/ips-v4", server.uri()))
        .await
        .unwrap();
    assert!(changed);

    let written = mock
        .calls()
        .into_iter()
        .find(|c| c.command() == "tee /etc/nginx/nginx.conf")
        .unwrap();
    let written = String::from_utf8(written.stdin.unwrap()).unwrap();
    let expected = render_main_config(
        &layout,
        &["173.245.48.0/20".to_string(), "103.21.244.0/22".to_string()],
        &[],
    );
    assert_eq!(written, expected);
    assert_eq!(
        mock.commands().last().unwrap(),
        "docker exec nginx nginx -s reload"
    );
}

#[tokio::test]
async fn test_refresh_real_ip_skips_unchanged_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ips-v4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("173.245.48.0/20\n"))
        .mount(&server)
        .await;

    let layout = ProxyLayout::new("/etc/nginx");
    let current = render_main_config(&layout, &["173.245.48.0/20".to_string()], &[]);
    let mock = Arc::new(MockExecutor::new());
    mock.respond_to(&["cat"], ExecOutput::ok(current));

    let configurator = MeshConfigurator::new(mock.clone(), &HostmeshConfig::default());
    let changed = configurator
        .refresh_real_ip(
            &HostTarget::Local,
            &reqwest::Client::new(),
            &format!("{}/ips-v4", server.uri()),
        )
        .await
        .unwrap();
    assert!(!changed);
    assert_eq!(mock.commands(), vec!["cat /etc/nginx/nginx.conf"]);
}
