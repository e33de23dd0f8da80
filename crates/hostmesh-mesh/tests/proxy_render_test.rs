// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for HTTP and stream proxy rendering rules.

use hostmesh_core::ResourceKey;
use hostmesh_core::ports::internal_port;
use hostmesh_core::service::{BackendServer, BalanceStrategy, ServiceSpec};
use hostmesh_mesh::http::upstream_name;
use hostmesh_mesh::stream::{StreamOptions, stream_upstream_name};
use hostmesh_mesh::{ProxyKind, render_http, render_stream};

fn web_key() -> ResourceKey {
    ResourceKey::new("alice", "shop", "prod", "web")
}

fn db_key() -> ResourceKey {
    ResourceKey::new("alice", "shop", "prod", "postgres")
}

fn web_spec(backends: Vec<BackendServer>) -> ServiceSpec {
    ServiceSpec {
        domains: vec!["shop.example.com".to_string(), "www.shop.example.com".to_string()],
        backends,
        ..Default::default()
    }
}

// ============================================================================
// HTTP
// ============================================================================

#[test]
fn test_single_backend_has_no_upstream() {
    let spec = web_spec(vec![BackendServer::container("alice_shop_prod_web", 8080)]);
    let out = render_http(&web_key(), &spec, None).unwrap();

    assert_eq!(out.kind, ProxyKind::Http);
    assert_eq!(out.file_name, "alice_shop_prod_web.conf");
    assert_eq!(out.upstream_count(), 0);
    assert!(out.contents.contains("proxy_pass http://alice_shop_prod_web:8080;"));
    assert!(out.contents.contains("server_name shop.example.com www.shop.example.com;"));
}

#[test]
fn test_multiple_backends_share_one_upstream() {
    let mut heavy = BackendServer::address("10.0.0.2", 18080);
    heavy.weight = Some(3);
    heavy.max_fails = Some(2);
    heavy.fail_timeout_secs = Some(15);
    let mut spec = web_spec(vec![
        BackendServer::address("10.0.0.1", 18080),
        heavy,
        BackendServer::address("10.0.0.3", 18080),
    ]);
    spec.features.balance = BalanceStrategy::LeastConnections;

    let out = render_http(&web_key(), &spec, None).unwrap();
    assert_eq!(out.upstream_count(), 1);
    assert_eq!(
        out.upstream_servers(),
        vec![
            "10.0.0.1:18080",
            "10.0.0.2:18080 weight=3 max_fails=2 fail_timeout=15s",
            "10.0.0.3:18080",
        ]
    );
    assert!(out.contents.contains("least_conn;"));
    assert!(out.contents.contains(&format!(
        "proxy_pass http://{};",
        upstream_name(&web_key())
    )));
}

#[test]
fn test_balance_strategies() {
    for (strategy, directive) in [
        (BalanceStrategy::IpHash, Some("ip_hash;")),
        (BalanceStrategy::Random, Some("random;")),
        (BalanceStrategy::RoundRobin, None),
    ] {
        let mut spec = web_spec(vec![
            BackendServer::container("a", 80),
            BackendServer::container("b", 80),
        ]);
        spec.features.balance = strategy;
        let out = render_http(&web_key(), &spec, None).unwrap();
        match directive {
            Some(d) => assert!(out.contents.contains(d), "{:?}", strategy),
            None => {
                assert!(!out.contents.contains("least_conn"));
                assert!(!out.contents.contains("ip_hash"));
            }
        }
    }
}

// ============================================================================
// Stream
// ============================================================================

#[test]
fn test_stream_listens_on_internal_port_single_host() {
    let key = db_key();
    let out = render_stream(
        &key,
        &[BackendServer::container("alice_shop_prod_postgres", 5432)],
        &StreamOptions::default(),
    )
    .unwrap();

    assert_eq!(out.kind, ProxyKind::Stream);
    assert_eq!(out.listen_ports(), vec![internal_port(&key)]);
    assert_eq!(out.upstream_count(), 1);
    assert!(out.contents.contains(&format!("proxy_pass {};", stream_upstream_name(&key))));
    assert_eq!(
        out.upstream_servers(),
        vec!["alice_shop_prod_postgres:5432 max_fails=3 fail_timeout=10s"]
    );
}

#[test]
fn test_stream_listens_on_internal_port_multi_host() {
    let key = db_key();
    let backends = vec![
        BackendServer::address("10.0.0.1", 15432),
        BackendServer::address("10.0.0.2", 15432),
    ];
    let out = render_stream(&key, &backends, &StreamOptions::default()).unwrap();
    assert_eq!(out.listen_ports(), vec![internal_port(&key)]);
    assert_eq!(out.upstream_servers().len(), 2);
}

#[test]
fn test_stream_port_is_stable_across_backend_changes() {
    let key = db_key();
    let one = render_stream(
        &key,
        &[BackendServer::container("alice_shop_prod_postgres", 5432)],
        &StreamOptions::default(),
    )
    .unwrap();
    let moved = render_stream(
        &key,
        &[BackendServer::address("10.0.0.9", 40000)],
        &StreamOptions::default(),
    )
    .unwrap();
    assert_eq!(one.listen_ports(), moved.listen_ports());
}
