// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Push and pull against a scripted executor and a temporary local root.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use hostmesh_core::exec::MockExecutor;
use hostmesh_core::{ExecOutput, HostTarget, HostmeshConfig, ResourceKey};
use hostmesh_sync::archive::pack_dirs;
use hostmesh_sync::{ServiceRole, SyncEngine, SyncManifest};
use tempfile::TempDir;

const REMOTE: &str = "/opt/hostmesh/alice/shop/prod";

fn setup() -> (TempDir, HostmeshConfig, SyncManifest) {
    let root = TempDir::new().unwrap();
    let config = HostmeshConfig {
        local_root: root.path().to_path_buf(),
        ..Default::default()
    };
    let key = ResourceKey::new("alice", "shop", "prod", "api");
    let manifest = SyncManifest::new(&config, &key).unwrap();

    let base = manifest.local_base();
    fs::create_dir_all(base.join("config/api")).unwrap();
    fs::create_dir_all(base.join("secrets/postgres")).unwrap();
    fs::create_dir_all(base.join("secrets/api")).unwrap();
    fs::write(base.join("config/api/app.toml"), "port = 8080\n").unwrap();
    fs::write(base.join("secrets/postgres/POSTGRES_PASSWORD"), "pg").unwrap();
    fs::write(base.join("secrets/api/API_KEY"), "k").unwrap();
    (root, config, manifest)
}

fn services() -> Vec<ServiceRole> {
    vec![ServiceRole::stateful("postgres"), ServiceRole::consumer("api")]
}

/// A tar.gz of a directory holding the given files, as `tar -C dir .` emits.
fn remote_tree(files: &[(&str, &str)]) -> Vec<u8> {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        let path = dir.path().join("tree").join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    pack_dirs(&dir.path().join("tree"), &["."]).unwrap()
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn test_push_runs_extract_and_tightens_secrets() {
    let (_root, config, manifest) = setup();
    let mock = Arc::new(MockExecutor::new());
    let engine = SyncEngine::new(mock.clone(), &config);
    let host = HostTarget::remote("10.0.0.1");

    let report = engine
        .push(&manifest, &services(), std::slice::from_ref(&host))
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(
        mock.commands(),
        vec![
            format!("mkdir -p {REMOTE}/config {REMOTE}/secrets {REMOTE}/files"),
            format!("tar -xzf - -C {REMOTE}"),
            format!("find {REMOTE}/secrets -type d -exec chmod 700 {{}} +"),
            format!("find {REMOTE}/secrets -type f -exec chmod 600 {{}} +"),
        ]
    );
    // Fan-out happened locally before packing.
    assert_eq!(
        read(&manifest.local_base().join("secrets/api/POSTGRES_PASSWORD")),
        "pg"
    );
}

#[tokio::test]
async fn test_push_is_idempotent() {
    let (_root, config, manifest) = setup();
    let mock = Arc::new(MockExecutor::new());
    let engine = SyncEngine::new(mock.clone(), &config);
    let hosts = [HostTarget::remote("10.0.0.1")];

    engine.push(&manifest, &services(), &hosts).await.unwrap();
    engine.push(&manifest, &services(), &hosts).await.unwrap();

    let calls = mock.calls();
    assert_eq!(calls.len(), 8);
    for i in 0..4 {
        assert_eq!(calls[i].argv, calls[i + 4].argv);
        assert_eq!(calls[i].stdin, calls[i + 4].stdin);
    }
}

#[tokio::test]
async fn test_push_partial_failure_across_hosts() {
    let (_root, config, manifest) = setup();
    let mock = Arc::new(MockExecutor::new());
    mock.mark_unreachable("10.0.0.2");
    let engine = SyncEngine::new(mock.clone(), &config);
    let hosts = [
        HostTarget::remote("10.0.0.1"),
        HostTarget::remote("10.0.0.2"),
        HostTarget::remote("10.0.0.3"),
    ];

    let report = engine.push(&manifest, &services(), &hosts).await.unwrap();

    assert!(!report.success());
    assert_eq!(report.outcomes.len(), 3);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].host, hosts[1]);
    assert!(failures[0].error.as_deref().unwrap().contains("unreachable"));

    for host in [&hosts[0], &hosts[2]] {
        assert_eq!(mock.calls_for(host).len(), 4);
        assert!(report.for_host(host).all(|o| o.success && o.bytes > 0));
    }
    assert_eq!(mock.calls_for(&hosts[1]).len(), 1);
}

#[tokio::test]
async fn test_push_extract_failure_is_reported() {
    let (_root, config, manifest) = setup();
    let mock = Arc::new(MockExecutor::new());
    mock.respond_to(&["tar", "-xzf"], ExecOutput::failed(2, "tar: disk full"));
    let engine = SyncEngine::new(mock.clone(), &config);

    let report = engine
        .push(&manifest, &[], &[HostTarget::remote("10.0.0.1")])
        .await
        .unwrap();

    assert!(!report.success());
    assert!(report.outcomes[0].error.as_deref().unwrap().contains("disk full"));
    assert_eq!(mock.position(&["find"]), None);
}

#[tokio::test]
async fn test_pull_host_mounted_and_exploded_volumes() {
    let (_root, config, manifest) = setup();
    let logs = remote_tree(&[("app.log", "started\n")]);
    let shared = remote_tree(&[("uploads/a.png", "png")]);
    let postgres = remote_tree(&[("PG_VERSION", "16")]);

    let mock = Arc::new(MockExecutor::with_handler(move |_host, request| {
        let argv = &request.argv;
        if request.starts_with(&["tar", "-czf", "-", "-C"]) {
            return Some(Ok(if argv[4].ends_with("/logs") {
                ExecOutput::ok(logs.clone())
            } else {
                ExecOutput::failed(2, "tar: /opt/hostmesh/alice/shop/prod/backups: No such file or directory")
            }));
        }
        if request.starts_with(&["docker", "volume", "ls"]) {
            return Some(Ok(if argv[4] == "name=alice_shop_prod_data" {
                ExecOutput::ok("alice_shop_prod_data\nalice_shop_prod_data_postgres\nalice_shop_prod_database\n")
            } else {
                ExecOutput::ok("")
            }));
        }
        if request.starts_with(&["docker", "run"]) {
            let volume = argv[4].split(':').next().unwrap_or_default();
            return Some(Ok(match volume {
                "alice_shop_prod_data" => ExecOutput::ok(shared.clone()),
                "alice_shop_prod_data_postgres" => ExecOutput::ok(postgres.clone()),
                _ => ExecOutput::failed(1, "unexpected volume"),
            }));
        }
        None
    }));
    let engine = SyncEngine::new(mock.clone(), &config);
    let host = HostTarget::remote("10.0.0.1");

    let report = engine
        .pull(&manifest, std::slice::from_ref(&host))
        .await
        .unwrap();

    assert!(report.success(), "{:?}", report.failures().collect::<Vec<_>>());
    let targets: Vec<&str> = report.outcomes.iter().map(|o| o.target.as_str()).collect();
    assert_eq!(
        targets,
        vec!["backups", "data", "data/postgres", "logs", "monitoring"]
    );

    let base = manifest.local_base();
    assert_eq!(read(&base.join("logs/10.0.0.1/app.log")), "started\n");
    assert_eq!(read(&base.join("data/10.0.0.1/uploads/a.png")), "png");
    assert_eq!(read(&base.join("data/10.0.0.1/postgres/PG_VERSION")), "16");
    assert!(!base.join("backups/10.0.0.1").exists());

    let helper_runs = mock
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("docker run --rm -v alice_shop_prod_data"))
        .count();
    assert_eq!(helper_runs, 2);
}

#[tokio::test]
async fn test_pull_keeps_archive_when_files_changed_during_read() {
    let (_root, config, manifest) = setup();
    let logs = remote_tree(&[("app.log", "started\nrotating\n")]);
    let mock = Arc::new(MockExecutor::with_handler(move |_host, request| {
        if request.starts_with(&["tar", "-czf", "-", "-C"]) && request.argv[4].ends_with("/logs") {
            return Some(Ok(ExecOutput {
                exit_code: 1,
                stdout: logs.clone(),
                stderr: "tar: ./app.log: file changed as we read it".to_string(),
            }));
        }
        None
    }));
    let engine = SyncEngine::new(mock.clone(), &config);
    let host = HostTarget::remote("10.0.0.1");

    let report = engine
        .pull(&manifest, std::slice::from_ref(&host))
        .await
        .unwrap();

    let logs = report.outcomes.iter().find(|o| o.target == "logs").unwrap();
    assert!(logs.success, "{:?}", logs.error);
    assert!(logs.bytes > 0);
    assert_eq!(
        read(&manifest.local_base().join("logs/10.0.0.1/app.log")),
        "started\nrotating\n"
    );
}

#[tokio::test]
async fn test_pull_tar_error_without_output_fails() {
    let (_root, config, manifest) = setup();
    let mock = Arc::new(MockExecutor::new());
    mock.respond_to(
        &["tar", "-czf"],
        ExecOutput::failed(1, "tar: ./app.log: Cannot open: Permission denied"),
    );
    let engine = SyncEngine::new(mock.clone(), &config);
    let host = HostTarget::remote("10.0.0.1");

    let report = engine
        .pull(&manifest, std::slice::from_ref(&host))
        .await
        .unwrap();

    let logs = report.outcomes.iter().find(|o| o.target == "logs").unwrap();
    assert!(!logs.success);
    assert!(logs.error.as_deref().unwrap().contains("Permission denied"));
}

#[tokio::test]
async fn test_pull_local_volume_uses_bind_mount() {
    let (_root, config, manifest) = setup();
    let mock = Arc::new(MockExecutor::new());
    mock.respond_to(
        &["docker", "volume", "ls", "--filter", "name=alice_shop_prod_monitoring"],
        ExecOutput::ok("alice_shop_prod_monitoring\n"),
    );
    let engine = SyncEngine::new(mock.clone(), &config);

    let report = engine.pull(&manifest, &[HostTarget::Local]).await.unwrap();
    assert!(report.success());

    let dest = manifest.local_base().join("monitoring/localhost");
    assert!(dest.is_dir());
    let copy = mock
        .calls()
        .into_iter()
        .find(|c| c.argv.iter().any(|a| a == "/to/"))
        .unwrap();
    assert_eq!(copy.argv[4], "alice_shop_prod_monitoring:/from:ro");
    assert!(copy.argv[6].ends_with("monitoring/localhost:/to"));
    assert_eq!(copy.argv[7], "alpine:3.20");
}

#[tokio::test]
async fn test_pull_failure_on_one_host_keeps_others() {
    let (_root, config, manifest) = setup();
    let mock = Arc::new(MockExecutor::new());
    mock.mark_unreachable("10.0.0.9");
    let engine = SyncEngine::new(mock.clone(), &config);
    let hosts = [HostTarget::remote("10.0.0.1"), HostTarget::remote("10.0.0.9")];

    let report = engine.pull(&manifest, &hosts).await.unwrap();

    assert_eq!(report.for_host(&hosts[1]).filter(|o| !o.success).count(), 4);
    assert!(report.for_host(&hosts[0]).all(|o| o.success));
}
