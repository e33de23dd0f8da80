// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration errors as seen from a downstream crate.

use hostmesh_core::HostmeshConfig;
use hostmesh_core::config::ConfigError;

fn describe(err: &ConfigError) -> String {
    // Downstream matches need a catch-all; new variants must not break them.
    match err {
        ConfigError::Invalid(name, reason) => format!("{name}: {reason}"),
        other => other.to_string(),
    }
}

#[test]
fn test_invalid_parallelism_is_reported_by_name() {
    let err = HostmeshConfig::from_lookup(|name| {
        (name == "HOSTMESH_MAX_PARALLEL_TRANSFERS").then(|| "0".to_string())
    })
    .unwrap_err();
    assert_eq!(
        describe(&err),
        "HOSTMESH_MAX_PARALLEL_TRANSFERS: must be a positive integer"
    );
}

#[test]
fn test_invalid_port_message() {
    let err = HostmeshConfig::from_lookup(|name| {
        (name == "HOSTMESH_SSH_PORT").then(|| "ssh".to_string())
    })
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid value for HOSTMESH_SSH_PORT: must be a valid port"
    );
}
