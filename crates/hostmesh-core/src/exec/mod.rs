// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command execution backends.
//!
//! Every platform CLI call, proxy reload and archive transfer goes through
//! a [`CommandExecutor`].

pub mod mock;
pub mod ssh;
mod traits;

pub use mock::MockExecutor;
pub use ssh::{SshExecutor, SshExecutorConfig};
pub use traits::*;
