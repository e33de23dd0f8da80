// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock executor for testing.
//!
//! Records every command and answers from scripted responses without
//! running anything.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{CommandExecutor, ExecError, ExecOutput, ExecRequest, HostTarget, Result};

/// A command seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Host the command was sent to.
    pub host: HostTarget,
    /// Program and arguments.
    pub argv: Vec<String>,
    /// Stdin bytes, if any.
    pub stdin: Option<Vec<u8>>,
}

impl RecordedCall {
    /// argv joined with spaces.
    pub fn command(&self) -> String {
        self.argv.join(" ")
    }
}

/// Custom responder consulted before scripted responses.
pub type Handler = Arc<dyn Fn(&HostTarget, &ExecRequest) -> Option<Result<ExecOutput>> + Send + Sync>;

struct ScriptedResponse {
    host: Option<HostTarget>,
    prefix: Vec<String>,
    output: ExecOutput,
}

impl ScriptedResponse {
    fn prefix_refs(&self) -> Vec<&str> {
        self.prefix.iter().map(String::as_str).collect()
    }
}

/// Mock executor for testing.
pub struct MockExecutor {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<Vec<ScriptedResponse>>,
    unreachable: Mutex<HashSet<String>>,
    handler: Option<Handler>,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockExecutor {
    /// Mock where every command succeeds with empty output.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
            unreachable: Mutex::new(HashSet::new()),
            handler: None,
        }
    }

    /// Mock with a custom responder. Returning `None` falls back to the
    /// scripted responses.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&HostTarget, &ExecRequest) -> Option<Result<ExecOutput>> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::new()
        }
    }

    /// Answer commands starting with `prefix` on any host.
    pub fn respond_to(&self, prefix: &[&str], output: ExecOutput) {
        self.push_response(None, prefix, output);
    }

    /// Answer commands starting with `prefix` on `host` only.
    pub fn respond_on(&self, host: &HostTarget, prefix: &[&str], output: ExecOutput) {
        self.push_response(Some(host.clone()), prefix, output);
    }

    fn push_response(&self, host: Option<HostTarget>, prefix: &[&str], output: ExecOutput) {
        lock(&self.responses).push(ScriptedResponse {
            host,
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            output,
        });
    }

    /// Every command to `address` fails with [`ExecError::Unreachable`].
    pub fn mark_unreachable(&self, address: &str) {
        lock(&self.unreachable).insert(address.to_string());
    }

    /// All recorded calls in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Recorded calls for one host.
    pub fn calls_for(&self, host: &HostTarget) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| &c.host == host).collect()
    }

    /// Recorded commands as strings.
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::command).collect()
    }

    /// Position of the first command starting with `prefix`.
    pub fn position(&self, prefix: &[&str]) -> Option<usize> {
        self.calls().iter().position(|c| {
            prefix.len() <= c.argv.len() && c.argv.iter().zip(prefix).all(|(a, p)| a == p)
        })
    }

    fn scripted(&self, host: &HostTarget, request: &ExecRequest) -> Option<ExecOutput> {
        let responses = lock(&self.responses);
        // Later registrations override earlier ones.
        responses
            .iter()
            .rev()
            .find(|r| {
                r.host.as_ref().is_none_or(|h| h == host) && request.starts_with(&r.prefix_refs())
            })
            .map(|r| r.output.clone())
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    fn executor_type(&self) -> &'static str {
        "mock"
    }

    async fn exec(&self, host: &HostTarget, request: ExecRequest) -> Result<ExecOutput> {
        lock(&self.calls).push(RecordedCall {
            host: host.clone(),
            argv: request.argv.clone(),
            stdin: request.stdin.clone(),
        });

        if lock(&self.unreachable).contains(host.address()) {
            return Err(ExecError::Unreachable(host.to_string()));
        }

        if let Some(handler) = &self.handler
            && let Some(result) = handler(host, &request)
        {
            return result;
        }

        Ok(self
            .scripted(host, &request)
            .unwrap_or_else(|| ExecOutput::ok(Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_defaults_to_success() {
        let mock = MockExecutor::new();
        let out = mock
            .exec(&HostTarget::Local, ExecRequest::new(["echo", "hi"]))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(mock.commands(), vec!["echo hi"]);
    }

    #[tokio::test]
    async fn test_scripted_responses_by_host() {
        let mock = MockExecutor::new();
        let a = HostTarget::remote("a");
        let b = HostTarget::remote("b");
        mock.respond_to(&["docker", "ps"], ExecOutput::ok("any"));
        mock.respond_on(&b, &["docker", "ps"], ExecOutput::ok("only-b"));

        let out_a = mock.exec(&a, ExecRequest::new(["docker", "ps"])).await.unwrap();
        let out_b = mock.exec(&b, ExecRequest::new(["docker", "ps", "-a"])).await.unwrap();
        assert_eq!(out_a.stdout_str(), "any");
        assert_eq!(out_b.stdout_str(), "only-b");
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let mock = MockExecutor::new();
        mock.mark_unreachable("10.0.0.9");
        let err = mock
            .exec(&HostTarget::remote("10.0.0.9"), ExecRequest::new(["true"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Unreachable(_)));
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_write_file_default_method() {
        let mock = MockExecutor::new();
        mock.write_file(&HostTarget::Local, "/etc/nginx/conf.d/a.conf", b"x".to_vec())
            .await
            .unwrap();
        let calls = mock.calls();
        assert_eq!(calls[0].command(), "mkdir -p /etc/nginx/conf.d");
        assert_eq!(calls[1].command(), "tee /etc/nginx/conf.d/a.conf");
        assert_eq!(calls[1].stdin.as_deref(), Some(&b"x"[..]));
    }
}
