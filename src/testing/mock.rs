//! Mock collaborators for testing.
//!
//! `MockResolver` and `MockEngine` stand in for the revision resolver and the
//! transformation engine. Both record every call and answer from per-repo
//! configuration, so tests can script each shard of an invocation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::decode::RecordStream;
use crate::error::{ResolveError, ShardError, UpstreamError};
use crate::resolver::{ResolveOptions, RevisionResolver};
use crate::transport::{RewriteEngine, RewriteParams};
use crate::types::CommitId;

/// Record of a method call.
#[derive(Debug, Clone)]
pub struct MockCall {
    /// Method name (e.g., "resolver.resolve", "engine.rewrite")
    pub method: String,
    /// Arguments passed to the method
    pub args: Vec<String>,
    /// Timestamp of the call
    pub timestamp: DateTime<Utc>,
}

impl MockCall {
    /// Create a new mock call record.
    pub fn new(method: &str, args: Vec<String>) -> Self {
        Self {
            method: method.to_string(),
            args,
            timestamp: Utc::now(),
        }
    }
}

/// Build one engine record for `uri` with `substitutions` substitutions.
pub fn rewrite_record(uri: &str, substitutions: usize) -> String {
    let subs: Vec<serde_json::Value> = (0..substitutions)
        .map(|i| {
            let start = (i * 10) as i64;
            serde_json::json!({
                "range": {"start": {"Offset": start}, "end": {"Offset": start + 3}},
                "replacement_content": format!("r{i}"),
            })
        })
        .collect();
    serde_json::json!({
        "uri": uri,
        "rewritten_source": format!("// rewritten {uri}"),
        "in_place_substitutions": subs,
        "Diff": "",
    })
    .to_string()
}

/// Scripted answer of the mock resolver.
#[derive(Debug, Clone)]
pub enum MockResolution {
    /// Resolve to this commit
    Commit(String),
    RevisionNotFound,
    RepoNotFound,
    CloneInProgress,
    Ambiguous,
    /// Never answer
    Hang,
}

/// Mock revision resolver.
///
/// Unconfigured repositories resolve to `commit-<repo>`.
#[derive(Debug, Default)]
pub struct MockResolver {
    responses: Mutex<HashMap<String, MockResolution>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the answer for `repo`.
    pub fn configure(&self, repo: &str, resolution: MockResolution) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(repo.to_string(), resolution);
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl RevisionResolver for MockResolver {
    async fn resolve(
        &self,
        repo: &str,
        rev: &str,
        opts: ResolveOptions,
    ) -> Result<CommitId, ResolveError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall::new(
                "resolver.resolve",
                vec![
                    repo.to_string(),
                    rev.to_string(),
                    opts.no_ensure_revision.to_string(),
                ],
            ));

        let resolution = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(repo)
            .cloned()
            .unwrap_or_else(|| MockResolution::Commit(format!("commit-{repo}")));

        match resolution {
            MockResolution::Commit(commit) => Ok(CommitId(commit)),
            MockResolution::RevisionNotFound => Err(ResolveError::RevisionNotFound {
                repo: repo.to_string(),
                rev: rev.to_string(),
            }),
            MockResolution::RepoNotFound => Err(ResolveError::RepoNotFound(repo.to_string())),
            MockResolution::CloneInProgress => {
                Err(ResolveError::CloneInProgress(repo.to_string()))
            }
            MockResolution::Ambiguous => Err(ResolveError::Ambiguous {
                repo: repo.to_string(),
                rev: rev.to_string(),
            }),
            MockResolution::Hang => futures::future::pending().await,
        }
    }
}

/// Scripted answer of the mock engine.
#[derive(Debug, Clone)]
pub enum MockEngineResponse {
    /// 200 with these records, one chunk per record
    Records(Vec<String>),
    /// 200 with these raw body chunks
    Chunks(Vec<Vec<u8>>),
    /// Non-2xx status with this body
    Upstream { status: u16, message: String },
    /// Network failure
    Transport(String),
    /// 200 with these records, then the body never ends
    Stall(Vec<String>),
    /// Never answer
    Hang,
    /// Wait, then answer
    Delayed(Duration, Box<MockEngineResponse>),
}

impl MockEngineResponse {
    pub fn records<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Records(records.into_iter().map(Into::into).collect())
    }

    pub fn upstream(status: u16, message: &str) -> Self {
        Self::Upstream {
            status,
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// Mock transformation engine.
///
/// Unconfigured repositories answer 200 with an empty body.
#[derive(Debug, Default)]
pub struct MockEngine {
    responses: Mutex<HashMap<String, MockEngineResponse>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the answer for `repo`.
    pub fn configure(&self, repo: &str, response: MockEngineResponse) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(repo.to_string(), response);
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls made for `repo`.
    pub fn call_count(&self, repo: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|call| call.args.first().map(String::as_str) == Some(repo))
            .count()
    }
}

#[async_trait]
impl RewriteEngine for MockEngine {
    async fn rewrite(&self, params: &RewriteParams) -> Result<RecordStream, ShardError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall::new(
                "engine.rewrite",
                vec![
                    params.repo.clone(),
                    params.commit.to_string(),
                    params.match_template.clone(),
                    params.rewrite_template.clone(),
                    params.file_extension.clone().unwrap_or_default(),
                ],
            ));

        let mut response = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&params.repo)
            .cloned()
            .unwrap_or(MockEngineResponse::Chunks(vec![]));

        loop {
            match response {
                MockEngineResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
                MockEngineResponse::Records(records) => {
                    return Ok(RecordStream::from_chunks(
                        records.into_iter().map(String::into_bytes).collect::<Vec<_>>(),
                    ));
                }
                MockEngineResponse::Chunks(chunks) => return Ok(RecordStream::from_chunks(chunks)),
                MockEngineResponse::Upstream { status, message } => {
                    return Err(UpstreamError::new(status, message).into());
                }
                MockEngineResponse::Transport(message) => {
                    return Err(ShardError::Transport(message));
                }
                MockEngineResponse::Stall(records) => {
                    let chunks: Vec<Result<Vec<u8>, ShardError>> =
                        records.into_iter().map(|r| Ok(r.into_bytes())).collect();
                    let bytes = stream::iter(chunks).chain(stream::pending()).boxed();
                    return Ok(RecordStream::new(bytes));
                }
                MockEngineResponse::Hang => return futures::future::pending().await,
            }
        }
    }
}
