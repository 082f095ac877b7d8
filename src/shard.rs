//! Shard worker: one repository revision's unit of work.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decode::RawRewriteRecord;
use crate::error::ShardError;
use crate::resolver::{ResolveOptions, RevisionResolver};
use crate::transport::{RewriteEngine, RewriteParams};
use crate::types::{
    CommitId, FileRewriteResult, InPlaceSubstitution, RepositoryRevision, TransformationRequest,
};

/// How a shard ended. Produced exactly once per shard.
#[derive(Debug)]
pub enum ShardOutcome {
    /// Rewrites in the order the engine sent them.
    Success {
        results: Vec<FileRewriteResult>,
        /// The per-shard cap stopped the shard early.
        limit_hit: bool,
    },
    Failed(ShardError),
    /// The shared scope was cancelled; nothing from this shard is used.
    Cancelled,
}

impl ShardOutcome {
    fn from_error(err: ShardError) -> Self {
        match err {
            ShardError::Cancelled => Self::Cancelled,
            other => Self::Failed(other),
        }
    }
}

/// Cancellation and deadline shared by every shard of one invocation.
#[derive(Debug, Clone)]
pub struct ShardScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ShardScope {
    pub fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { token, deadline }
    }

    /// Cancel every shard bound to this scope.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run `fut` unless the scope is cancelled or its deadline passes first.
    ///
    /// The losing future is dropped without being polled again.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, ShardError> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => futures::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ShardError::Cancelled),
            _ = deadline => Err(ShardError::Timeout),
            output = fut => Ok(output),
        }
    }

    /// Attribute an error to the scope when the scope has ended.
    ///
    /// Cancellation wins over a deadline, and both win over whatever the
    /// call itself reported.
    fn attribute(&self, err: ShardError) -> ShardError {
        if self.is_cancelled() {
            ShardError::Cancelled
        } else if self.deadline_passed() {
            ShardError::Timeout
        } else {
            err
        }
    }
}

/// Resolves one repository revision, calls the engine and normalizes the
/// streamed records.
#[derive(Clone)]
pub struct ShardWorker {
    resolver: Arc<dyn RevisionResolver>,
    engine: Arc<dyn RewriteEngine>,
    result_limit: usize,
}

impl ShardWorker {
    /// Create a worker. `result_limit` of zero means no per-shard cap.
    pub fn new(
        resolver: Arc<dyn RevisionResolver>,
        engine: Arc<dyn RewriteEngine>,
        result_limit: usize,
    ) -> Self {
        Self {
            resolver,
            engine,
            result_limit,
        }
    }

    /// Run the shard to completion within `scope`.
    pub async fn run(
        &self,
        repo_rev: &RepositoryRevision,
        request: &TransformationRequest,
        scope: &ShardScope,
    ) -> ShardOutcome {
        match self.try_run(repo_rev, request, scope).await {
            Ok(_) if scope.is_cancelled() => ShardOutcome::Cancelled,
            Ok((results, limit_hit)) => ShardOutcome::Success { results, limit_hit },
            Err(err) => ShardOutcome::from_error(scope.attribute(err)),
        }
    }

    async fn try_run(
        &self,
        repo_rev: &RepositoryRevision,
        request: &TransformationRequest,
        scope: &ShardScope,
    ) -> Result<(Vec<FileRewriteResult>, bool), ShardError> {
        let opts = ResolveOptions {
            no_ensure_revision: true,
        };
        let commit = scope
            .guard(self.resolver.resolve(&repo_rev.repo, &repo_rev.rev, opts))
            .await??;

        let params = RewriteParams {
            repo: repo_rev.repo.clone(),
            commit: commit.clone(),
            match_template: request.match_template.clone(),
            rewrite_template: request.rewrite_template.clone(),
            file_extension: request.file_extension.clone(),
        };
        let mut records = scope.guard(self.engine.rewrite(&params)).await??;

        let mut results = Vec::new();
        let mut seen = 0usize;
        let mut limit_hit = false;
        while let Some(record) = scope.guard(records.next_record()).await? {
            seen += 1;
            let Some(result) = normalize(repo_rev, &commit, record?) else {
                continue;
            };
            if self.result_limit > 0 && results.len() >= self.result_limit {
                limit_hit = true;
                break;
            }
            results.push(result);
        }

        debug!(commit = %commit, records = seen, results = results.len(), limit_hit, "codemod shard done");
        Ok((results, limit_hit))
    }
}

/// Turn a raw record into a result; records without substitutions are dropped.
fn normalize(
    repo_rev: &RepositoryRevision,
    commit: &CommitId,
    raw: RawRewriteRecord,
) -> Option<FileRewriteResult> {
    let substitutions = raw
        .in_place_substitutions
        .unwrap_or_default()
        .into_iter()
        .map(|sub| InPlaceSubstitution {
            start: sub.range.start.offset,
            end: sub.range.end.offset,
            replacement: sub.replacement_content,
        })
        .collect();

    FileRewriteResult::new(
        &repo_rev.repo,
        &repo_rev.rev,
        commit.clone(),
        raw.uri,
        raw.rewritten_source.filter(|s| !s.is_empty()),
        substitutions,
        raw.diff.filter(|d| !d.is_empty()),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ResolveError;
    use crate::testing::{
        rewrite_record, MockEngine, MockEngineResponse, MockResolution, MockResolver,
    };

    const REPO: &str = "github.com/acme/a";

    fn setup() -> (Arc<MockResolver>, Arc<MockEngine>) {
        (Arc::new(MockResolver::new()), Arc::new(MockEngine::new()))
    }

    fn worker(resolver: &Arc<MockResolver>, engine: &Arc<MockEngine>, limit: usize) -> ShardWorker {
        ShardWorker::new(resolver.clone(), engine.clone(), limit)
    }

    fn request() -> TransformationRequest {
        TransformationRequest::new("foo(:[x])", "bar(:[x])").with_file_extension(".go")
    }

    fn scope() -> ShardScope {
        ShardScope::new(CancellationToken::new(), None)
    }

    #[tokio::test]
    async fn test_success_drops_empty_records_and_keeps_order() {
        let (resolver, engine) = setup();
        engine.configure(
            REPO,
            MockEngineResponse::records([
                rewrite_record("b.go", 2),
                rewrite_record("skip.go", 0),
                rewrite_record("a.go", 1),
            ]),
        );

        let outcome = worker(&resolver, &engine, 0)
            .run(&RepositoryRevision::new(REPO, "main"), &request(), &scope())
            .await;

        let ShardOutcome::Success { results, limit_hit } = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert!(!limit_hit);
        let paths: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["b.go", "a.go"]);
        assert_eq!(results[0].commit.as_str(), "commit-github.com/acme/a");
        assert_eq!(results[0].substitutions.len(), 2);
        assert_eq!(results[0].uri, "git://github.com/acme/a?main#b.go");
    }

    #[tokio::test]
    async fn test_resolver_called_without_ensure_and_engine_gets_params() {
        let (resolver, engine) = setup();
        resolver.configure(REPO, MockResolution::Commit("abc123".to_string()));

        worker(&resolver, &engine, 0)
            .run(&RepositoryRevision::new(REPO, "v1.0"), &request(), &scope())
            .await;

        let resolve_calls = resolver.calls();
        assert_eq!(resolve_calls.len(), 1);
        assert_eq!(resolve_calls[0].args, vec![REPO, "v1.0", "true"]);

        let engine_calls = engine.calls();
        assert_eq!(engine_calls.len(), 1);
        assert_eq!(
            engine_calls[0].args,
            vec![REPO, "abc123", "foo(:[x])", "bar(:[x])", ".go"]
        );
    }

    #[tokio::test]
    async fn test_resolve_failure_skips_engine() {
        let (resolver, engine) = setup();
        resolver.configure(REPO, MockResolution::RepoNotFound);

        let outcome = worker(&resolver, &engine, 0)
            .run(&RepositoryRevision::new(REPO, "main"), &request(), &scope())
            .await;

        assert!(matches!(
            outcome,
            ShardOutcome::Failed(ShardError::Resolve(ResolveError::RepoNotFound(_)))
        ));
        assert_eq!(engine.call_count(REPO), 0);
    }

    #[tokio::test]
    async fn test_decode_error_discards_earlier_records() {
        let (resolver, engine) = setup();
        engine.configure(
            REPO,
            MockEngineResponse::Chunks(vec![
                rewrite_record("a.go", 1).into_bytes(),
                b"{\"uri\": [".to_vec(),
                b"}".to_vec(),
            ]),
        );

        let outcome = worker(&resolver, &engine, 0)
            .run(&RepositoryRevision::new(REPO, "main"), &request(), &scope())
            .await;

        assert!(matches!(outcome, ShardOutcome::Failed(ShardError::Decode(_))));
    }

    #[tokio::test]
    async fn test_per_shard_limit_stops_early() {
        let (resolver, engine) = setup();
        engine.configure(
            REPO,
            MockEngineResponse::records([
                rewrite_record("a.go", 1),
                rewrite_record("b.go", 1),
                rewrite_record("c.go", 1),
            ]),
        );

        let outcome = worker(&resolver, &engine, 2)
            .run(&RepositoryRevision::new(REPO, "main"), &request(), &scope())
            .await;

        let ShardOutcome::Success { results, limit_hit } = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(results.len(), 2);
        assert!(limit_hit);
    }

    #[tokio::test]
    async fn test_per_shard_limit_not_hit_at_exact_count() {
        let (resolver, engine) = setup();
        engine.configure(
            REPO,
            MockEngineResponse::records([rewrite_record("a.go", 1), rewrite_record("b.go", 1)]),
        );

        let outcome = worker(&resolver, &engine, 2)
            .run(&RepositoryRevision::new(REPO, "main"), &request(), &scope())
            .await;

        assert!(matches!(outcome, ShardOutcome::Success { limit_hit: false, ref results } if results.len() == 2));
    }

    #[tokio::test]
    async fn test_cancelled_scope_aborts_stalled_stream() {
        let (resolver, engine) = setup();
        engine.configure(REPO, MockEngineResponse::Stall(vec![rewrite_record("a.go", 1)]));

        let scope = scope();
        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome = worker(&resolver, &engine, 0)
            .run(&RepositoryRevision::new(REPO, "main"), &request(), &scope)
            .await;

        assert!(matches!(outcome, ShardOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_reports_timeout() {
        let (resolver, engine) = setup();
        engine.configure(REPO, MockEngineResponse::Hang);

        let scope = ShardScope::new(
            CancellationToken::new(),
            Some(Instant::now() + Duration::from_secs(5)),
        );
        let outcome = worker(&resolver, &engine, 0)
            .run(&RepositoryRevision::new(REPO, "main"), &request(), &scope)
            .await;

        assert!(matches!(outcome, ShardOutcome::Failed(ShardError::Timeout)));
    }

    #[tokio::test]
    async fn test_transport_error_after_cancel_is_attributed_to_cancel() {
        let scope = scope();
        scope.cancel();
        let err = scope.attribute(ShardError::Transport("connection reset".to_string()));
        assert!(matches!(err, ShardError::Cancelled));
    }
}
