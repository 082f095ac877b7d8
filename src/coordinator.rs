//! Scatter/gather coordination of one codemod request.
//!
//! One task per repository revision, all bound to a shared cancellable scope.
//! Every outcome goes through the [`OutcomeClassifier`]; the first fatal one
//! cancels the scope, and the request then fails as a whole with no partial
//! results. Otherwise the per-shard lists are merged under the global limit
//! once every task has joined.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::classifier::{OutcomeClassifier, Verdict};
use crate::config::CoordinatorConfig;
use crate::error::{Error, ShardError};
use crate::merge::merge_limited;
use crate::resolver::RevisionResolver;
use crate::shard::{ShardOutcome, ShardScope, ShardWorker};
use crate::transport::RewriteEngine;
use crate::types::{CodemodResults, RepositoryRevision, TransformationRequest};

/// Runs codemod requests across many repository revisions.
#[derive(Clone)]
pub struct Coordinator {
    worker: ShardWorker,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator over the given collaborators.
    pub fn new(
        resolver: Arc<dyn RevisionResolver>,
        engine: Arc<dyn RewriteEngine>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            worker: ShardWorker::new(resolver, engine, config.shard_result_limit),
            config,
        }
    }

    /// Get the coordinator configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run `request` against every revision in `revisions`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal shard error, wrapped with the offending
    /// repository revision. No results are returned in that case, even from
    /// shards that succeeded.
    pub async fn transform(
        &self,
        request: &TransformationRequest,
        revisions: &[RepositoryRevision],
        deadline: Option<Duration>,
    ) -> Result<CodemodResults, Error> {
        self.transform_with_cancel(request, revisions, deadline, &CancellationToken::new())
            .await
    }

    /// Like [`transform`](Self::transform), bound to the caller's own
    /// cancellation token.
    ///
    /// # Errors
    ///
    /// As `transform`, plus [`Error::Cancelled`] when `parent` is cancelled
    /// before a fatal error was recorded.
    pub async fn transform_with_cancel(
        &self,
        request: &TransformationRequest,
        revisions: &[RepositoryRevision],
        deadline: Option<Duration>,
        parent: &CancellationToken,
    ) -> Result<CodemodResults, Error> {
        let span = info_span!(
            "codemod",
            request_id = %Uuid::new_v4(),
            pattern = %request.match_template,
            replace = %request.rewrite_template,
            num_repo_revs = revisions.len(),
        );
        self.run(request, revisions, deadline, parent)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        request: &TransformationRequest,
        revisions: &[RepositoryRevision],
        deadline: Option<Duration>,
        parent: &CancellationToken,
    ) -> Result<CodemodResults, Error> {
        let token = parent.child_token();
        // cancel stragglers on every exit path
        let _cancel_on_exit = token.clone().drop_guard();

        // a deadline past the clock's range means no deadline
        let deadline = deadline.and_then(|d| Instant::now().checked_add(d));
        let scope = ShardScope::new(token, deadline);
        let classifier = Arc::new(Mutex::new(OutcomeClassifier::new()));
        let semaphore = (self.config.max_concurrent_shards > 0)
            .then(|| Arc::new(Semaphore::new(self.config.max_concurrent_shards)));
        let request = Arc::new(request.clone());

        let mut tasks = JoinSet::new();
        for (index, repo_rev) in revisions.iter().cloned().enumerate() {
            let worker = self.worker.clone();
            let scope = scope.clone();
            let classifier = Arc::clone(&classifier);
            let semaphore = semaphore.clone();
            let request = Arc::clone(&request);
            let span = info_span!("codemod_shard", repo = %repo_rev.repo, rev = %repo_rev.rev);

            tasks.spawn(
                async move {
                    let outcome = AssertUnwindSafe(run_shard(
                        &worker,
                        &repo_rev,
                        &request,
                        &scope,
                        semaphore.as_ref(),
                    ))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        ShardOutcome::Failed(ShardError::Transport("shard task panicked".to_string()))
                    });

                    let verdict = classifier
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .report(index, &repo_rev, outcome);
                    if verdict == Verdict::Fatal {
                        scope.cancel();
                    }
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "codemod shard task did not complete");
            }
        }

        let classifier = std::mem::take(&mut *classifier.lock().unwrap_or_else(|e| e.into_inner()));
        if parent.is_cancelled() && !classifier.is_cancelling() {
            return Err(Error::Cancelled);
        }

        let (shards, mut stats) = classifier.finish()?;
        let merged = merge_limited(shards, request.limit);
        stats.limit_hit = merged.limit_hit;

        info!(
            results = merged.items.len(),
            limit_hit = stats.limit_hit,
            timed_out = stats.timed_out.len(),
            missing = stats.missing.len(),
            "codemod finished"
        );

        Ok(CodemodResults {
            results: merged.items,
            stats,
        })
    }
}

/// Wait for a fan-out slot, then run the shard. Waiting is bound to the scope
/// so queued shards abort as soon as it ends.
async fn run_shard(
    worker: &ShardWorker,
    repo_rev: &RepositoryRevision,
    request: &TransformationRequest,
    scope: &ShardScope,
    semaphore: Option<&Arc<Semaphore>>,
) -> ShardOutcome {
    let _permit = match semaphore {
        Some(semaphore) => match scope.guard(Arc::clone(semaphore).acquire_owned()).await {
            Ok(Ok(permit)) => Some(permit),
            Ok(Err(_closed)) => return ShardOutcome::Cancelled,
            Err(ShardError::Cancelled) => return ShardOutcome::Cancelled,
            Err(err) => return ShardOutcome::Failed(err),
        },
        None => None,
    };
    worker.run(repo_rev, request, scope).await
}
