//! Outcome classification.
//!
//! Decides for each shard outcome whether it is fatal to the whole request
//! or only a diagnostic, and folds it into the invocation's accumulator.
//!
//! Policy:
//! - repository missing, revision missing, still cloning, timed out: recorded
//!   in [`AggregateStats`]; the shard contributes no results.
//! - upstream status errors, decode errors, transport errors and any other
//!   resolver failure: fatal. The first one is kept; later ones are ignored.
//! - cancelled shards: nothing is recorded.

use tracing::{error, warn};

use crate::error::{Error, ResolveError, ShardError};
use crate::shard::ShardOutcome;
use crate::types::{AggregateStats, FileRewriteResult, RepositoryRevision};

/// Whether an outcome aborts the whole request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    NonFatal,
    Fatal,
}

/// Accumulator for one invocation: stats, the fatal slot and the results of
/// successful shards keyed by their input position.
#[derive(Debug, Default)]
pub struct OutcomeClassifier {
    stats: AggregateStats,
    fatal: Option<Error>,
    collected: Vec<(usize, Vec<FileRewriteResult>)>,
}

impl OutcomeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a fatal outcome has been recorded.
    #[must_use]
    pub fn is_cancelling(&self) -> bool {
        self.fatal.is_some()
    }

    /// Fold one shard's outcome in. `index` is the shard's input position.
    pub fn report(
        &mut self,
        index: usize,
        repo_rev: &RepositoryRevision,
        outcome: ShardOutcome,
    ) -> Verdict {
        if self.is_cancelling() {
            return Verdict::NonFatal;
        }

        match outcome {
            ShardOutcome::Success { results, limit_hit } => {
                self.stats.searched.insert(repo_rev.clone());
                if limit_hit {
                    self.stats.limit_hit_repos.insert(repo_rev.clone());
                }
                if !results.is_empty() {
                    self.collected.push((index, results));
                }
                Verdict::NonFatal
            }
            ShardOutcome::Cancelled => Verdict::NonFatal,
            ShardOutcome::Failed(err) => self.report_failure(repo_rev, err),
        }
    }

    fn report_failure(&mut self, repo_rev: &RepositoryRevision, err: ShardError) -> Verdict {
        if is_fatal(&err) {
            error!(repo = %repo_rev, error = %err, retryable = err.is_retryable(), "codemod shard failed fatally");
            self.fatal = Some(Error::Shard {
                repo: repo_rev.to_string(),
                source: err,
            });
            return Verdict::Fatal;
        }

        let stats = &mut self.stats;
        match &err {
            ShardError::Cancelled => return Verdict::NonFatal,
            ShardError::Resolve(ResolveError::RevisionNotFound { .. }) if repo_rev.rev.is_empty() => {
                // no input revision: the repository is empty
            }
            ShardError::Resolve(ResolveError::CloneInProgress(_)) => {
                stats.cloning.insert(repo_rev.clone());
            }
            ShardError::Timeout => {
                stats.timed_out.insert(repo_rev.clone());
            }
            _ => {
                stats.missing.insert(repo_rev.clone());
            }
        }

        warn!(repo = %repo_rev, error = %err, timeout = err.is_timeout(), retryable = err.is_retryable(), "codemod shard skipped");
        stats.searched.insert(repo_rev.clone());
        Verdict::NonFatal
    }

    /// The first fatal error, or the collected results and stats.
    pub fn finish(self) -> Result<(Vec<(usize, Vec<FileRewriteResult>)>, AggregateStats), Error> {
        match self.fatal {
            Some(err) => Err(err),
            None => Ok((self.collected, self.stats)),
        }
    }
}

/// Errors that abort the whole request.
fn is_fatal(err: &ShardError) -> bool {
    match err {
        ShardError::Resolve(ResolveError::RevisionNotFound { .. })
        | ShardError::Resolve(ResolveError::RepoNotFound(_))
        | ShardError::Resolve(ResolveError::CloneInProgress(_))
        | ShardError::Timeout
        | ShardError::Cancelled => false,
        ShardError::Resolve(ResolveError::Ambiguous { .. })
        | ShardError::Resolve(ResolveError::Io(_))
        | ShardError::Upstream(_)
        | ShardError::Decode(_)
        | ShardError::Transport(_) => true,
    }
}
