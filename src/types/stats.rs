//! Aggregate diagnostics collected across shards.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::repos::RepositoryRevision;

/// Diagnostics for one coordinator invocation.
///
/// None of these are errors: a request can succeed with every repository
/// timed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Shards that ran to a non-fatal end
    pub searched: BTreeSet<RepositoryRevision>,
    /// Shards whose repository or revision was not available
    pub missing: BTreeSet<RepositoryRevision>,
    /// Shards whose repository is still being cloned
    pub cloning: BTreeSet<RepositoryRevision>,
    /// Shards that hit a deadline
    pub timed_out: BTreeSet<RepositoryRevision>,
    /// Shards that stopped at the per-shard result cap
    pub limit_hit_repos: BTreeSet<RepositoryRevision>,
    /// The global limit truncated the merged output
    pub limit_hit: bool,
}

impl AggregateStats {
    /// True when nothing at all was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
