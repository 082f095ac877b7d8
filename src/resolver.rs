//! Revision resolution.
//!
//! The shard worker resolves once per repository revision, so resolution must
//! stay cheap: it never triggers a fetch or a clone. A repository that is not
//! available locally is reported as missing rather than synced on demand.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ResolveError;
use crate::types::CommitId;

/// Marker file left in a repository directory while it is being cloned.
pub const CLONING_MARKER: &str = ".codemod-cloning";

/// Options for a single resolve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveOptions {
    /// Fail fast instead of fetching a revision that is not available locally.
    pub no_ensure_revision: bool,
}

/// Maps a revision specifier to a concrete commit.
#[async_trait]
pub trait RevisionResolver: Send + Sync {
    /// Resolve `rev` in `repo`. An empty `rev` means the default branch.
    async fn resolve(
        &self,
        repo: &str,
        rev: &str,
        opts: ResolveOptions,
    ) -> Result<CommitId, ResolveError>;
}

/// Resolves revisions against repositories stored under a local directory.
///
/// `<repos_dir>/<repo>` and `<repos_dir>/<repo>.git` are both accepted.
#[derive(Debug, Clone)]
pub struct GitResolver {
    repos_dir: PathBuf,
}

impl GitResolver {
    pub fn new(repos_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
        }
    }

    /// Directory of `repo` under the root. Names that are absolute or that
    /// step outside the root never match.
    fn repo_dir(&self, repo: &str) -> Option<PathBuf> {
        let name = Path::new(repo);
        let contained = name.components().next().is_some()
            && name.components().all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return None;
        }

        let plain = self.repos_dir.join(name);
        if plain.is_dir() {
            return Some(plain);
        }
        let bare = self.repos_dir.join(format!("{repo}.git"));
        bare.is_dir().then_some(bare)
    }
}

#[async_trait]
impl RevisionResolver for GitResolver {
    async fn resolve(
        &self,
        repo: &str,
        rev: &str,
        opts: ResolveOptions,
    ) -> Result<CommitId, ResolveError> {
        let dir = self
            .repo_dir(repo)
            .ok_or_else(|| ResolveError::RepoNotFound(repo.to_string()))?;

        if dir.join(CLONING_MARKER).exists() {
            return Err(ResolveError::CloneInProgress(repo.to_string()));
        }

        // rev-parse reads local objects only; nothing here fetches.
        debug!(repo, rev, no_ensure_revision = opts.no_ensure_revision, "resolving revision");

        let spec = if rev.is_empty() { "HEAD" } else { rev };
        let output = rev_parse(&dir, spec).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("ambiguous") {
                return Err(ResolveError::Ambiguous {
                    repo: repo.to_string(),
                    rev: rev.to_string(),
                });
            }
            return Err(ResolveError::RevisionNotFound {
                repo: repo.to_string(),
                rev: rev.to_string(),
            });
        }

        let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if commit.is_empty() {
            return Err(ResolveError::RevisionNotFound {
                repo: repo.to_string(),
                rev: rev.to_string(),
            });
        }
        Ok(CommitId(commit))
    }
}

async fn rev_parse(dir: &Path, spec: &str) -> Result<std::process::Output, ResolveError> {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir)
        .args(["rev-parse", "--verify", "--quiet"])
        .arg(format!("{spec}^{{commit}}"))
        .kill_on_drop(true);
    Ok(cmd.output().await?)
}
