//! Repository and revision identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One repository pinned to a revision specifier; the unit of fan-out.
///
/// The same repository may appear several times with different revisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryRevision {
    /// Repository name, e.g. `github.com/acme/widgets`
    pub repo: String,
    /// Branch, tag or raw revision. Empty means the default branch.
    #[serde(default)]
    pub rev: String,
}

impl RepositoryRevision {
    /// Create a new repository revision.
    pub fn new(repo: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            rev: rev.into(),
        }
    }
}

impl fmt::Display for RepositoryRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rev.is_empty() {
            write!(f, "{}", self.repo)
        } else {
            write!(f, "{}@{}", self.repo, self.rev)
        }
    }
}

/// Concrete commit identifier returned by a revision resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
