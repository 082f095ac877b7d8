//! Rewrite requests and per-file rewrite results.

use serde::{Deserialize, Serialize};

use super::repos::CommitId;
use super::stats::AggregateStats;

/// What to rewrite, shared by every shard of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationRequest {
    /// Pattern to find
    pub match_template: String,
    /// Text or transform to apply to each match
    pub rewrite_template: String,
    /// Restrict the rewrite to files with this extension, e.g. `.go`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    /// Global result limit; zero or negative means unlimited
    #[serde(default)]
    pub limit: i64,
}

impl TransformationRequest {
    /// Create a request with no extension filter and no limit.
    pub fn new(match_template: impl Into<String>, rewrite_template: impl Into<String>) -> Self {
        Self {
            match_template: match_template.into(),
            rewrite_template: rewrite_template.into(),
            file_extension: None,
            limit: 0,
        }
    }

    #[must_use]
    pub fn with_file_extension(mut self, ext: impl Into<String>) -> Self {
        self.file_extension = Some(ext.into());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Half-open offset range in the original file plus its replacement.
///
/// Offsets are only meaningful to the transformation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InPlaceSubstitution {
    pub start: i64,
    pub end: i64,
    pub replacement: String,
}

/// One rewritten file within a resolved commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRewriteResult {
    /// Repository the file belongs to
    pub repo: String,
    /// Revision specifier the caller asked for
    pub rev: String,
    /// Commit the revision resolved to
    pub commit: CommitId,
    /// File path within the repository
    pub path: String,
    /// Display identifier, see [`file_match_uri`]
    pub uri: String,
    /// Full rewritten file contents, when the engine sent them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_source: Option<String>,
    /// Ordered substitutions; never empty
    pub substitutions: Vec<InPlaceSubstitution>,
    /// Unified diff, when the engine sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl FileRewriteResult {
    /// Build a result, or `None` when there is nothing to substitute.
    ///
    /// A file that was scanned without producing a change is not a result.
    pub fn new(
        repo: &str,
        rev: &str,
        commit: CommitId,
        path: String,
        rewritten_source: Option<String>,
        substitutions: Vec<InPlaceSubstitution>,
        diff: Option<String>,
    ) -> Option<Self> {
        if substitutions.is_empty() {
            return None;
        }
        Some(Self {
            repo: repo.to_string(),
            rev: rev.to_string(),
            commit,
            uri: file_match_uri(repo, rev, &path),
            path,
            rewritten_source,
            substitutions,
            diff,
        })
    }
}

/// Display identifier for a file at a revision: `git://{repo}?{rev}#{path}`.
///
/// The `?{rev}` part is left out when `rev` is empty. Repository and path are
/// written as given; only the revision is escaped, so that a `#` in it cannot
/// be mistaken for the start of the path.
pub fn file_match_uri(repo: &str, rev: &str, path: &str) -> String {
    let mut uri = format!("git://{repo}");
    if !rev.is_empty() {
        uri.push('?');
        uri.push_str(&escape_rev(rev));
    }
    uri.push('#');
    uri.push_str(path);
    uri
}

fn escape_rev(rev: &str) -> String {
    match reqwest::Url::parse("git://rev") {
        Ok(mut url) => {
            url.set_query(Some(rev));
            url.query().unwrap_or(rev).to_string()
        }
        Err(_) => rev.to_string(),
    }
}

/// Successful outcome of one coordinator invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodemodResults {
    pub results: Vec<FileRewriteResult>,
    pub stats: AggregateStats,
}
