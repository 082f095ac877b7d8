//! Error types for the codemod coordinator.
//!
//! Errors come in three layers:
//! - [`UpstreamError`] and [`ResolveError`] describe what an external
//!   collaborator reported.
//! - [`ShardError`] is the taxonomy a single shard can end with.
//! - [`Error`] is what a caller of the coordinator sees.

use thiserror::Error;

use crate::config::ConfigError;

/// Non-2xx response from the transformation engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("replacer returned HTTP {status}: {message}")]
pub struct UpstreamError {
    /// HTTP status code of the response.
    pub status: u16,
    /// Response body, read in full.
    pub message: String,
}

impl UpstreamError {
    /// Create a new upstream error.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is retryable (5xx or 429).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }

    /// Check if this is a non-retryable client error (4xx other than 429).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status) && self.status != 429
    }
}

/// Failure to resolve a revision specifier to a commit.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The repository exists but the revision does not.
    #[error("revision not found: {repo}@{rev}")]
    RevisionNotFound { repo: String, rev: String },

    /// The repository is not available locally.
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    /// The repository is known but still being cloned.
    #[error("repository is still cloning: {0}")]
    CloneInProgress(String),

    /// The revision names more than one object.
    #[error("ambiguous revision: {repo}@{rev}")]
    Ambiguous { repo: String, rev: String },

    /// The resolver itself failed.
    #[error("resolver IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a single shard ended, when it did not succeed.
#[derive(Error, Debug)]
pub enum ShardError {
    /// Revision resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The transformation engine answered with a non-2xx status.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// A streamed record could not be decoded.
    #[error("replacer response invalid: {0}")]
    Decode(String),

    /// Network failure not attributable to cancellation or a deadline.
    #[error("codemod request failed: {0}")]
    Transport(String),

    /// The shard's deadline elapsed.
    #[error("codemod request timed out")]
    Timeout,

    /// The shared scope was cancelled while the shard was running.
    #[error("codemod request cancelled")]
    Cancelled,
}

impl ShardError {
    /// Check if this error reports a deadline rather than a failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Check if the underlying cause could succeed on a later attempt.
    ///
    /// Retrying is left to callers; the coordinator never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_retryable(),
            Self::Transport(_) | Self::Timeout => true,
            Self::Resolve(ResolveError::CloneInProgress(_)) => true,
            _ => false,
        }
    }
}

/// Main error type returned to callers.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(String),

    /// A shard failed fatally; all results of the invocation are discarded.
    #[error("failed to call codemod {repo}: {source}")]
    Shard {
        /// Display form of the offending repository revision.
        repo: String,
        #[source]
        source: ShardError,
    },

    /// The caller cancelled the invocation.
    #[error("codemod invocation cancelled")]
    Cancelled,

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The shard error behind a fatal failure, if any.
    #[must_use]
    pub fn shard_error(&self) -> Option<&ShardError> {
        match self {
            Self::Shard { source, .. } => Some(source),
            _ => None,
        }
    }
}
