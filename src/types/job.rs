//! Job documents accepted by the command-line entry point.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::repos::RepositoryRevision;
use super::rewrite::TransformationRequest;

/// A codemod request together with the revisions it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodemodJob {
    #[serde(flatten)]
    pub request: TransformationRequest,
    /// Deadline for the whole job, in seconds; zero or absent falls back to
    /// the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub repos: Vec<RepositoryRevision>,
}

impl CodemodJob {
    /// Parse a job from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The deadline to run under, given the configured default.
    #[must_use]
    pub fn deadline(&self, default: Option<Duration>) -> Option<Duration> {
        match self.timeout_secs {
            Some(secs) if secs > 0 => Some(Duration::from_secs(secs)),
            _ => default,
        }
    }
}
