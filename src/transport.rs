//! HTTP transport for the transformation engine.
//!
//! The engine is a stateless, read-style service: one GET per repository
//! revision, answered with a stream of rewrite records. Retrying is left to
//! callers; a failed call is reported once.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::decode::RecordStream;
use crate::error::{Error, ShardError, UpstreamError};
use crate::types::CommitId;

/// Parameters of one rewrite call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteParams {
    pub repo: String,
    pub commit: CommitId,
    pub match_template: String,
    pub rewrite_template: String,
    pub file_extension: Option<String>,
}

/// A service that computes rewrites for one repository commit.
#[async_trait]
pub trait RewriteEngine: Send + Sync {
    /// Start a rewrite and return its records as a lazy stream.
    ///
    /// Status errors are reported here; record errors surface while the
    /// stream is being read.
    async fn rewrite(&self, params: &RewriteParams) -> Result<RecordStream, ShardError>;
}

/// Transformation engine reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRewriteEngine {
    base_url: Url,
    client: Client,
}

impl HttpRewriteEngine {
    /// Create a new engine client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Engine URL, e.g. `http://replacer:3185`
    /// * `timeout` - Per-request timeout covering the whole response, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or the HTTP client cannot
    /// be created.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Http(format!("invalid replacer URL {base_url}: {e}")))?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self { base_url, client })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the request URL for a rewrite call.
    #[must_use]
    pub fn request_url(&self, params: &RewriteParams) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("repo", &params.repo)
                .append_pair("commit", params.commit.as_str())
                .append_pair("matchtemplate", &params.match_template)
                .append_pair("rewritetemplate", &params.rewrite_template);
            if let Some(ext) = &params.file_extension {
                query.append_pair("fileextension", ext);
            }
        }
        url
    }
}

#[async_trait]
impl RewriteEngine for HttpRewriteEngine {
    async fn rewrite(&self, params: &RewriteParams) -> Result<RecordStream, ShardError> {
        let url = self.request_url(params);
        debug!(%url, "codemod request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.map_err(transport_error)?;
            return Err(UpstreamError::new(status.as_u16(), body).into());
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(transport_error))
            .boxed();
        Ok(RecordStream::new(bytes))
    }
}

fn transport_error(err: reqwest::Error) -> ShardError {
    if err.is_timeout() {
        ShardError::Timeout
    } else {
        ShardError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RewriteParams {
        RewriteParams {
            repo: "github.com/acme/widgets".to_string(),
            commit: CommitId::from("0123abcd"),
            match_template: "fmt.Println(:[args])".to_string(),
            rewrite_template: "log.Println(:[args])".to_string(),
            file_extension: Some(".go".to_string()),
        }
    }

    #[test]
    fn test_request_url_carries_all_parameters() {
        let engine = HttpRewriteEngine::new("http://replacer:3185", None).expect("engine");
        let url = engine.request_url(&params());

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("repo".to_string(), "github.com/acme/widgets".to_string()),
                ("commit".to_string(), "0123abcd".to_string()),
                ("matchtemplate".to_string(), "fmt.Println(:[args])".to_string()),
                ("rewritetemplate".to_string(), "log.Println(:[args])".to_string()),
                ("fileextension".to_string(), ".go".to_string()),
            ]
        );
        assert_eq!(url.host_str(), Some("replacer"));
        assert_eq!(url.port(), Some(3185));
        assert_eq!(url.path(), engine.base_url().path());
        assert!(engine.base_url().query().is_none());
    }

    #[test]
    fn test_request_url_omits_missing_extension() {
        let engine = HttpRewriteEngine::new("http://replacer:3185", None).expect("engine");
        let url = engine.request_url(&RewriteParams {
            file_extension: None,
            ..params()
        });

        assert!(url.query_pairs().all(|(k, _)| k != "fileextension"));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = HttpRewriteEngine::new("not a url", None);
        assert!(matches!(result, Err(Error::Http(_))));
    }
}
