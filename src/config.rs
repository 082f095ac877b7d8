use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default transformation engine URL.
pub const DEFAULT_REPLACER_URL: &str = "http://replacer:3185";

/// Default per-request timeout of the engine client, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default root of locally available repositories.
pub const DEFAULT_REPOS_DIR: &str = "/data/repos";

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Transformation engine base URL
    pub replacer_url: String,
    /// Per-request timeout for engine calls (None = no timeout)
    pub request_timeout: Option<Duration>,
    /// Directory holding locally available repositories
    pub repos_dir: PathBuf,
    /// Deadline applied to a job that does not carry its own (None = no deadline)
    pub default_timeout: Option<Duration>,
    /// Fan-out and per-shard limits
    pub coordinator: CoordinatorConfig,
}

/// Settings that shape a single coordinator invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Maximum shards in flight at once (0 = unbounded)
    pub max_concurrent_shards: usize,
    /// Maximum results a single shard may contribute (0 = unlimited)
    pub shard_result_limit: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let replacer_url =
            env::var("REPLACER_URL").unwrap_or_else(|_| DEFAULT_REPLACER_URL.to_string());
        if reqwest::Url::parse(&replacer_url).is_err() {
            return Err(ConfigError::InvalidValue("REPLACER_URL"));
        }

        let request_timeout_secs: u64 = env::var("CODEMOD_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_REQUEST_TIMEOUT_SECS.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("CODEMOD_REQUEST_TIMEOUT_SECS"))?;

        let max_concurrent_shards = env::var("CODEMOD_MAX_CONCURRENT_SHARDS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("CODEMOD_MAX_CONCURRENT_SHARDS"))?;

        let shard_result_limit = env::var("CODEMOD_SHARD_RESULT_LIMIT")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("CODEMOD_SHARD_RESULT_LIMIT"))?;

        let repos_dir = env::var("CODEMOD_REPOS_DIR")
            .unwrap_or_else(|_| DEFAULT_REPOS_DIR.to_string())
            .into();

        let default_timeout_secs: u64 = env::var("CODEMOD_DEFAULT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("CODEMOD_DEFAULT_TIMEOUT_SECS"))?;

        Ok(Self {
            replacer_url,
            request_timeout: secs_or_none(request_timeout_secs),
            repos_dir,
            default_timeout: secs_or_none(default_timeout_secs),
            coordinator: CoordinatorConfig {
                max_concurrent_shards,
                shard_result_limit,
            },
        })
    }
}

fn secs_or_none(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
