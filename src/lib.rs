//! Codemod coordinator
//!
//! Runs one structural find-and-replace request against many repository
//! revisions at once and merges the results.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use codemod::testing::{MockEngine, MockResolver};
//! use codemod::{Coordinator, CoordinatorConfig, RepositoryRevision, TransformationRequest};
//!
//! # async fn run() -> Result<(), codemod::Error> {
//! let coordinator = Coordinator::new(
//!     Arc::new(MockResolver::new()),
//!     Arc::new(MockEngine::new()),
//!     CoordinatorConfig::default(),
//! );
//!
//! let request = TransformationRequest::new("fmt.Sprintf(\"%d\", :[x])", "strconv.Itoa(:[x])")
//!     .with_file_extension(".go")
//!     .with_limit(100);
//! let revisions = [RepositoryRevision::new("github.com/acme/api", "main")];
//!
//! let output = coordinator.transform(&request, &revisions, None).await?;
//! println!("{} files rewritten", output.results.len());
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod decode;
pub mod error;
pub mod merge;
pub mod resolver;
pub mod shard;
pub mod testing;
pub mod transport;
pub mod types;

// Re-exports
pub use config::{Config, ConfigError, CoordinatorConfig};
pub use coordinator::Coordinator;
pub use error::{Error, ResolveError, ShardError, UpstreamError};
pub use resolver::{GitResolver, ResolveOptions, RevisionResolver};
pub use transport::{HttpRewriteEngine, RewriteEngine, RewriteParams};
pub use types::{
    AggregateStats, CodemodJob, CodemodResults, CommitId, FileRewriteResult, InPlaceSubstitution,
    RepositoryRevision, TransformationRequest,
};
