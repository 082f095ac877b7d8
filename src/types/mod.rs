//! Data models shared by the coordinator, shard workers and callers.

mod job;
mod repos;
mod rewrite;
mod stats;

pub use job::CodemodJob;
pub use repos::{CommitId, RepositoryRevision};
pub use rewrite::{
    file_match_uri, CodemodResults, FileRewriteResult, InPlaceSubstitution, TransformationRequest,
};
pub use stats::AggregateStats;
