//! Testing utilities.
//!
//! Provides mock collaborators for exercising the coordinator without a
//! running transformation engine or local repositories.

mod mock;

pub use mock::{
    rewrite_record, MockCall, MockEngine, MockEngineResponse, MockResolution, MockResolver,
};
