//! Orchestration layer shared by the HTTP API and the CLI.
//!
//! [`ArticleService`] owns the storage handles, the inference model and the
//! retrieval machinery, and exposes one method per user-facing operation.

pub mod service;

pub use service::{
    ArticleService, DEFAULT_TRENDING_LIMIT, MAX_TRENDING_LIMIT, QUERY_RESULT_LIMIT,
};

pub mod prelude {
    pub use super::ArticleService;
    pub use nt_core::{Article, ArticleQuery, Error, Location, RequestContext, Result};
}
