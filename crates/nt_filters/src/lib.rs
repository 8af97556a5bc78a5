//! Intent-driven retrieval pipeline.
//!
//! A [`FilterChain`] turns the intents and entities extracted from a query
//! into an ordered list of [`Filter`] stages. The first stage that runs
//! fetches from storage; every later stage narrows or reorders that set.

pub mod chain;
pub mod filters;

pub use chain::{FilterChain, DEFAULT_SCORE_FLOOR};
pub use filters::{
    CandidateSet, CategoryFilter, Filter, GeoRadiusFilter, ScoreFilter, SourceFilter,
    TextSimilarityFilter,
};
