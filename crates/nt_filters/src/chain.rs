use std::sync::Arc;

use nt_core::storage::DEFAULT_RADIUS_KM;
use nt_core::{
    Article, ArticleStorage, Error, InferenceModel, Intent, Location, RequestContext, Result,
};
use tracing::{debug, info, warn, Instrument};

use crate::filters::{
    CandidateSet, CategoryFilter, Filter, GeoRadiusFilter, ScoreFilter, SourceFilter,
    TextSimilarityFilter,
};

/// Relevance floor applied as the last stage of every chain.
pub const DEFAULT_SCORE_FLOOR: f64 = 0.7;

/// Turns query intents into an ordered list of filters and runs them.
pub struct FilterChain {
    storage: Arc<dyn ArticleStorage>,
    model: Arc<dyn InferenceModel>,
    score_floor: f64,
}

impl FilterChain {
    pub fn new(storage: Arc<dyn ArticleStorage>, model: Arc<dyn InferenceModel>) -> Self {
        Self {
            storage,
            model,
            score_floor: DEFAULT_SCORE_FLOOR,
        }
    }

    pub fn with_score_floor(mut self, floor: f64) -> Self {
        self.score_floor = floor;
        self
    }

    /// Resolve the stages for a request without running them.
    ///
    /// Intent stages come first, in intent order, then entity similarity,
    /// then the relevance floor.
    pub fn plan(
        &self,
        intents: &[Intent],
        entities: &[String],
        location: Option<Location>,
    ) -> Vec<Box<dyn Filter>> {
        let mut stages: Vec<Box<dyn Filter>> = Vec::with_capacity(intents.len() + 2);

        for intent in intents {
            match intent {
                Intent::Category { values } => {
                    stages.push(Box::new(CategoryFilter::new(self.storage.clone(), values.clone())));
                }
                Intent::Source { values } => {
                    stages.push(Box::new(SourceFilter::new(self.storage.clone(), values.clone())));
                }
                Intent::Score { threshold } => {
                    stages.push(Box::new(ScoreFilter::new(
                        self.storage.clone(),
                        threshold.unwrap_or(self.score_floor),
                    )));
                }
                Intent::Nearby { radius_km, .. } => {
                    let Some(location) = location else {
                        warn!(intent = %intent.kind(), "Skipping nearby intent: request has no location");
                        continue;
                    };
                    let center = intent.nearby_point().unwrap_or(location);
                    stages.push(Box::new(GeoRadiusFilter::new(
                        self.storage.clone(),
                        center,
                        radius_km.unwrap_or(DEFAULT_RADIUS_KM),
                    )));
                }
                Intent::Search { query } => {
                    stages.push(Box::new(TextSimilarityFilter::new(
                        self.storage.clone(),
                        self.model.clone(),
                        query.join(" "),
                    )));
                }
                Intent::Unknown => {
                    warn!(intent = %intent.kind(), "Skipping unrecognised intent");
                }
            }
        }

        let entity_query = entities
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !entity_query.is_empty() {
            stages.push(Box::new(TextSimilarityFilter::new(
                self.storage.clone(),
                self.model.clone(),
                entity_query,
            )));
        }

        stages.push(Box::new(ScoreFilter::floor(self.storage.clone(), self.score_floor)));
        stages
    }

    /// Stage names in execution order, for logging and tests.
    pub fn describe(&self, intents: &[Intent], entities: &[String], location: Option<Location>) -> Vec<&'static str> {
        self.plan(intents, entities, location)
            .iter()
            .map(|stage| stage.name())
            .collect()
    }

    pub async fn execute(
        &self,
        ctx: &RequestContext,
        intents: &[Intent],
        entities: &[String],
        location: Option<Location>,
    ) -> Result<Vec<Article>> {
        if intents.is_empty() && entities.is_empty() && location.is_none() {
            debug!("No intents, entities or location: returning all articles");
            return ctx
                .guard("article fetch", self.storage.find_all())
                .await
                .map_err(|e| Error::retrieval("fetch_all", e));
        }

        let stages = self.plan(intents, entities, location);
        info!(
            stages = ?stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "🔎 Running filter chain"
        );

        let mut candidates = CandidateSet::Unbounded;
        for stage in &stages {
            let name = stage.name();
            candidates = stage
                .apply(ctx, candidates)
                .instrument(tracing::debug_span!(parent: ctx.span(), "filter", stage = name))
                .await
                .map_err(|e| {
                    warn!(stage = name, error = %e, "Filter stage failed");
                    Error::retrieval(name, e)
                })?;
            if let CandidateSet::Bounded(articles) = &candidates {
                debug!(stage = name, remaining = articles.len(), "Filter stage done");
            }
        }

        match candidates {
            CandidateSet::Bounded(articles) => Ok(articles),
            CandidateSet::Unbounded => ctx
                .guard("article fetch", self.storage.find_all())
                .await
                .map_err(|e| Error::retrieval("fetch_all", e)),
        }
    }
}
