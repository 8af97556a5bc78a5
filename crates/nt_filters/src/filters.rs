use std::sync::Arc;

use async_trait::async_trait;
use nt_core::ordering;
use nt_core::{
    cosine_similarity, Article, ArticleStorage, Error, InferenceModel, Location, RequestContext,
    Result,
};
use tracing::debug;

/// Articles flowing between stages.
///
/// `Unbounded` means nothing has been fetched yet: the next stage queries
/// storage itself. `Bounded` is a concrete working set, possibly empty, that
/// later stages only ever narrow or reorder.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateSet {
    Unbounded,
    Bounded(Vec<Article>),
}

impl CandidateSet {
    pub fn is_bounded(&self) -> bool {
        matches!(self, CandidateSet::Bounded(_))
    }

    pub fn into_articles(self) -> Option<Vec<Article>> {
        match self {
            CandidateSet::Unbounded => None,
            CandidateSet::Bounded(articles) => Some(articles),
        }
    }
}

impl From<Vec<Article>> for CandidateSet {
    fn from(articles: Vec<Article>) -> Self {
        CandidateSet::Bounded(articles)
    }
}

/// One retrieval stage.
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, ctx: &RequestContext, candidates: CandidateSet) -> Result<CandidateSet>;
}

pub struct CategoryFilter {
    storage: Arc<dyn ArticleStorage>,
    categories: Vec<String>,
}

impl CategoryFilter {
    pub fn new(storage: Arc<dyn ArticleStorage>, categories: Vec<String>) -> Self {
        Self { storage, categories }
    }
}

#[async_trait]
impl Filter for CategoryFilter {
    fn name(&self) -> &'static str {
        "category"
    }

    async fn apply(&self, ctx: &RequestContext, candidates: CandidateSet) -> Result<CandidateSet> {
        if self.categories.is_empty() {
            return Ok(candidates);
        }
        let articles = match candidates {
            CandidateSet::Bounded(mut articles) => {
                articles.retain(|a| a.has_any_category(&self.categories));
                ordering::by_recency(&mut articles);
                articles
            }
            CandidateSet::Unbounded => {
                ctx.guard("category query", self.storage.filter_by_category(&self.categories))
                    .await?
            }
        };
        Ok(articles.into())
    }
}

pub struct SourceFilter {
    storage: Arc<dyn ArticleStorage>,
    sources: Vec<String>,
}

impl SourceFilter {
    pub fn new(storage: Arc<dyn ArticleStorage>, sources: Vec<String>) -> Self {
        Self { storage, sources }
    }
}

#[async_trait]
impl Filter for SourceFilter {
    fn name(&self) -> &'static str {
        "source"
    }

    async fn apply(&self, ctx: &RequestContext, candidates: CandidateSet) -> Result<CandidateSet> {
        if self.sources.is_empty() {
            return Ok(candidates);
        }
        let articles = match candidates {
            CandidateSet::Bounded(mut articles) => {
                articles.retain(|a| a.matches_source(&self.sources, false));
                ordering::by_recency(&mut articles);
                articles
            }
            CandidateSet::Unbounded => {
                ctx.guard("source query", self.storage.filter_by_source(&self.sources))
                    .await?
            }
        };
        Ok(articles.into())
    }
}

pub struct ScoreFilter {
    storage: Arc<dyn ArticleStorage>,
    threshold: f64,
    keep_order: bool,
}

impl ScoreFilter {
    /// Relevance threshold stage; output ordered by relevance, highest first.
    pub fn new(storage: Arc<dyn ArticleStorage>, threshold: f64) -> Self {
        Self {
            storage,
            threshold,
            keep_order: false,
        }
    }

    /// Quality floor: drops low-relevance articles but keeps the upstream ranking.
    pub fn floor(storage: Arc<dyn ArticleStorage>, threshold: f64) -> Self {
        Self {
            storage,
            threshold,
            keep_order: true,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[async_trait]
impl Filter for ScoreFilter {
    fn name(&self) -> &'static str {
        if self.keep_order {
            "score_floor"
        } else {
            "score"
        }
    }

    async fn apply(&self, ctx: &RequestContext, candidates: CandidateSet) -> Result<CandidateSet> {
        let articles = match candidates {
            CandidateSet::Bounded(mut articles) => {
                articles.retain(|a| a.relevance_score >= self.threshold);
                if !self.keep_order {
                    ordering::by_relevance(&mut articles);
                }
                articles
            }
            CandidateSet::Unbounded => {
                ctx.guard("score query", self.storage.filter_by_score(self.threshold))
                    .await?
            }
        };
        Ok(articles.into())
    }
}

pub struct GeoRadiusFilter {
    storage: Arc<dyn ArticleStorage>,
    center: Location,
    radius_km: f64,
}

impl GeoRadiusFilter {
    pub fn new(storage: Arc<dyn ArticleStorage>, center: Location, radius_km: f64) -> Self {
        Self {
            storage,
            center,
            radius_km,
        }
    }
}

#[async_trait]
impl Filter for GeoRadiusFilter {
    fn name(&self) -> &'static str {
        "geo_radius"
    }

    async fn apply(&self, ctx: &RequestContext, candidates: CandidateSet) -> Result<CandidateSet> {
        // (0, 0) means no location was supplied.
        if self.center.is_unset() {
            return Ok(candidates);
        }
        let articles = match candidates {
            CandidateSet::Bounded(mut articles) => {
                articles.retain(|a| a.distance_to(&self.center) <= self.radius_km);
                ordering::by_distance(&mut articles, &self.center);
                articles
            }
            CandidateSet::Unbounded => {
                ctx.guard(
                    "radius query",
                    self.storage.filter_by_radius(self.center, self.radius_km),
                )
                .await?
            }
        };
        Ok(articles.into())
    }
}

pub struct TextSimilarityFilter {
    storage: Arc<dyn ArticleStorage>,
    model: Arc<dyn InferenceModel>,
    query: String,
}

impl TextSimilarityFilter {
    pub fn new(storage: Arc<dyn ArticleStorage>, model: Arc<dyn InferenceModel>, query: impl Into<String>) -> Self {
        Self {
            storage,
            model,
            query: query.into(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Score articles against a query embedding, most similar first.
    /// Articles without an embedding of the query's size are dropped.
    pub fn rank(query_embedding: &[f32], articles: Vec<Article>) -> Vec<(Article, f32)> {
        let mut scored: Vec<(Article, f32)> = articles
            .into_iter()
            .filter_map(|article| {
                let embedding = article
                    .usable_embedding()
                    .filter(|e| e.len() == query_embedding.len())?;
                let similarity = cosine_similarity(query_embedding, embedding);
                Some((article, similarity))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
    }
}

#[async_trait]
impl Filter for TextSimilarityFilter {
    fn name(&self) -> &'static str {
        "text_similarity"
    }

    async fn apply(&self, ctx: &RequestContext, candidates: CandidateSet) -> Result<CandidateSet> {
        if self.query.trim().is_empty() {
            return Ok(candidates);
        }

        let query_embedding = ctx
            .guard("query embedding", self.model.generate_embedding(&self.query))
            .await?;
        if query_embedding.is_empty() {
            return Err(Error::Inference(format!(
                "empty embedding for query '{}'",
                self.query
            )));
        }

        let articles = match candidates {
            CandidateSet::Bounded(articles) => articles,
            CandidateSet::Unbounded => ctx.guard("article fetch", self.storage.find_all()).await?,
        };
        let considered = articles.len();
        let ranked = Self::rank(&query_embedding, articles);
        debug!(
            query = %self.query,
            considered,
            ranked = ranked.len(),
            top = ranked.first().map(|(_, s)| *s),
            "Similarity ranking"
        );

        Ok(ranked
            .into_iter()
            .map(|(article, _)| article)
            .collect::<Vec<_>>()
            .into())
    }
}
