use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Article, LoadStats, Location, UserEvent};
use crate::Result;

/// Radius used when a structured filter gives a point but no radius.
pub const DEFAULT_RADIUS_KM: f64 = 50.0;

/// Ad-hoc structured filter; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleQuery {
    pub category: Option<String>,
    pub source: Option<String>,
    pub location: Option<Location>,
    pub radius_km: Option<f64>,
    pub score_threshold: Option<f64>,
}

impl ArticleQuery {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.source.is_none()
            && self.location.is_none()
            && self.score_threshold.is_none()
    }

    pub fn radius(&self) -> f64 {
        self.radius_km.unwrap_or(DEFAULT_RADIUS_KM)
    }

    pub fn matches(&self, article: &Article) -> bool {
        if let Some(category) = &self.category {
            if !article.has_any_category(std::slice::from_ref(category)) {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if !article.matches_source(std::slice::from_ref(source), true) {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if article.distance_to(location) > self.radius() {
                return false;
            }
        }
        if let Some(threshold) = self.score_threshold {
            if article.relevance_score < threshold {
                return false;
            }
        }
        true
    }
}

/// Article persistence. Every `filter_*` result comes back pre-ordered:
/// category and source by recency, score by relevance, radius by distance.
#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Insert or replace a single article
    async fn insert(&self, article: &Article) -> Result<()>;

    /// Insert a batch; per-article failures are counted, not fatal
    async fn bulk_insert(&self, articles: &[Article]) -> Result<LoadStats>;

    /// All articles, newest first
    async fn find_all(&self) -> Result<Vec<Article>>;

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Article>>;

    async fn filter_by_category(&self, categories: &[String]) -> Result<Vec<Article>>;

    /// Case-insensitive, substring-tolerant source match
    async fn filter_by_source(&self, sources: &[String]) -> Result<Vec<Article>>;

    async fn filter_by_score(&self, threshold: f64) -> Result<Vec<Article>>;

    async fn filter_by_radius(&self, center: Location, radius_km: f64) -> Result<Vec<Article>>;

    /// Combined structured filter, newest first
    async fn filter(&self, query: &ArticleQuery) -> Result<Vec<Article>>;

    async fn distinct_sources(&self) -> Result<Vec<String>>;

    async fn distinct_categories(&self) -> Result<Vec<String>>;
}

/// Engagement event persistence. Events are append-only.
#[async_trait]
pub trait EventStorage: Send + Sync {
    async fn record(&self, event: &UserEvent) -> Result<()>;

    /// Events for one article at or after `since`, newest first
    async fn find_for_article(&self, article_id: &str, since: DateTime<Utc>) -> Result<Vec<UserEvent>>;

    /// Distinct ids of articles that have at least one event
    async fn article_ids_with_events(&self) -> Result<Vec<String>>;
}
