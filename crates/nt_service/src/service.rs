use std::path::Path;
use std::sync::Arc;

use nt_core::{
    Article, ArticleQuery, ArticleStorage, Error, EventKind, EventStorage, InferenceModel,
    LoadStats, Location, RequestContext, Result, UserEvent,
};
use nt_filters::FilterChain;
use nt_inference::Enricher;
use nt_storage::Storage;
use nt_trending::{TrendingCache, TrendingScorer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maximum number of articles a free-text query returns.
pub const QUERY_RESULT_LIMIT: usize = 5;
pub const DEFAULT_TRENDING_LIMIT: usize = 10;
pub const MAX_TRENDING_LIMIT: usize = 100;

/// Entry point for every read and write the API and CLI perform.
pub struct ArticleService {
    articles: Arc<dyn ArticleStorage>,
    events: Arc<dyn EventStorage>,
    model: Arc<dyn InferenceModel>,
    chain: FilterChain,
    scorer: TrendingScorer,
    cache: TrendingCache,
    enricher: Enricher,
}

impl ArticleService {
    pub fn new(
        storage: Storage,
        model: Arc<dyn InferenceModel>,
        dimensions: usize,
        cache: TrendingCache,
    ) -> Self {
        Self {
            chain: FilterChain::new(storage.articles.clone(), model.clone()),
            scorer: TrendingScorer::new(storage.events.clone()),
            enricher: Enricher::new(model.clone(), dimensions),
            articles: storage.articles,
            events: storage.events,
            model,
            cache,
        }
    }

    pub fn with_enrichment_concurrency(mut self, limit: usize) -> Self {
        self.enricher = self.enricher.with_concurrency(limit);
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    /// Answer a natural-language query with at most [`QUERY_RESULT_LIMIT`] articles.
    pub async fn process_query(
        &self,
        ctx: &RequestContext,
        query: &str,
        location: Option<Location>,
    ) -> Result<Vec<Article>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("query is required".to_string()));
        }
        if let Some(location) = &location {
            location.validate()?;
        }

        let (sources, categories) = tokio::try_join!(
            ctx.guard("distinct sources", self.articles.distinct_sources()),
            ctx.guard("distinct categories", self.articles.distinct_categories()),
        )?;

        let analysis = ctx
            .guard("query analysis", self.model.parse_query(query, &sources, &categories))
            .await
            .map_err(|e| match e {
                Error::Timeout(_) | Error::Inference(_) => e,
                other => Error::Inference(format!("query analysis failed: {}", other)),
            })?;
        info!(
            query,
            intents = ?analysis.intents.iter().map(|i| i.kind().to_string()).collect::<Vec<_>>(),
            entities = ?analysis.entities,
            has_location = location.is_some(),
            "🔍 Query analysed"
        );

        let mut articles = self
            .chain
            .execute(ctx, &analysis.intents, &analysis.entities, location)
            .await?;
        articles.truncate(QUERY_RESULT_LIMIT);
        Ok(articles)
    }

    /// Articles with the most engagement around `location`, best first.
    pub async fn trending(
        &self,
        ctx: &RequestContext,
        location: Location,
        limit: usize,
    ) -> Result<Vec<Article>> {
        location.validate()?;
        if limit == 0 {
            return Err(Error::Validation("limit must be greater than 0".to_string()));
        }
        let limit = limit.min(MAX_TRENDING_LIMIT);
        let (lat, lon) = (location.latitude, location.longitude);

        if let Some(cached) = self.cache.get(lat, lon, limit).await {
            return Ok(cached);
        }

        let ids = ctx
            .guard("engaged article ids", self.events.article_ids_with_events())
            .await?;
        if ids.is_empty() {
            debug!("No engagement recorded yet: nothing is trending");
            return Ok(Vec::new());
        }

        let candidates = ctx.guard("article lookup", self.articles.find_by_ids(&ids)).await?;
        let ranked = self.scorer.rank(ctx, candidates, location, limit).await?;
        let articles: Vec<Article> = ranked.into_iter().map(|(article, _)| article).collect();

        info!(%location, limit, count = articles.len(), "📈 Trending computed");
        self.cache.put(lat, lon, limit, &articles).await;
        Ok(articles)
    }

    /// Structured filter over category, source, radius and score.
    pub async fn filter_articles(&self, ctx: &RequestContext, query: &ArticleQuery) -> Result<Vec<Article>> {
        if query.is_empty() {
            return Err(Error::Validation(
                "at least one filter parameter must be provided: category, source, lat/lon, or score_threshold"
                    .to_string(),
            ));
        }
        if let Some(location) = &query.location {
            location.validate()?;
        }
        if let Some(radius) = query.radius_km {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(Error::Validation("radius must be greater than 0".to_string()));
            }
        }
        if let Some(threshold) = query.score_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(Error::Validation(
                    "score_threshold must be between 0 and 1".to_string(),
                ));
            }
        }

        ctx.guard("article filter", self.articles.filter(query)).await
    }

    /// Load a JSON array of articles.
    ///
    /// Every article is validated before anything is stored; a single
    /// invalid article rejects the whole file and the returned stats list
    /// each problem.
    pub async fn load_from_json(&self, path: impl AsRef<Path>) -> Result<LoadStats> {
        let path = path.as_ref();
        info!(path = %path.display(), "📂 Loading articles");

        let raw = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("file not found: {}", path.display())),
            _ => Error::Io(e),
        })?;
        let mut articles: Vec<Article> = serde_json::from_str(&raw).map_err(|e| {
            Error::Validation(format!("failed to decode {}: {}", path.display(), e))
        })?;

        let mut stats = LoadStats {
            total_articles: articles.len(),
            ..LoadStats::default()
        };
        if articles.is_empty() {
            warn!(path = %path.display(), "No articles in file");
            return Ok(stats);
        }

        for (index, article) in articles.iter_mut().enumerate() {
            if article.id.trim().is_empty() {
                article.id = Uuid::new_v4().to_string();
            }
            let mut errors = article.validation_errors();
            errors.extend(article.embedding_error(self.enricher.dimensions()));
            if !errors.is_empty() {
                stats.error_count += 1;
                stats
                    .validation_errors
                    .extend(errors.into_iter().map(|e| format!("article {}: {}", index, e)));
            }
        }
        if !stats.validation_errors.is_empty() {
            warn!(
                invalid = stats.error_count,
                errors = stats.validation_errors.len(),
                "Rejecting file: validation failed"
            );
            return Ok(stats);
        }

        let articles = self.enricher.enrich_all(articles).await;
        let stats = self.articles.bulk_insert(&articles).await?;
        info!(
            total = stats.total_articles,
            stored = stats.success_count,
            failed = stats.error_count,
            "✅ Articles loaded"
        );
        Ok(stats)
    }

    /// Validate, enrich and store one article.
    pub async fn create_article(&self, mut article: Article) -> Result<Article> {
        article.validate()?;
        if let Some(msg) = article.embedding_error(self.enricher.dimensions()) {
            return Err(Error::Validation(msg));
        }
        if article.id.trim().is_empty() {
            article.id = Uuid::new_v4().to_string();
        }

        let article = self.enricher.enrich(article).await;
        self.articles.insert(&article).await?;
        info!(id = %article.id, title = %article.title, "📰 Article created");
        Ok(article)
    }

    /// Record a view or click with a fresh id and the current time.
    pub async fn record_interaction(
        &self,
        user_id: &str,
        article_id: &str,
        kind: EventKind,
        location: Location,
    ) -> Result<UserEvent> {
        let event = UserEvent::new(user_id.trim(), article_id.trim(), kind, location);
        event.validate()?;

        self.events.record(&event).await?;
        debug!(event_id = %event.id, article_id = %event.article_id, kind = %event.kind, "Interaction recorded");
        Ok(event)
    }
}
