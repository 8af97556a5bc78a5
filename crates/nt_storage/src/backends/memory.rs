use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nt_core::ordering;
use nt_core::storage::{ArticleQuery, ArticleStorage, EventStorage};
use nt_core::{Article, Error, LoadStats, Location, Result, UserEvent};
use tokio::sync::RwLock;
use url::Url;

use crate::StorageBackend;

#[derive(Default)]
pub struct MemoryStore {
    articles: Vec<Article>,
    events: Vec<UserEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, article: &Article) -> Result<()> {
        if article.id.trim().is_empty() {
            return Err(Error::Storage(format!(
                "article '{}' has no id",
                article.title
            )));
        }
        if let Some(existing) = self.articles.iter_mut().find(|a| a.id == article.id) {
            *existing = article.clone();
        } else {
            self.articles.push(article.clone());
        }
        Ok(())
    }

    fn select<P>(&self, predicate: P) -> Vec<Article>
    where
        P: Fn(&Article) -> bool,
    {
        self.articles.iter().filter(|a| predicate(a)).cloned().collect()
    }
}

/// Process-local storage; contents are lost on restart.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn connect(_url: &Url) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn insert(&self, article: &Article) -> Result<()> {
        let mut store = self.store.write().await;
        store.upsert(article)
    }

    async fn bulk_insert(&self, articles: &[Article]) -> Result<LoadStats> {
        let mut store = self.store.write().await;
        let mut stats = LoadStats {
            total_articles: articles.len(),
            ..LoadStats::default()
        };
        for article in articles {
            match store.upsert(article) {
                Ok(()) => stats.success_count += 1,
                Err(e) => {
                    stats.error_count += 1;
                    stats.validation_errors.push(e.to_string());
                }
            }
        }
        Ok(stats)
    }

    async fn find_all(&self) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        let mut articles = store.articles.clone();
        ordering::by_recency(&mut articles);
        Ok(articles)
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Article>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let store = self.store.read().await;
        Ok(store.select(|a| wanted.contains(a.id.as_str())))
    }

    async fn filter_by_category(&self, categories: &[String]) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        let mut articles = store.select(|a| a.has_any_category(categories));
        ordering::by_recency(&mut articles);
        Ok(articles)
    }

    async fn filter_by_source(&self, sources: &[String]) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        let mut articles = store.select(|a| a.matches_source(sources, true));
        ordering::by_recency(&mut articles);
        Ok(articles)
    }

    async fn filter_by_score(&self, threshold: f64) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        let mut articles = store.select(|a| a.relevance_score >= threshold);
        ordering::by_relevance(&mut articles);
        Ok(articles)
    }

    async fn filter_by_radius(&self, center: Location, radius_km: f64) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        let mut articles = store.select(|a| a.distance_to(&center) <= radius_km);
        ordering::by_distance(&mut articles, &center);
        Ok(articles)
    }

    async fn filter(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        let mut articles = store.select(|a| query.matches(a));
        ordering::by_recency(&mut articles);
        Ok(articles)
    }

    async fn distinct_sources(&self) -> Result<Vec<String>> {
        let store = self.store.read().await;
        let sources: BTreeSet<String> = store.articles.iter().map(|a| a.source.clone()).collect();
        Ok(sources.into_iter().collect())
    }

    async fn distinct_categories(&self) -> Result<Vec<String>> {
        let store = self.store.read().await;
        let categories: BTreeSet<String> = store
            .articles
            .iter()
            .flat_map(|a| a.categories.iter().cloned())
            .collect();
        Ok(categories.into_iter().collect())
    }
}

#[async_trait]
impl EventStorage for InMemoryStorage {
    async fn record(&self, event: &UserEvent) -> Result<()> {
        let mut store = self.store.write().await;
        store.events.push(event.clone());
        Ok(())
    }

    async fn find_for_article(&self, article_id: &str, since: DateTime<Utc>) -> Result<Vec<UserEvent>> {
        let store = self.store.read().await;
        let mut events: Vec<UserEvent> = store
            .events
            .iter()
            .filter(|e| e.article_id == article_id && e.timestamp >= since)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }

    async fn article_ids_with_events(&self) -> Result<Vec<String>> {
        let store = self.store.read().await;
        let ids: BTreeSet<String> = store.events.iter().map(|e| e.article_id.clone()).collect();
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nt_core::EventKind;

    fn article(id: &str, source: &str, categories: &[&str], score: f64, lat: f64, lon: f64) -> Article {
        Article {
            id: id.to_string(),
            title: format!("Article {}", id),
            description: Some("Some description".to_string()),
            url: format!("https://example.com/{}", id),
            published_at: Utc::now(),
            source: source.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            relevance_score: score,
            latitude: lat,
            longitude: lon,
            summary: None,
            embedding: None,
        }
    }

    fn ids(articles: &[Article]) -> Vec<&str> {
        articles.iter().map(|a| a.id.as_str()).collect()
    }

    async fn seeded() -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        let stats = storage
            .bulk_insert(&[
                article("a", "Reuters", &["Technology"], 0.9, 52.52, 13.40),
                article("b", "Reuters Business", &["Business"], 0.6, 48.85, 2.35),
                article("c", "The Hindu", &["technology", "world"], 0.3, 52.40, 13.06),
            ])
            .await
            .unwrap();
        assert_eq!(stats.success_count, 3);
        storage
    }

    #[tokio::test]
    async fn test_category_and_source_filters() {
        let storage = seeded().await;

        let tech = storage
            .filter_by_category(&["TECHNOLOGY".to_string()])
            .await
            .unwrap();
        let mut tech_ids = ids(&tech);
        tech_ids.sort();
        assert_eq!(tech_ids, ["a", "c"]);

        let reuters = storage.filter_by_source(&["reuters".to_string()]).await.unwrap();
        let mut reuters_ids = ids(&reuters);
        reuters_ids.sort();
        assert_eq!(reuters_ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_score_and_radius_ordering() {
        let storage = seeded().await;

        let scored = storage.filter_by_score(0.5).await.unwrap();
        assert_eq!(ids(&scored), ["a", "b"]);

        let berlin = Location::new(52.52, 13.40).unwrap();
        let nearby = storage.filter_by_radius(berlin, 50.0).await.unwrap();
        assert_eq!(ids(&nearby), ["a", "c"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let storage = seeded().await;
        let mut updated = article("a", "Reuters", &["Technology"], 0.1, 52.52, 13.40);
        updated.summary = Some("new summary".to_string());
        storage.insert(&updated).await.unwrap();

        let all = storage.find_all().await.unwrap();
        assert_eq!(all.len(), 3);
        let found = storage.find_by_ids(&["a".to_string()]).await.unwrap();
        assert_eq!(found[0].summary.as_deref(), Some("new summary"));
    }

    #[tokio::test]
    async fn test_bulk_insert_counts_failures() {
        let storage = InMemoryStorage::new();
        let stats = storage
            .bulk_insert(&[article("", "x", &["y"], 0.5, 0.0, 0.0), article("ok", "x", &["y"], 0.5, 0.0, 0.0)])
            .await
            .unwrap();
        assert_eq!(stats.total_articles, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.error_count, 1);
    }

    #[tokio::test]
    async fn test_distinct_values_and_structured_filter() {
        let storage = seeded().await;
        assert_eq!(
            storage.distinct_sources().await.unwrap(),
            ["Reuters", "Reuters Business", "The Hindu"]
        );
        assert_eq!(
            storage.distinct_categories().await.unwrap(),
            ["Business", "Technology", "technology", "world"]
        );

        let query = ArticleQuery {
            category: Some("technology".to_string()),
            score_threshold: Some(0.5),
            ..ArticleQuery::default()
        };
        assert_eq!(ids(&storage.filter(&query).await.unwrap()), ["a"]);
    }

    #[tokio::test]
    async fn test_events_window() {
        let storage = seeded().await;
        let here = Location::new(52.5, 13.4).unwrap();

        let mut old = UserEvent::new("u1", "a", EventKind::View, here);
        old.timestamp = Utc::now() - Duration::days(10);
        storage.record(&old).await.unwrap();
        storage.record(&UserEvent::new("u2", "a", EventKind::Click, here)).await.unwrap();
        storage.record(&UserEvent::new("u3", "b", EventKind::View, here)).await.unwrap();

        let recent = storage
            .find_for_article("a", Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].user_id, "u2");

        assert_eq!(storage.article_ids_with_events().await.unwrap(), ["a", "b"]);
    }
}
