use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use nt_core::{Article, InferenceModel};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const PROGRESS_INTERVAL: usize = 50;

/// Fills in missing summaries and embeddings.
///
/// Enrichment never fails: a failed or malformed call leaves that field
/// absent and the rest of the batch carries on.
pub struct Enricher {
    model: Arc<dyn InferenceModel>,
    semaphore: Arc<Semaphore>,
    dimensions: usize,
}

struct Progress {
    done: AtomicUsize,
    total: usize,
}

impl Progress {
    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % PROGRESS_INTERVAL == 0 || done == self.total {
            info!(done, total = self.total, "🧠 Enrichment progress");
        }
    }
}

impl Enricher {
    pub fn new(model: Arc<dyn InferenceModel>, dimensions: usize) -> Self {
        Self {
            model,
            semaphore: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
            dimensions,
        }
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn enrich(&self, article: Article) -> Article {
        let progress = Progress {
            done: AtomicUsize::new(0),
            total: pending_operations(std::slice::from_ref(&article)),
        };
        self.enrich_one(article, &progress).await
    }

    /// Enrich a batch concurrently, preserving input order.
    pub async fn enrich_all(&self, articles: Vec<Article>) -> Vec<Article> {
        let progress = Progress {
            done: AtomicUsize::new(0),
            total: pending_operations(&articles),
        };
        if progress.total == 0 {
            return articles;
        }

        info!(
            articles = articles.len(),
            operations = progress.total,
            "🧠 Enriching articles"
        );
        let enriched = join_all(
            articles
                .into_iter()
                .map(|article| self.enrich_one(article, &progress)),
        )
        .await;
        info!(operations = progress.done.load(Ordering::Relaxed), "✅ Enrichment finished");
        enriched
    }

    async fn enrich_one(&self, mut article: Article, progress: &Progress) -> Article {
        // A closed semaphore only means no bound; enrichment still runs.
        let _permit = self.semaphore.acquire().await.ok();

        let summary = async {
            if !article.needs_summary() {
                return None;
            }
            let summary = self.summarize(&article).await;
            progress.tick();
            summary
        };
        let embedding = async {
            if !article.needs_embedding() {
                return None;
            }
            let embedding = self.embed(&article).await;
            progress.tick();
            embedding
        };

        let (summary, embedding) = tokio::join!(summary, embedding);
        if summary.is_some() {
            article.summary = summary;
        }
        if embedding.is_some() {
            article.embedding = embedding;
        }
        article
    }

    async fn summarize(&self, article: &Article) -> Option<String> {
        let description = article.description_text().unwrap_or_default();
        match self.model.generate_summary(&article.title, description).await {
            Ok(summary) if !summary.trim().is_empty() => Some(summary),
            Ok(_) => {
                debug!(title = %article.title, "Model returned an empty summary");
                None
            }
            Err(e) => {
                warn!(title = %article.title, error = %e, "Failed to generate summary");
                None
            }
        }
    }

    async fn embed(&self, article: &Article) -> Option<Vec<f32>> {
        let text = article.description_text().unwrap_or(article.title.as_str());
        match self.model.generate_embedding(text).await {
            Ok(embedding) if embedding.len() == self.dimensions => Some(embedding),
            Ok(embedding) => {
                warn!(
                    title = %article.title,
                    expected = self.dimensions,
                    actual = embedding.len(),
                    "Discarding embedding with unexpected dimensions"
                );
                None
            }
            Err(e) => {
                warn!(title = %article.title, error = %e, "Failed to generate embedding");
                None
            }
        }
    }
}

fn pending_operations(articles: &[Article]) -> usize {
    articles
        .iter()
        .map(|a| usize::from(a.needs_summary()) + usize::from(a.needs_embedding()))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DummyModel;
    use async_trait::async_trait;
    use chrono::Utc;
    use nt_core::{Error, QueryAnalysis, Result};
    use std::sync::atomic::AtomicUsize;

    fn article(title: &str) -> Article {
        Article {
            id: title.to_lowercase(),
            title: title.to_string(),
            description: Some(format!("{} happened today in the city", title)),
            url: "https://example.com/a".to_string(),
            published_at: Utc::now(),
            source: "Reuters".to_string(),
            categories: vec!["world".to_string()],
            relevance_score: 0.5,
            latitude: 0.0,
            longitude: 0.0,
            summary: None,
            embedding: None,
        }
    }

    /// Fails summaries, returns fixed-size embeddings, and counts calls.
    struct FlakyModel {
        embedding_len: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceModel for FlakyModel {
        fn name(&self) -> &str {
            "Flaky"
        }

        async fn generate_summary(&self, _title: &str, _description: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Inference("rate limited".to_string()))
        }

        async fn generate_embedding(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.1; self.embedding_len])
        }

        async fn parse_query(&self, _query: &str, _sources: &[String], _categories: &[String]) -> Result<QueryAnalysis> {
            Ok(QueryAnalysis::default())
        }
    }

    #[tokio::test]
    async fn test_enrich_all_fills_missing_fields() {
        let enricher = Enricher::new(Arc::new(DummyModel::new(32)), 32).with_concurrency(2);
        let titles: Vec<String> = (0..60).map(|i| format!("Story {}", i)).collect();
        let articles = titles.iter().map(|t| article(t)).collect();

        let enriched = enricher.enrich_all(articles).await;
        assert_eq!(enriched.len(), 60);
        for (article, title) in enriched.iter().zip(&titles) {
            assert_eq!(&article.title, title);
            assert!(article.summary.as_deref().is_some_and(|s| s.starts_with(title.as_str())));
            assert_eq!(article.embedding.as_ref().map(Vec::len), Some(32));
        }
    }

    #[tokio::test]
    async fn test_failures_degrade_to_absent() {
        let model = Arc::new(FlakyModel {
            embedding_len: 8,
            calls: AtomicUsize::new(0),
        });
        let enricher = Enricher::new(model.clone(), 8);

        let enriched = enricher.enrich(article("Quake")).await;
        assert!(enriched.summary.is_none());
        assert_eq!(enriched.embedding, Some(vec![0.1; 8]));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wrong_dimensions_are_discarded() {
        let model = Arc::new(FlakyModel {
            embedding_len: 3,
            calls: AtomicUsize::new(0),
        });
        let enriched = Enricher::new(model, 8).enrich(article("Quake")).await;
        assert!(enriched.embedding.is_none());
    }

    #[tokio::test]
    async fn test_existing_fields_are_kept() {
        let model = Arc::new(FlakyModel {
            embedding_len: 2,
            calls: AtomicUsize::new(0),
        });
        let mut complete = article("Done");
        complete.summary = Some("already summarized".to_string());
        complete.embedding = Some(vec![1.0, 0.0]);

        let enriched = Enricher::new(model.clone(), 2)
            .enrich_all(vec![complete.clone()])
            .await;
        assert_eq!(enriched, vec![complete]);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
