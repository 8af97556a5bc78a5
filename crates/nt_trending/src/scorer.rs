use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use nt_core::{Article, Error, EventStorage, Location, RequestContext, Result, UserEvent};
use serde::Serialize;
use tracing::{debug, warn};

pub const VOLUME_WEIGHT: f64 = 0.4;
pub const RECENCY_WEIGHT: f64 = 0.4;
pub const GEO_WEIGHT: f64 = 0.2;

/// Events older than this do not count towards volume.
pub const EVENT_WINDOW_DAYS: i64 = 7;
/// Event count at which the volume component saturates.
pub const VOLUME_SATURATION: f64 = 100.0;
/// Distance at which the geo component halves.
pub const GEO_SCALE_KM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendingScore {
    pub volume: f64,
    pub recency: f64,
    pub geo: f64,
    pub composite: f64,
}

/// Composite trending score of one article as seen from `reference`.
///
/// Each component lies in [0, 1], so the weighted sum does too. Only events
/// inside the trailing window ending at `now` are counted.
pub fn compute_score(
    article: &Article,
    reference: &Location,
    events: &[UserEvent],
    now: DateTime<Utc>,
) -> TrendingScore {
    let since = now - Duration::days(EVENT_WINDOW_DAYS);
    let recent = events
        .iter()
        .filter(|e| e.timestamp >= since && e.timestamp <= now)
        .count();
    let volume = (recent as f64 / VOLUME_SATURATION).min(1.0);

    let age_days = ((now - article.published_at).num_seconds() as f64 / 86_400.0).max(0.0);
    let recency = 1.0 / (1.0 + age_days);

    let geo = 1.0 / (1.0 + article.distance_to(reference) / GEO_SCALE_KM);

    TrendingScore {
        volume,
        recency,
        geo,
        composite: VOLUME_WEIGHT * volume + RECENCY_WEIGHT * recency + GEO_WEIGHT * geo,
    }
}

pub struct TrendingScorer {
    events: Arc<dyn EventStorage>,
}

impl TrendingScorer {
    pub fn new(events: Arc<dyn EventStorage>) -> Self {
        Self { events }
    }

    /// Score and sort `articles`, best first, keeping at most `limit`.
    ///
    /// An article whose events cannot be loaded is left out rather than
    /// failing the whole ranking; an expired deadline still aborts.
    pub async fn rank(
        &self,
        ctx: &RequestContext,
        articles: Vec<Article>,
        reference: Location,
        limit: usize,
    ) -> Result<Vec<(Article, TrendingScore)>> {
        let now = Utc::now();
        let since = now - Duration::days(EVENT_WINDOW_DAYS);
        let mut scored = Vec::with_capacity(articles.len());

        for article in articles {
            let events = match ctx
                .guard("event lookup", self.events.find_for_article(&article.id, since))
                .await
            {
                Ok(events) => events,
                Err(e @ Error::Timeout(_)) => return Err(e),
                Err(e) => {
                    warn!(article_id = %article.id, error = %e, "Skipping article: events unavailable");
                    continue;
                }
            };

            let score = compute_score(&article, &reference, &events, now);
            debug!(
                article_id = %article.id,
                events = events.len(),
                volume = score.volume,
                recency = score.recency,
                geo = score.geo,
                composite = score.composite,
                "Computed trending score"
            );
            scored.push((article, score));
        }

        scored.sort_by(|a, b| b.1.composite.total_cmp(&a.1.composite));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nt_core::EventKind;
    use nt_storage::InMemoryStorage;

    fn article(id: &str, age: Duration, lat: f64, lon: f64) -> Article {
        Article {
            id: id.to_string(),
            title: id.to_string(),
            description: None,
            url: format!("https://example.com/{}", id),
            published_at: Utc::now() - age,
            source: "Wire".to_string(),
            categories: vec!["world".to_string()],
            relevance_score: 0.5,
            latitude: lat,
            longitude: lon,
            summary: None,
            embedding: None,
        }
    }

    fn events(article_id: &str, n: usize, age: Duration) -> Vec<UserEvent> {
        (0..n)
            .map(|i| {
                let mut event = UserEvent::new(
                    format!("user-{}", i),
                    article_id,
                    EventKind::View,
                    Location::new(19.07, 72.87).unwrap(),
                );
                event.timestamp = Utc::now() - age;
                event
            })
            .collect()
    }

    #[test]
    fn test_score_components() {
        let now = Utc::now();
        let here = Location::new(19.07, 72.87).unwrap();
        let fresh = article("fresh", Duration::zero(), 19.07, 72.87);

        let score = compute_score(&fresh, &here, &events("fresh", 50, Duration::hours(1)), now);
        assert!((score.volume - 0.5).abs() < 1e-9);
        assert!((score.recency - 1.0).abs() < 1e-3);
        assert!((score.geo - 1.0).abs() < 1e-9);
        assert!((score.composite - 0.8).abs() < 1e-3);

        let saturated = compute_score(&fresh, &here, &events("fresh", 250, Duration::hours(1)), now);
        assert_eq!(saturated.volume, 1.0);
        assert!(saturated.composite <= 1.0);
    }

    #[test]
    fn test_old_events_and_future_dates() {
        let now = Utc::now();
        let here = Location::new(0.0, 0.0).unwrap();

        let future = article("future", -Duration::days(2), 0.0, 0.0);
        let score = compute_score(&future, &here, &events("future", 10, Duration::days(8)), now);
        assert_eq!(score.volume, 0.0);
        assert_eq!(score.recency, 1.0);

        let two_days = article("old", Duration::days(2), 0.0, 0.0);
        let score = compute_score(&two_days, &here, &[], now);
        assert!((score.recency - 1.0 / 3.0).abs() < 1e-3);

        // ~111 km away: 1 / (1 + 11.1)
        let far = article("far", Duration::zero(), 1.0, 0.0);
        let score = compute_score(&far, &here, &[], now);
        assert!((score.geo - 1.0 / (1.0 + 111.19 / 10.0)).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_engagement_ranks_higher() {
        let storage = Arc::new(InMemoryStorage::new());
        for event in events("b", 200, Duration::hours(2)) {
            storage.record(&event).await.unwrap();
        }
        let scorer = TrendingScorer::new(storage);
        let age = Duration::hours(6);

        let ranked = scorer
            .rank(
                &RequestContext::new(),
                vec![article("a", age, 19.07, 72.87), article("b", age, 19.07, 72.87)],
                Location::new(19.07, 72.87).unwrap(),
                10,
            )
            .await
            .unwrap();

        let ids: Vec<&str> = ranked.iter().map(|(a, _)| a.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert!(ranked[0].1.composite > ranked[1].1.composite);
    }

    /// Event storage that fails for one article id.
    struct FlakyEvents {
        inner: InMemoryStorage,
        broken: &'static str,
    }

    #[async_trait]
    impl EventStorage for FlakyEvents {
        async fn record(&self, event: &UserEvent) -> Result<()> {
            self.inner.record(event).await
        }

        async fn find_for_article(&self, article_id: &str, since: DateTime<Utc>) -> Result<Vec<UserEvent>> {
            if article_id == self.broken {
                return Err(Error::Database("events table locked".to_string()));
            }
            self.inner.find_for_article(article_id, since).await
        }

        async fn article_ids_with_events(&self) -> Result<Vec<String>> {
            self.inner.article_ids_with_events().await
        }
    }

    #[tokio::test]
    async fn test_failed_lookup_excludes_article_and_limit_applies() {
        let scorer = TrendingScorer::new(Arc::new(FlakyEvents {
            inner: InMemoryStorage::new(),
            broken: "b",
        }));
        let here = Location::new(10.0, 10.0).unwrap();
        let articles = vec![
            article("a", Duration::days(3), 10.0, 10.0),
            article("b", Duration::zero(), 10.0, 10.0),
            article("c", Duration::days(1), 10.0, 10.0),
            article("d", Duration::zero(), 10.0, 10.0),
        ];

        let ranked = scorer
            .rank(&RequestContext::new(), articles, here, 2)
            .await
            .unwrap();
        let ids: Vec<&str> = ranked.iter().map(|(a, _)| a.id.as_str()).collect();
        assert_eq!(ids, ["d", "c"]);
    }
}
