//! Ranking rules shared by the filters and the storage backends.

use std::cmp::Ordering;

use crate::types::{Article, Location};

/// Publication date, newest first.
pub fn by_recency(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

/// Relevance score, highest first; ties fall back to recency.
pub fn by_relevance(articles: &mut [Article]) {
    articles.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| b.published_at.cmp(&a.published_at))
    });
}

/// Distance to `center`, nearest first.
pub fn by_distance(articles: &mut [Article], center: &Location) {
    articles.sort_by_cached_key(|a| OrderedKm(a.distance_to(center)));
}

#[derive(PartialEq)]
struct OrderedKm(f64);

impl Eq for OrderedKm {}

impl PartialOrd for OrderedKm {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKm {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn article(id: &str, score: f64, age_days: i64, lat: f64, lon: f64) -> Article {
        Article {
            id: id.to_string(),
            title: id.to_string(),
            description: None,
            url: format!("https://example.com/{}", id),
            published_at: Utc::now() - Duration::days(age_days),
            source: "test".to_string(),
            categories: vec!["general".to_string()],
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

    #[test]
    fn test_orderings() {
        let mut articles = vec![
            article("old", 0.9, 5, 10.0, 10.0),
            article("new", 0.2, 0, 0.1, 0.1),
            article("mid", 0.5, 2, 1.0, 1.0),
        ];

        by_recency(&mut articles);
        assert_eq!(ids(&articles), ["new", "mid", "old"]);

        by_relevance(&mut articles);
        assert_eq!(ids(&articles), ["old", "mid", "new"]);

        by_distance(&mut articles, &Location { latitude: 0.0, longitude: 0.0 });
        assert_eq!(ids(&articles), ["new", "mid", "old"]);
    }
}
