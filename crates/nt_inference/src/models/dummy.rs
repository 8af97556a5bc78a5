use std::fmt;

use nt_core::{InferenceModel, Intent, QueryAnalysis, Result};

pub const DEFAULT_DIMENSIONS: usize = 256;

const SUMMARY_WORDS: usize = 20;

const NEARBY_PHRASES: &[&str] = &["near me", "nearby", "around me", "close to me", "local"];

/// Offline model: word-prefix summaries, hashed bag-of-words embeddings and
/// keyword matching for query analysis. Same input, same output.
pub struct DummyModel {
    dimensions: usize,
}

impl fmt::Debug for DummyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyModel")
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl DummyModel {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Deterministic embedding, L2-normalized unless the text has no words.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let index = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[index] += sign;
        }

        let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|v| *v /= norm);
        }
        embedding
    }
}

impl Default for DummyModel {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x100000001b3)
    })
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    !needle.is_empty()
        && haystack
            .match_indices(&needle)
            .any(|(start, _)| {
                let before = haystack[..start].chars().next_back();
                let after = haystack[start + needle.len()..].chars().next();
                !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
            })
}

#[async_trait::async_trait]
impl InferenceModel for DummyModel {
    fn name(&self) -> &str {
        "Dummy"
    }

    async fn generate_summary(&self, title: &str, description: &str) -> Result<String> {
        let text = if description.trim().is_empty() { title } else { description };
        let words: Vec<&str> = text.split_whitespace().take(SUMMARY_WORDS).collect();
        Ok(words.join(" "))
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn parse_query(&self, query: &str, sources: &[String], categories: &[String]) -> Result<QueryAnalysis> {
        let lowered = query.to_lowercase();
        let mut intents = Vec::new();

        let matched_categories: Vec<String> = categories
            .iter()
            .filter(|c| contains_word(&lowered, c))
            .map(|c| c.to_lowercase())
            .collect();
        if !matched_categories.is_empty() {
            intents.push(Intent::category(matched_categories));
        }

        let matched_sources: Vec<&String> = sources
            .iter()
            .filter(|s| contains_word(&lowered, s))
            .collect();
        if !matched_sources.is_empty() {
            intents.push(Intent::source(matched_sources));
        }

        if NEARBY_PHRASES.iter().any(|p| contains_word(&lowered, p)) {
            intents.push(Intent::nearby());
        }

        // Capitalized words stand in for named entities.
        let entities = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
            .filter(|w| !sources.iter().any(|s| s.eq_ignore_ascii_case(w)))
            .map(str::to_string)
            .collect();

        Ok(QueryAnalysis { entities, intents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_core::{cosine_similarity, IntentKind};

    #[tokio::test]
    async fn test_dummy_model() {
        let model = DummyModel::default();

        let summary = model
            .generate_summary(
                "Ignored title",
                "This is a test article. It has multiple sentences. This is the third sentence, and it keeps going past twenty words.",
            )
            .await
            .unwrap();
        assert!(summary.starts_with("This is a test article"));
        assert_eq!(summary.split_whitespace().count(), 20);

        let fallback = model.generate_summary("Only a title", "").await.unwrap();
        assert_eq!(fallback, "Only a title");

        let embedding = model.generate_embedding("Test text").await.unwrap();
        assert_eq!(embedding.len(), DEFAULT_DIMENSIONS);
        assert_eq!(embedding, model.generate_embedding("test TEXT").await.unwrap());
    }

    #[test]
    fn test_embeddings_reflect_word_overlap() {
        let model = DummyModel::new(64);
        let a = model.embed("central bank raises interest rates");
        let b = model.embed("interest rates raised by central bank");
        let c = model.embed("football final ends in penalties");

        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-5);
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
        assert!(model.embed("").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_keyword_query_parsing() {
        let model = DummyModel::default();
        let sources = vec!["Reuters".to_string(), "ANI".to_string()];
        let categories = vec!["Technology".to_string(), "sports".to_string()];

        let analysis = model
            .parse_query("Latest technology news from Reuters about Elon Musk near me", &sources, &categories)
            .await
            .unwrap();

        assert_eq!(
            analysis.get_intent(IntentKind::Category),
            Some(&Intent::category(["technology"]))
        );
        assert_eq!(
            analysis.get_intent(IntentKind::Source),
            Some(&Intent::source(["Reuters"]))
        );
        assert!(analysis.has_intent(IntentKind::Nearby));
        assert_eq!(analysis.entities, ["Latest", "Elon", "Musk"]);

        // "animal" must not match the ANI source
        let analysis = model.parse_query("animal stories", &sources, &categories).await.unwrap();
        assert!(analysis.intents.is_empty());
    }
}
