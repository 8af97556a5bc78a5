use async_trait::async_trait;
use crate::types::QueryAnalysis;
use crate::Result;

#[async_trait]
pub trait InferenceModel: Send + Sync {
    fn name(&self) -> &str;

    /// Short summary of an article from its title and description
    async fn generate_summary(&self, title: &str, description: &str) -> Result<String>;

    /// Generate an embedding for a piece of text
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;

    /// Extract intents and entities from a free-text query, restricted to
    /// the sources and categories the corpus actually contains
    async fn parse_query(&self, query: &str, sources: &[String], categories: &[String]) -> Result<QueryAnalysis>;
}
