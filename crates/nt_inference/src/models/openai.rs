use std::fmt;

use async_trait::async_trait;
use nt_core::{Error, InferenceModel, QueryAnalysis, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::query;
use crate::Config;

const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const SUMMARY_MAX_TOKENS: u32 = 150;
const QUERY_MAX_TOKENS: u32 = 500;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Client for an OpenAI-compatible `chat/completions` + `embeddings` API.
pub struct OpenAiModel {
    client: Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    dimensions: usize,
}

impl OpenAiModel {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Inference("OpenAI API key is required (LLM_API_KEY)".to_string()))?;

        url::Url::parse(&config.api_url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", config.api_url, e)))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            chat_model: config
                .chat_model
                .clone()
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_model: config
                .embedding_model
                .clone()
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            dimensions: config.dimensions()?,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("{} request failed: {}", path, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Inference(format!("{} response unreadable: {}", path, e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(Error::Inference(format!("{} returned {}: {}", path, status, message)));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Inference(format!("{} response malformed: {}", path, e)))
    }

    async fn chat(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
            max_tokens,
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Inference("no choices in chat response".to_string()))
    }
}

impl fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

#[async_trait]
impl InferenceModel for OpenAiModel {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn generate_summary(&self, title: &str, description: &str) -> Result<String> {
        let prompt = query::summary_prompt(title, description);
        let summary = self.chat(&prompt, SUMMARY_MAX_TOKENS).await?;
        debug!(title, "Generated summary");
        Ok(summary.trim().to_string())
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: text,
            model: &self.embedding_model,
            dimensions: self.dimensions,
        };

        let response: EmbeddingResponse = self.post("embeddings", &request).await?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Inference("no embedding data in response".to_string()))?;

        debug!(dimensions = embedding.len(), "Generated embedding");
        Ok(embedding)
    }

    async fn parse_query(&self, query_text: &str, sources: &[String], categories: &[String]) -> Result<QueryAnalysis> {
        let prompt = query::analysis_prompt(query_text, sources, categories);
        let response = self.chat(&prompt, QUERY_MAX_TOKENS).await?;

        let analysis = query::parse_query_analysis(&response).map_err(|e| {
            warn!(query = query_text, error = %e, "Unparseable query analysis");
            e
        })?;

        debug!(
            query = query_text,
            entities = analysis.entities.len(),
            intents = analysis.intents.len(),
            "Query analysed"
        );
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> Config {
        Config {
            api_key: api_key.map(str::to_string),
            model_name: Some("openai".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_model_requires_api_key() {
        let err = OpenAiModel::new(&config(None)).err().unwrap();
        assert!(matches!(err, Error::Inference(_)));
        assert!(OpenAiModel::new(&config(Some("  "))).is_err());
        assert!(OpenAiModel::new(&config(Some("test-key"))).is_ok());
    }

    #[test]
    fn test_model_debug_redacts_key() {
        let model = OpenAiModel::new(&config(Some("sk-secret"))).unwrap();
        let printed = format!("{:?}", model);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("text-embedding-3-small"));
    }

    #[test]
    fn test_invalid_api_url() {
        let config = Config {
            api_url: "not a url".to_string(),
            ..config(Some("test-key"))
        };
        assert!(matches!(OpenAiModel::new(&config), Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_inference_error() {
        let config = Config {
            api_url: "http://127.0.0.1:9".to_string(),
            request_timeout: std::time::Duration::from_secs(2),
            ..config(Some("test-key"))
        };
        let model = OpenAiModel::new(&config).unwrap();
        let err = model.generate_embedding("hello").await.err().unwrap();
        assert!(matches!(err, Error::Inference(_)));
    }
}
