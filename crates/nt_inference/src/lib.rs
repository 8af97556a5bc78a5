use std::fmt;
use std::time::Duration;

pub mod enrichment;
pub mod models;
pub mod query;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model_name: Option<String>,
    pub chat_model: Option<String>,
    pub embedding_model: Option<String>,
    /// Overrides the model's default embedding dimensionality.
    pub embedding_dimensions: Option<usize>,
    pub request_timeout: Duration,
}

impl Config {
    pub fn model_kind(&self) -> nt_core::Result<ModelKind> {
        self.model_name
            .as_deref()
            .map_or(Ok(ModelKind::Dummy), str::parse)
    }

    /// Dimensionality every stored embedding must have.
    pub fn dimensions(&self) -> nt_core::Result<usize> {
        Ok(self
            .embedding_dimensions
            .unwrap_or(self.model_kind()?.default_dimensions()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            model_name: None,
            chat_model: None,
            embedding_model: None,
            embedding_dimensions: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("model_name", &self.model_name)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

pub mod prelude {
    pub use super::enrichment::Enricher;
    pub use super::models::{create_model, ModelKind};
    pub use super::Config;
    pub use nt_core::{Article, Error, QueryAnalysis, Result};
}

pub use enrichment::Enricher;
pub use models::{create_model, ModelKind};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_debug_redacts_key() {
        let config = Config {
            api_key: Some("sk-very-secret".to_string()),
            ..Config::default()
        };
        let printed = format!("{:?}", config);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("sk-very-secret"));
    }

    #[test]
    fn test_dimensions_follow_model() {
        let dummy = Config::default();
        assert_eq!(dummy.dimensions().unwrap(), 256);

        let openai = Config {
            model_name: Some("openai".to_string()),
            ..Config::default()
        };
        assert_eq!(openai.dimensions().unwrap(), 1536);

        let custom = Config {
            model_name: Some("openai".to_string()),
            embedding_dimensions: Some(512),
            ..Config::default()
        };
        assert_eq!(custom.dimensions().unwrap(), 512);

        let unknown = Config {
            model_name: Some("ollama".to_string()),
            ..Config::default()
        };
        assert!(unknown.dimensions().is_err());
    }
}
