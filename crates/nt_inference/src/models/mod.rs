use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nt_core::{Error, InferenceModel, Result};
use tracing::info;

use crate::Config;

pub mod dummy;
pub mod openai;

pub use dummy::DummyModel;
pub use openai::OpenAiModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelKind {
    /// Offline, deterministic model for development and tests
    Dummy,
    /// Any OpenAI-compatible chat + embeddings API
    Openai,
}

impl ModelKind {
    pub fn default_dimensions(&self) -> usize {
        match self {
            ModelKind::Dummy => dummy::DEFAULT_DIMENSIONS,
            ModelKind::Openai => nt_core::types::DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Dummy => f.write_str("dummy"),
            ModelKind::Openai => f.write_str("openai"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dummy" => Ok(ModelKind::Dummy),
            "openai" => Ok(ModelKind::Openai),
            other => Err(Error::Inference(format!(
                "Unknown model '{}'. Available models: dummy, openai",
                other
            ))),
        }
    }
}

pub async fn create_model(config: Option<Config>) -> Result<Arc<dyn InferenceModel>> {
    let config = config.unwrap_or_default();
    let kind = config.model_kind()?;
    let dimensions = config.dimensions()?;

    let model: Arc<dyn InferenceModel> = match kind {
        ModelKind::Dummy => Arc::new(DummyModel::new(dimensions)),
        ModelKind::Openai => Arc::new(OpenAiModel::new(&config)?),
    };

    info!(model = model.name(), dimensions, "🧠 Inference model ready");
    Ok(model)
}
