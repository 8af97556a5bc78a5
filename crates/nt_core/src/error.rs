use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// A pipeline stage failed; carries the stage name and the underlying failure.
    #[error("{stage} stage failed: {source}")]
    Retrieval {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    pub fn retrieval(stage: &'static str, source: Error) -> Self {
        Self::Retrieval {
            stage,
            source: Box::new(source),
        }
    }

    /// Name of the failed pipeline stage, if this is a stage failure.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::Retrieval { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_error_names_stage() {
        let err = Error::retrieval("category", Error::Database("connection reset".to_string()));
        assert_eq!(err.stage(), Some("category"));
        assert_eq!(
            err.to_string(),
            "category stage failed: Database error: connection reset"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_plain_errors_have_no_stage() {
        assert_eq!(Error::Timeout("embedding".to_string()).stage(), None);
    }
}
