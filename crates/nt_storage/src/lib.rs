use std::sync::Arc;

use async_trait::async_trait;
use nt_core::{ArticleStorage, Error, EventStorage, Result};
use tracing::info;
use url::Url;

pub mod backends;

pub use backends::*;

pub const DEFAULT_STORAGE_URL: &str = "memory://";

/// A backend that stores both articles and engagement events.
#[async_trait]
pub trait StorageBackend: ArticleStorage + EventStorage + Sized + 'static {
    fn get_error_message() -> &'static str;
    async fn connect(url: &Url) -> Result<Self>;
}

/// Handles to the two persistence collaborators, usually the same backend.
#[derive(Clone)]
pub struct Storage {
    pub articles: Arc<dyn ArticleStorage>,
    pub events: Arc<dyn EventStorage>,
}

impl Storage {
    pub fn from_backend<B: StorageBackend>(backend: B) -> Self {
        let backend = Arc::new(backend);
        Self {
            articles: backend.clone(),
            events: backend,
        }
    }
}

async fn open<B: StorageBackend>(url: &Url) -> Result<Storage> {
    let backend = B::connect(url).await.map_err(|e| {
        Error::Storage(format!("{} ({})", B::get_error_message(), e))
    })?;
    Ok(Storage::from_backend(backend))
}

/// Open the backend selected by the URL scheme (`memory://`, `sqlite://path`).
pub async fn create_storage(storage_url: &str) -> Result<Storage> {
    let url = Url::parse(storage_url)
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", storage_url, e)))?;

    let storage = match url.scheme() {
        "memory" => open::<InMemoryStorage>(&url).await?,
        #[cfg(feature = "sqlite")]
        "sqlite" => open::<SQLiteStorage>(&url).await?,
        other => {
            return Err(Error::Storage(format!(
                "Unsupported storage backend '{}' (enabled: {})",
                other,
                enabled_backends().join(", ")
            )))
        }
    };

    info!(backend = url.scheme(), "🏦 Storage backend initialized");
    Ok(storage)
}

pub fn enabled_backends() -> Vec<&'static str> {
    let mut names = vec!["memory"];
    if cfg!(feature = "sqlite") {
        names.push("sqlite");
    }
    names
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, Storage, StorageBackend};
}
