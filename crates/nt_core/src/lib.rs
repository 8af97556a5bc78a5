pub mod context;
pub mod error;
pub mod geo;
pub mod models;
pub mod ordering;
pub mod storage;
pub mod types;

pub use context::RequestContext;
pub use error::{Error, Result};
pub use geo::{cosine_similarity, distance_km};
pub use models::InferenceModel;
pub use storage::{ArticleQuery, ArticleStorage, EventStorage};
pub use types::{
    Article, EventKind, Intent, IntentKind, LoadStats, Location, QueryAnalysis, UserEvent,
};
