use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

pub async fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/news", post(handlers::create_article))
        .route(
            "/api/v1/news/query",
            get(handlers::query_news).post(handlers::query_news_body),
        )
        .route("/api/v1/news/trending", get(handlers::trending))
        .route("/api/v1/news/filter", get(handlers::filter_articles))
        .route("/api/v1/news/load", post(handlers::load_data))
        .route("/api/v1/interactions/record", post(handlers::record_interaction))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(state: AppState, addr: SocketAddr) -> nt_core::Result<()> {
    let app = create_app(state).await;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "🚀 Web server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub mod prelude {
    pub use nt_core::{Article, Result, Error};
    pub use crate::{create_app, serve, AppState};
}
