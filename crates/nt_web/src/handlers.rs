use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use nt_core::{Article, ArticleQuery, EventKind, LoadStats, Location};
use nt_service::DEFAULT_TRENDING_LIMIT;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ArticlesResponse {
    pub articles: Vec<Article>,
}

impl ArticlesResponse {
    fn new(articles: Vec<Article>) -> Self {
        Self {
            articles: public(articles),
        }
    }
}

/// Embeddings stay server-side.
fn public(articles: Vec<Article>) -> Vec<Article> {
    articles.into_iter().map(Article::without_embedding).collect()
}

fn coordinates(lat: f64, lon: f64) -> ApiResult<Location> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(ApiError::bad_request("Latitude must be between -90 and 90"));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(ApiError::bad_request("Longitude must be between -180 and 180"));
    }
    Ok(Location {
        latitude: lat,
        longitude: lon,
    })
}

fn optional_coordinates(lat: Option<f64>, lon: Option<f64>) -> ApiResult<Option<Location>> {
    match (lat, lon) {
        (Some(lat), Some(lon)) => coordinates(lat, lon).map(Some),
        (None, None) => Ok(None),
        _ => Err(ApiError::bad_request("lat and lon must be provided together")),
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "nt" }))
}

pub async fn create_article(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Article>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Article>)> {
    let Json(article) = body?;
    let created = state.service.create_article(article).await?;
    Ok((StatusCode::CREATED, Json(created.without_embedding())))
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub query: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    pub query: String,
    pub location: Option<Location>,
}

async fn run_query(state: &AppState, query: &str, location: Option<Location>) -> ApiResult<Json<ArticlesResponse>> {
    if query.trim().is_empty() {
        return Err(ApiError::bad_request("Query field is required"));
    }
    let ctx = state.request_context();
    let articles = state.service.process_query(&ctx, query, location).await?;
    info!(query, count = articles.len(), "News query processed");
    Ok(Json(ArticlesResponse::new(articles)))
}

#[instrument(skip_all)]
pub async fn query_news(
    State(state): State<Arc<AppState>>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> ApiResult<Json<ArticlesResponse>> {
    let Query(params) = params?;
    let location = optional_coordinates(params.lat, params.lon)?;
    run_query(&state, &params.query, location).await
}

#[instrument(skip_all)]
pub async fn query_news_body(
    State(state): State<Arc<AppState>>,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> ApiResult<Json<ArticlesResponse>> {
    let Json(body) = body?;
    let location = match body.location {
        Some(location) => Some(coordinates(location.latitude, location.longitude)?),
        None => None,
    };
    run_query(&state, &body.query, location).await
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendingParams {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub limit: Option<i64>,
}

#[instrument(skip_all)]
pub async fn trending(
    State(state): State<Arc<AppState>>,
    params: Result<Query<TrendingParams>, QueryRejection>,
) -> ApiResult<Json<ArticlesResponse>> {
    let Query(params) = params?;
    let location = coordinates(params.lat.unwrap_or(0.0), params.lon.unwrap_or(0.0))?;
    let limit = params.limit.unwrap_or(DEFAULT_TRENDING_LIMIT as i64);
    if limit <= 0 {
        return Err(ApiError::bad_request("Limit must be greater than 0"));
    }

    let ctx = state.request_context();
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let articles = state.service.trending(&ctx, location, limit).await?;
    Ok(Json(ArticlesResponse::new(articles)))
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub category: Option<String>,
    pub source: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius: Option<f64>,
    pub score_threshold: Option<f64>,
}

impl FilterParams {
    fn into_query(self) -> ApiResult<ArticleQuery> {
        let non_blank = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(ArticleQuery {
            category: non_blank(self.category),
            source: non_blank(self.source),
            location: optional_coordinates(self.lat, self.lon)?,
            radius_km: self.radius,
            score_threshold: self.score_threshold,
        })
    }
}

#[instrument(skip_all)]
pub async fn filter_articles(
    State(state): State<Arc<AppState>>,
    params: Result<Query<FilterParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Article>>> {
    let Query(params) = params?;
    let query = params.into_query()?;
    let ctx = state.request_context();
    let articles = state.service.filter_articles(&ctx, &query).await?;
    Ok(Json(public(articles)))
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadRequest {
    #[serde(default)]
    pub filepath: String,
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub stats: LoadStats,
}

#[instrument(skip_all)]
pub async fn load_data(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoadRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<LoadResponse>)> {
    let Json(request) = body?;
    if request.filepath.trim().is_empty() {
        return Err(ApiError::bad_request("Filepath field is required"));
    }

    let stats = state.service.load_from_json(request.filepath.trim()).await?;
    if stats.is_rejected() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(LoadResponse {
                success: false,
                message: "Validation failed".to_string(),
                stats,
            }),
        ));
    }

    info!(
        filepath = %request.filepath,
        total = stats.total_articles,
        success_count = stats.success_count,
        error_count = stats.error_count,
        "Data loaded via API"
    );
    Ok((
        StatusCode::OK,
        Json(LoadResponse {
            success: true,
            message: "Data loaded successfully".to_string(),
            stats,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub article_id: String,
    #[serde(default)]
    pub event_type: String,
    pub location: Option<Location>,
}

#[instrument(skip_all)]
pub async fn record_interaction(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RecordRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;
    if request.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id field is required"));
    }
    if request.article_id.trim().is_empty() {
        return Err(ApiError::bad_request("article_id field is required"));
    }
    if request.event_type.trim().is_empty() {
        return Err(ApiError::bad_request("event_type field is required"));
    }
    let kind: EventKind = request
        .event_type
        .parse()
        .map_err(|_| ApiError::bad_request("event_type must be either 'view' or 'click'"))?;
    let location = request
        .location
        .ok_or_else(|| ApiError::bad_request("location field is required"))?;
    let location = coordinates(location.latitude, location.longitude)?;

    let event = state
        .service
        .record_interaction(&request.user_id, &request.article_id, kind, location)
        .await?;
    Ok(Json(json!({ "success": true, "event_id": event.id })))
}
