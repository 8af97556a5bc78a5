use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nt_core::ordering;
use nt_core::storage::{ArticleQuery, ArticleStorage, EventStorage};
use nt_core::{Article, Error, EventKind, LoadStats, Location, Result, UserEvent};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::debug;
use url::Url;

use crate::StorageBackend;

const DEFAULT_DB_PATH: &str = "articles.db";

/// Kilometres per degree of latitude, used for the bounding-box prefilter.
const KM_PER_DEGREE: f64 = 111.0;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        url TEXT NOT NULL,
        publication_date TEXT NOT NULL,
        source_name TEXT NOT NULL,
        category TEXT NOT NULL,
        relevance_score REAL NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        summary TEXT,
        embedding TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_events (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        article_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_user_events_article ON user_events (article_id, timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_articles_score ON articles (relevance_score)",
    // Add future migrations here
];

const ARTICLE_COLUMNS: &str = "id, title, description, url, publication_date, source_name, \
     category, relevance_score, latitude, longitude, summary, embedding";

pub struct SQLiteStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be writable at the configured path"
    }

    async fn connect(url: &Url) -> Result<Self> {
        let raw = url.as_str().trim_start_matches("sqlite://");
        let path = raw.split('?').next().unwrap_or_default();
        let path = if path.is_empty() { DEFAULT_DB_PATH } else { path };
        Self::new_with_path(Path::new(path)).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Database(format!("Failed to create database directory: {}", e)))?;
        }

        let pool = SqlitePool::connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }
        debug!(path = %db_path.display(), "SQLite migrations applied");

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    async fn fetch_articles(&self, sql: &str, binds: Vec<Bind>) -> Result<Vec<Article>> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = match bind {
                Bind::Text(value) => query.bind(value),
                Bind::Real(value) => query.bind(value),
            };
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to query articles: {}", e)))?;
        rows.iter().map(row_to_article).collect()
    }

    async fn upsert(&self, article: &Article) -> Result<()> {
        if article.id.trim().is_empty() {
            return Err(Error::Storage(format!("article '{}' has no id", article.title)));
        }
        let categories = serde_json::to_string(&article.categories)?;
        let embedding = article
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(&format!(
            "INSERT OR REPLACE INTO articles ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ARTICLE_COLUMNS
        ))
        .bind(&article.id)
        .bind(&article.title)
        .bind(article.description.as_deref())
        .bind(&article.url)
        .bind(timestamp(&article.published_at))
        .bind(&article.source)
        .bind(categories)
        .bind(article.relevance_score)
        .bind(article.latitude)
        .bind(article.longitude)
        .bind(article.summary.as_deref())
        .bind(embedding)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to store article: {}", e)))?;

        Ok(())
    }
}

enum Bind {
    Text(String),
    Real(f64),
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Fixed-width UTC timestamps so string comparison matches time order.
fn timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("Failed to parse date '{}': {}", raw, e)))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| Error::Database(format!("Failed to read column {}: {}", name, e)))
}

fn row_to_article(row: &SqliteRow) -> Result<Article> {
    let categories: String = column(row, "category")?;
    let embedding: Option<String> = column(row, "embedding")?;
    let published_at: String = column(row, "publication_date")?;

    Ok(Article {
        id: column(row, "id")?,
        title: column(row, "title")?,
        description: column(row, "description")?,
        url: column(row, "url")?,
        published_at: parse_timestamp(&published_at)?,
        source: column(row, "source_name")?,
        categories: serde_json::from_str(&categories)?,
        relevance_score: column(row, "relevance_score")?,
        latitude: column(row, "latitude")?,
        longitude: column(row, "longitude")?,
        summary: column(row, "summary")?,
        embedding: embedding.as_deref().map(serde_json::from_str).transpose()?,
    })
}

fn row_to_event(row: &SqliteRow) -> Result<UserEvent> {
    let kind: String = column(row, "event_type")?;
    let timestamp: String = column(row, "timestamp")?;

    Ok(UserEvent {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        article_id: column(row, "article_id")?,
        kind: kind.parse::<EventKind>()?,
        timestamp: parse_timestamp(&timestamp)?,
        latitude: column(row, "latitude")?,
        longitude: column(row, "longitude")?,
    })
}

/// SQL fragment and binds for "has any of these categories", case-insensitive.
fn category_clause(categories: &[String], binds: &mut Vec<Bind>) -> String {
    binds.extend(categories.iter().map(|c| Bind::Text(c.to_lowercase())));
    format!(
        "EXISTS (SELECT 1 FROM json_each(articles.category) WHERE lower(json_each.value) IN ({}))",
        placeholders(categories.len())
    )
}

/// SQL fragment and binds for a case-insensitive substring source match.
fn source_clause(sources: &[String], binds: &mut Vec<Bind>) -> String {
    binds.extend(sources.iter().map(|s| Bind::Text(format!("%{}%", s.to_lowercase()))));
    let parts = vec!["lower(source_name) LIKE ?"; sources.len()];
    format!("({})", parts.join(" OR "))
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn insert(&self, article: &Article) -> Result<()> {
        self.upsert(article).await
    }

    async fn bulk_insert(&self, articles: &[Article]) -> Result<LoadStats> {
        let mut stats = LoadStats {
            total_articles: articles.len(),
            ..LoadStats::default()
        };
        for article in articles {
            match self.upsert(article).await {
                Ok(()) => stats.success_count += 1,
                Err(e) => {
                    stats.error_count += 1;
                    stats.validation_errors.push(e.to_string());
                }
            }
        }
        Ok(stats)
    }

    async fn find_all(&self) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {} FROM articles ORDER BY publication_date DESC",
            ARTICLE_COLUMNS
        );
        self.fetch_articles(&sql, Vec::new()).await
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM articles WHERE id IN ({})",
            ARTICLE_COLUMNS,
            placeholders(ids.len())
        );
        let binds = ids.iter().cloned().map(Bind::Text).collect();
        self.fetch_articles(&sql, binds).await
    }

    async fn filter_by_category(&self, categories: &[String]) -> Result<Vec<Article>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let mut binds = Vec::new();
        let sql = format!(
            "SELECT {} FROM articles WHERE {} ORDER BY publication_date DESC",
            ARTICLE_COLUMNS,
            category_clause(categories, &mut binds)
        );
        self.fetch_articles(&sql, binds).await
    }

    async fn filter_by_source(&self, sources: &[String]) -> Result<Vec<Article>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let mut binds = Vec::new();
        let sql = format!(
            "SELECT {} FROM articles WHERE {} ORDER BY publication_date DESC",
            ARTICLE_COLUMNS,
            source_clause(sources, &mut binds)
        );
        self.fetch_articles(&sql, binds).await
    }

    async fn filter_by_score(&self, threshold: f64) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {} FROM articles WHERE relevance_score >= ? \
             ORDER BY relevance_score DESC, publication_date DESC",
            ARTICLE_COLUMNS
        );
        self.fetch_articles(&sql, vec![Bind::Real(threshold)]).await
    }

    async fn filter_by_radius(&self, center: Location, radius_km: f64) -> Result<Vec<Article>> {
        // Latitude box in SQL, exact haversine in Rust.
        let delta = radius_km / KM_PER_DEGREE;
        let sql = format!(
            "SELECT {} FROM articles WHERE latitude BETWEEN ? AND ?",
            ARTICLE_COLUMNS
        );
        let binds = vec![
            Bind::Real(center.latitude - delta),
            Bind::Real(center.latitude + delta),
        ];
        let mut articles = self.fetch_articles(&sql, binds).await?;
        articles.retain(|a| a.distance_to(&center) <= radius_km);
        ordering::by_distance(&mut articles, &center);
        Ok(articles)
    }

    async fn filter(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let mut clauses = Vec::new();
        let mut binds = Vec::new();
        if let Some(category) = &query.category {
            clauses.push(category_clause(std::slice::from_ref(category), &mut binds));
        }
        if let Some(source) = &query.source {
            clauses.push(source_clause(std::slice::from_ref(source), &mut binds));
        }
        if let Some(threshold) = query.score_threshold {
            clauses.push("relevance_score >= ?".to_string());
            binds.push(Bind::Real(threshold));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM articles {} ORDER BY publication_date DESC",
            ARTICLE_COLUMNS, where_clause
        );

        let mut articles = self.fetch_articles(&sql, binds).await?;
        if let Some(location) = &query.location {
            let radius = query.radius();
            articles.retain(|a| a.distance_to(location) <= radius);
        }
        Ok(articles)
    }

    async fn distinct_sources(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT source_name FROM articles ORDER BY source_name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list sources: {}", e)))?;
        rows.iter().map(|row| column(row, "source_name")).collect()
    }

    async fn distinct_categories(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT json_each.value AS category \
             FROM articles, json_each(articles.category) ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list categories: {}", e)))?;
        rows.iter().map(|row| column(row, "category")).collect()
    }
}

#[async_trait]
impl EventStorage for SQLiteStorage {
    async fn record(&self, event: &UserEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_events
            (id, user_id, article_id, event_type, timestamp, latitude, longitude)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.user_id)
        .bind(&event.article_id)
        .bind(event.kind.as_str())
        .bind(timestamp(&event.timestamp))
        .bind(event.latitude)
        .bind(event.longitude)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to record event: {}", e)))?;
        Ok(())
    }

    async fn find_for_article(&self, article_id: &str, since: DateTime<Utc>) -> Result<Vec<UserEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, article_id, event_type, timestamp, latitude, longitude
            FROM user_events
            WHERE article_id = ? AND timestamp >= ?
            ORDER BY timestamp DESC
            "#,
        )
        .bind(article_id)
        .bind(timestamp(&since))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to load events: {}", e)))?;
        rows.iter().map(row_to_event).collect()
    }

    async fn article_ids_with_events(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT article_id FROM user_events ORDER BY article_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list event articles: {}", e)))?;
        rows.iter().map(|row| column(row, "article_id")).collect()
    }
}
