use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::geo;
use crate::{Error, Result};

/// Dimensionality of embeddings produced by the default remote embedding model.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

const NAIVE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let location = Self { latitude, longitude };
        location.validate()?;
        Ok(location)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::Validation(
                "latitude must be between -90 and 90".to_string(),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::Validation(
                "longitude must be between -180 and 180".to_string(),
            ));
        }
        Ok(())
    }

    /// `(0, 0)` is used by callers to mean "no location given".
    pub fn is_unset(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }

    pub fn distance_km(&self, other: &Location) -> f64 {
        geo::distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    #[serde(rename = "publication_date", with = "publication_date")]
    pub published_at: DateTime<Utc>,
    #[serde(rename = "source_name")]
    pub source: String,
    #[serde(rename = "category", default)]
    pub categories: Vec<String>,
    pub relevance_score: f64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Article {
    pub fn location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn distance_to(&self, location: &Location) -> f64 {
        self.location().distance_km(location)
    }

    /// Description text, treating an empty string as absent.
    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.trim().is_empty())
    }

    /// Embedding usable for similarity ranking.
    pub fn usable_embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref().filter(|e| !e.is_empty())
    }

    pub fn needs_summary(&self) -> bool {
        self.summary.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    pub fn needs_embedding(&self) -> bool {
        self.usable_embedding().is_none()
    }

    pub fn has_any_category(&self, categories: &[String]) -> bool {
        self.categories
            .iter()
            .any(|own| categories.iter().any(|c| c.eq_ignore_ascii_case(own)))
    }

    /// Source match; `substring` also accepts sources containing a requested name.
    pub fn matches_source(&self, sources: &[String], substring: bool) -> bool {
        let own = self.source.to_lowercase();
        sources.iter().any(|s| {
            let wanted = s.to_lowercase();
            own == wanted || (substring && own.contains(&wanted))
        })
    }

    /// Copy for API responses, without the embedding vector.
    pub fn without_embedding(mut self) -> Self {
        self.embedding = None;
        self
    }

    /// Every problem that would stop this article from being persisted.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("title is required".to_string());
        }
        if self.url.trim().is_empty() {
            errors.push("url is required".to_string());
        } else if let Err(e) = Url::parse(&self.url) {
            errors.push(format!("url is invalid: {}", e));
        }
        if self.source.trim().is_empty() {
            errors.push("source_name is required".to_string());
        }
        if self.categories.is_empty() {
            errors.push("at least one category is required".to_string());
        }
        if !self.relevance_score.is_finite() || !(0.0..=1.0).contains(&self.relevance_score) {
            errors.push("relevance_score must be between 0 and 1".to_string());
        }
        if let Err(Error::Validation(msg)) = self.location().validate() {
            errors.push(msg);
        }

        errors
    }

    /// Problem with a caller-supplied embedding of the wrong size.
    /// An empty vector counts as absent and is regenerated on enrichment.
    pub fn embedding_error(&self, dimensions: usize) -> Option<String> {
        let len = self.embedding.as_ref()?.len();
        (len != 0 && len != dimensions)
            .then(|| format!("embedding must have {} dimensions, got {}", dimensions, len))
    }

    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors.join("; ")))
        }
    }
}

/// Accepts both `2006-01-02T15:04:05` (taken as UTC) and RFC 3339.
pub fn parse_publication_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, NAIVE_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            Error::Validation(format!(
                "invalid publication_date '{}': expected {} or RFC 3339 ({})",
                raw, NAIVE_DATE_FORMAT, e
            ))
        })
}

mod publication_date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_publication_date(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    View,
    Click,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::View => "view",
            EventKind::Click => "click",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "view" => Ok(EventKind::View),
            "click" => Ok(EventKind::Click),
            other => Err(Error::Validation(format!(
                "event_type must be either 'view' or 'click', got '{}'",
                other
            ))),
        }
    }
}

/// A user interaction with an article. Never updated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub id: String,
    pub user_id: String,
    pub article_id: String,
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

impl UserEvent {
    pub fn new(user_id: impl Into<String>, article_id: impl Into<String>, kind: EventKind, location: Location) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            article_id: article_id.into(),
            kind,
            timestamp: Utc::now(),
            latitude: location.latitude,
            longitude: location.longitude,
        }
    }

    pub fn location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::Validation("user_id field is required".to_string()));
        }
        if self.article_id.trim().is_empty() {
            return Err(Error::Validation("article_id field is required".to_string()));
        }
        self.location().validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    Category,
    Source,
    Score,
    Nearby,
    Search,
    Unknown,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntentKind::Category => "category",
            IntentKind::Source => "source",
            IntentKind::Score => "score",
            IntentKind::Nearby => "nearby",
            IntentKind::Search => "search",
            IntentKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A retrieval directive extracted from a free-text query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Intent {
    Category {
        #[serde(default)]
        values: Vec<String>,
    },
    Source {
        #[serde(default)]
        values: Vec<String>,
    },
    Score {
        #[serde(default)]
        threshold: Option<f64>,
    },
    Nearby {
        #[serde(default)]
        latitude: Option<f64>,
        #[serde(default)]
        longitude: Option<f64>,
        #[serde(default)]
        radius_km: Option<f64>,
    },
    Search {
        #[serde(default)]
        query: Vec<String>,
    },
    /// Kinds this build does not understand; skipped by the pipeline.
    #[serde(other)]
    Unknown,
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::Category { .. } => IntentKind::Category,
            Intent::Source { .. } => IntentKind::Source,
            Intent::Score { .. } => IntentKind::Score,
            Intent::Nearby { .. } => IntentKind::Nearby,
            Intent::Search { .. } => IntentKind::Search,
            Intent::Unknown => IntentKind::Unknown,
        }
    }

    pub fn category<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Intent::Category {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn source<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Intent::Source {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn nearby() -> Self {
        Intent::Nearby {
            latitude: None,
            longitude: None,
            radius_km: None,
        }
    }

    /// Coordinates carried by a `Nearby` intent, if both are present and valid.
    pub fn nearby_point(&self) -> Option<Location> {
        match self {
            Intent::Nearby {
                latitude: Some(lat),
                longitude: Some(lon),
                ..
            } => Location::new(*lat, *lon).ok(),
            _ => None,
        }
    }
}

/// Structured result of analysing a natural-language query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub intents: Vec<Intent>,
}

impl QueryAnalysis {
    pub fn has_intent(&self, kind: IntentKind) -> bool {
        self.intents.iter().any(|i| i.kind() == kind)
    }

    pub fn get_intent(&self, kind: IntentKind) -> Option<&Intent> {
        self.intents.iter().find(|i| i.kind() == kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    pub total_articles: usize,
    pub success_count: usize,
    pub error_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
}

impl LoadStats {
    /// Nothing was stored and there are errors to report.
    pub fn is_rejected(&self) -> bool {
        self.success_count == 0 && !self.validation_errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn article() -> Article {
        Article {
            id: "a1".to_string(),
            title: "Rain expected in Mumbai".to_string(),
            description: Some("Monsoon arrives early".to_string()),
            url: "https://news.example.com/mumbai-rain".to_string(),
            published_at: Utc::now(),
            source: "Times of India".to_string(),
            categories: vec!["world".to_string()],
            relevance_score: 0.8,
            latitude: 19.076,
            longitude: 72.8777,
            summary: None,
            embedding: None,
        }
    }

    #[test]
    fn test_parse_publication_date_formats() {
        let naive = parse_publication_date("2025-03-14T09:30:00").unwrap();
        assert_eq!(naive.year(), 2025);
        assert_eq!(naive.hour(), 9);

        let rfc = parse_publication_date("2025-03-14T09:30:00+02:00").unwrap();
        assert_eq!(rfc.hour(), 7);

        assert!(parse_publication_date("14/03/2025").is_err());
    }

    #[test]
    fn test_article_json_uses_wire_names() {
        let json = r#"{
            "id": "42",
            "title": "Chip exports rise",
            "description": "",
            "url": "https://example.com/chips",
            "publication_date": "2025-01-02T03:04:05",
            "source_name": "Reuters",
            "category": ["technology", "business"],
            "relevance_score": 0.91,
            "latitude": 37.77,
            "longitude": -122.41
        }"#;
        let article: Article = serde_json::from_str(json).unwrap();
        assert_eq!(article.source, "Reuters");
        assert_eq!(article.categories.len(), 2);
        assert_eq!(article.description_text(), None);
        assert!(article.needs_summary());
        assert!(article.needs_embedding());

        let value = serde_json::to_value(&article).unwrap();
        assert_eq!(value["source_name"], "Reuters");
        assert!(value.get("embedding").is_none());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut bad = article();
        bad.title = String::new();
        bad.categories.clear();
        bad.relevance_score = 1.5;
        bad.latitude = 120.0;

        let errors = bad.validation_errors();
        assert_eq!(errors.len(), 4);
        assert!(bad.validate().is_err());
        assert!(article().validate().is_ok());
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let mut bad = article();
        bad.url = "not a url".to_string();
        assert!(bad.validation_errors()[0].starts_with("url is invalid"));
    }

    #[test]
    fn test_embedding_dimensions_are_checked() {
        let mut a = article();
        assert_eq!(a.embedding_error(4), None);

        a.embedding = Some(vec![0.1, 0.2]);
        assert_eq!(
            a.embedding_error(4).as_deref(),
            Some("embedding must have 4 dimensions, got 2")
        );
        assert_eq!(a.embedding_error(2), None);

        a.embedding = Some(Vec::new());
        assert_eq!(a.embedding_error(4), None);
        assert!(a.needs_embedding());
    }

    #[test]
    fn test_category_and_source_matching() {
        let a = article();
        assert!(a.has_any_category(&["World".to_string(), "sports".to_string()]));
        assert!(!a.has_any_category(&["sports".to_string()]));

        assert!(a.matches_source(&["times of india".to_string()], false));
        assert!(!a.matches_source(&["times".to_string()], false));
        assert!(a.matches_source(&["times".to_string()], true));
    }

    #[test]
    fn test_unknown_intent_kind_deserializes() {
        let intents: Vec<Intent> = serde_json::from_str(
            r#"[{"type": "category", "values": ["tech"]}, {"type": "sentiment", "values": ["happy"]}]"#,
        )
        .unwrap();
        assert_eq!(intents[0].kind(), IntentKind::Category);
        assert_eq!(intents[1], Intent::Unknown);
    }

    #[test]
    fn test_nearby_point_requires_valid_pair() {
        let intent = Intent::Nearby {
            latitude: Some(28.61),
            longitude: Some(77.23),
            radius_km: None,
        };
        assert_eq!(intent.nearby_point(), Some(Location { latitude: 28.61, longitude: 77.23 }));
        assert_eq!(Intent::nearby().nearby_point(), None);
    }

    #[test]
    fn test_event_kind_parsing() {
        assert_eq!("Click".parse::<EventKind>().unwrap(), EventKind::Click);
        assert!("share".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_location_range() {
        assert!(Location::new(91.0, 0.0).is_err());
        assert!(Location::new(0.0, -181.0).is_err());
        assert!(Location::new(0.0, 0.0).unwrap().is_unset());
    }
}
