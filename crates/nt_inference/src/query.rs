//! Prompts for the chat model and decoding of its query-analysis reply.

use nt_core::{Error, Intent, QueryAnalysis, Result};
use serde::Deserialize;

pub fn analysis_prompt(query: &str, sources: &[String], categories: &[String]) -> String {
    format!(
        r#"You turn news search queries into structured filters for a news retrieval system.

Reply with ONLY one JSON object in exactly this shape:

{{
  "entities": [],
  "intent": {{
    "category": {{ "values": [] }},
    "source": {{ "values": [] }},
    "nearby": {{ "lat": null, "lon": null }}
  }}
}}

Rules:
- category.values may only contain entries from Valid Categories, in lowercase. Match loosely (case, word order, small typos).
- source.values may only contain entries from Allowed Sources, spelled as listed. Match abbreviations and partial names; include every variant of a matching cluster. Ignore generic words like "news", "updates" or "articles".
- If the query names a real place, add it to entities and set nearby.lat / nearby.lon to its approximate coordinates (for example Mumbai is 19.07, 72.88). Otherwise leave them null.
- entities lists the people, organisations, places, events and concepts in the query, spelled as written.

Valid Categories: {categories}

Allowed Sources: {sources}

Query: "{query}"
"#,
        categories = categories.join(", "),
        sources = sources.join(", "),
        query = query,
    )
}

pub fn summary_prompt(title: &str, description: &str) -> String {
    format!(
        "Summarize the following news article in 2-3 sentences:\n\nTitle: {}\nDescription: {}\n\nSummary:",
        title, description
    )
}

#[derive(Debug, Default, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    intent: RawIntent,
}

#[derive(Debug, Default, Deserialize)]
struct RawIntent {
    #[serde(default)]
    category: RawValues,
    #[serde(default)]
    source: RawValues,
    #[serde(default)]
    nearby: RawNearby,
}

#[derive(Debug, Default, Deserialize)]
struct RawValues {
    #[serde(default)]
    values: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNearby {
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Decode the JSON object embedded in a chat reply.
///
/// The object is taken from the first `{` to the last `}`, so surrounding
/// prose or code fences are ignored. Only populated intents are emitted, in
/// category, source, nearby order.
pub fn parse_query_analysis(response: &str) -> Result<QueryAnalysis> {
    let (start, end) = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(Error::Inference(
                "no valid JSON found in query analysis response".to_string(),
            ))
        }
    };

    let raw: RawAnalysis = serde_json::from_str(&response[start..=end])
        .map_err(|e| Error::Inference(format!("failed to parse query analysis: {}", e)))?;

    let mut intents = Vec::new();
    let categories = clean(raw.intent.category.values);
    if !categories.is_empty() {
        intents.push(Intent::Category { values: categories });
    }
    let sources = clean(raw.intent.source.values);
    if !sources.is_empty() {
        intents.push(Intent::Source { values: sources });
    }
    if let RawNearby {
        lat: Some(lat),
        lon: Some(lon),
    } = raw.intent.nearby
    {
        intents.push(Intent::Nearby {
            latitude: Some(lat),
            longitude: Some(lon),
            radius_km: None,
        });
    }

    Ok(QueryAnalysis {
        entities: clean(raw.entities),
        intents,
    })
}

fn clean(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_core::IntentKind;

    #[test]
    fn test_parse_full_response() {
        let response = r#"Sure! Here is the analysis:
```json
{
  "entities": ["News18", "Mumbai", "technology"],
  "intent": {
    "category": { "values": ["technology"] },
    "source": { "values": ["News18"] },
    "nearby": { "lat": 19.07, "lon": 72.88 }
  }
}
```"#;
        let analysis = parse_query_analysis(response).unwrap();
        assert_eq!(analysis.entities, ["News18", "Mumbai", "technology"]);
        assert_eq!(
            analysis.intents,
            vec![
                Intent::category(["technology"]),
                Intent::source(["News18"]),
                Intent::Nearby {
                    latitude: Some(19.07),
                    longitude: Some(72.88),
                    radius_km: None,
                },
            ]
        );
    }

    #[test]
    fn test_empty_intents_are_dropped() {
        let response = r#"{"entities": ["Elon Musk", " "], "intent": {"category": {"values": []}, "nearby": {"lat": 12.0, "lon": null}}}"#;
        let analysis = parse_query_analysis(response).unwrap();
        assert_eq!(analysis.entities, ["Elon Musk"]);
        assert!(analysis.intents.is_empty());
        assert!(!analysis.has_intent(IntentKind::Nearby));
    }

    #[test]
    fn test_garbage_is_an_inference_error() {
        assert!(matches!(parse_query_analysis("I cannot help"), Err(Error::Inference(_))));
        assert!(matches!(parse_query_analysis("} backwards {"), Err(Error::Inference(_))));
        assert!(matches!(parse_query_analysis("{ not json }"), Err(Error::Inference(_))));
    }

    #[test]
    fn test_prompt_lists_allowed_values() {
        let prompt = analysis_prompt(
            "tech news near Paris",
            &["Reuters".to_string(), "ANI".to_string()],
            &["technology".to_string(), "world".to_string()],
        );
        assert!(prompt.contains("Valid Categories: technology, world"));
        assert!(prompt.contains("Allowed Sources: Reuters, ANI"));
        assert!(prompt.contains("Query: \"tech news near Paris\""));
    }
}
