//! JSON API adapter, config-driven per `JsonSourceConfig` /
//! `JsonFieldMapping`: a dot-separated path to the item array, and a
//! dot-separated path per field within each item.

use newsgate_common::parse_lenient;
use newsgate_common::config::JsonFieldMapping;
use newsgate_common::{PipelineError, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::http::PageFetcher;
use crate::sources::Candidate;

pub async fn collect_json_api(
    fetcher: &dyn PageFetcher,
    api_url: &str,
    source_label: &str,
    item_path: &str,
    fields: &JsonFieldMapping,
) -> Result<Vec<Candidate>> {
    let page = fetcher.get(api_url).await?;
    let body: Value = serde_json::from_slice(&page.body).map_err(|e| PipelineError::TransientNetwork {
        url: api_url.to_string(),
        source: anyhow::anyhow!("json parse failed: {e}"),
    })?;

    let items = navigate(&body, item_path).and_then(|v| v.as_array().cloned()).unwrap_or_default();

    let candidates: Vec<Candidate> = items
        .iter()
        .filter_map(|item| {
            let raw_url = navigate(item, &fields.url)?.as_str()?.to_string();
            let title = navigate(item, &fields.title).and_then(|v| v.as_str()).map(|s| s.to_string());
            let published_at = navigate(item, &fields.published_at)
                .and_then(|v| v.as_str())
                .and_then(parse_lenient);
            Some(Candidate { source: source_label.to_string(), raw_url, title, published_at })
        })
        .collect();

    if candidates.is_empty() {
        warn!(api_url, source_label, "json api adapter produced zero candidates");
    } else {
        info!(api_url, source_label, items = candidates.len(), "json api collected");
    }
    Ok(candidates)
}

/// Walk a dot-separated path (`"data.articles"`) through nested objects.
/// An empty path returns the root value unchanged.
fn navigate<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, key| current.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> JsonFieldMapping {
        JsonFieldMapping {
            url: "link".to_string(),
            title: "headline".to_string(),
            published_at: "date".to_string(),
        }
    }

    #[test]
    fn navigates_nested_item_array() {
        let body: Value = serde_json::json!({
            "data": {
                "articles": [
                    {"link": "https://example.com/a", "headline": "A", "date": "2026-01-01T00:00:00Z"}
                ]
            }
        });
        let items = navigate(&body, "data.articles").unwrap().as_array().unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn missing_field_is_skipped_not_panicked() {
        let m = mapping();
        let item = serde_json::json!({"headline": "A"});
        assert!(navigate(&item, &m.url).is_none());
    }
}
