//! RSS/Atom feed adapter, grounded on
//! `rootsignal-archive::services::feed::FeedService::fetch`.

use newsgate_common::PipelineError;
use newsgate_common::Result;
use tracing::{info, warn};

use crate::http::PageFetcher;
use crate::sources::Candidate;

/// Fetch and parse a single RSS/Atom feed into candidates, tagged with
/// `source_label` (the feed config key this URL was registered under).
pub async fn collect_feed(
    fetcher: &dyn PageFetcher,
    feed_url: &str,
    source_label: &str,
    max_items: usize,
) -> Result<Vec<Candidate>> {
    let page = fetcher.get(feed_url).await?;
    let parsed = feed_rs::parser::parse(&page.body[..]).map_err(|e| PipelineError::TransientNetwork {
        url: feed_url.to_string(),
        source: anyhow::anyhow!("feed parse failed: {e}"),
    })?;

    let mut items: Vec<Candidate> = parsed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;
            let published_at = entry.published.or(entry.updated).map(|d| d.with_timezone(&chrono::Utc));
            Some(Candidate {
                source: source_label.to_string(),
                raw_url: url,
                title: entry.title.map(|t| t.content),
                published_at,
            })
        })
        .collect();

    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items.truncate(max_items);

    if items.is_empty() {
        warn!(feed_url, source_label, "feed adapter produced zero candidates");
    } else {
        info!(feed_url, source_label, items = items.len(), "feed collected");
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_atom_feed() {
        let xml = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example</title>
  <entry>
    <title>UBS reports earnings</title>
    <link href="https://example.com/a"/>
    <id>https://example.com/a</id>
    <updated>2026-01-01T00:00:00Z</updated>
  </entry>
</feed>"#;
        let parsed = feed_rs::parser::parse(xml.as_bytes()).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].links[0].href, "https://example.com/a");
    }
}
