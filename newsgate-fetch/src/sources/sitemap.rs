//! Sitemap XML adapter. No dedicated XML parser is pulled in for this: the
//! shape needed (`<loc>`/`<lastmod>` pairs inside `<url>` elements) is
//! exactly what `rootsignal-archive::services::feed::discover_feed_urls`
//! already extracts from markup with a plain regex, so the same approach is
//! reused here rather than adding a second XML dependency.

use newsgate_common::parse_lenient;
use newsgate_common::Result;
use tracing::{info, warn};

use crate::http::PageFetcher;
use crate::sources::Candidate;

/// Collect `<url>` entries from a sitemap (or sitemap index is NOT
/// recursed into here; callers that configure an index URL get back its
/// child `<loc>` entries as candidates and must fetch each themselves if
/// they need per-article granularity one level deeper).
pub async fn collect_sitemap(fetcher: &dyn PageFetcher, sitemap_url: &str, source_label: &str) -> Result<Vec<Candidate>> {
    let page = fetcher.get(sitemap_url).await?;
    let xml = String::from_utf8_lossy(&page.body);
    let items = parse_sitemap_entries(&xml, source_label);
    if items.is_empty() {
        warn!(sitemap_url, source_label, "sitemap adapter produced zero candidates");
    } else {
        info!(sitemap_url, source_label, items = items.len(), "sitemap collected");
    }
    Ok(items)
}

fn parse_sitemap_entries(xml: &str, source_label: &str) -> Vec<Candidate> {
    let url_block = regex::Regex::new(r"(?s)<url>(.*?)</url>").expect("valid regex");
    let loc = regex::Regex::new(r"<loc>\s*([^<\s]+)\s*</loc>").expect("valid regex");
    let lastmod = regex::Regex::new(r"<lastmod>\s*([^<\s]+)\s*</lastmod>").expect("valid regex");

    url_block
        .captures_iter(xml)
        .filter_map(|block| {
            let entry = block.get(1)?.as_str();
            let raw_url = loc.captures(entry)?.get(1)?.as_str().to_string();
            let published_at = lastmod
                .captures(entry)
                .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
                .and_then(|s| parse_lenient(&s));
            Some(Candidate { source: source_label.to_string(), raw_url, title: None, published_at })
        })
        .collect()
}
