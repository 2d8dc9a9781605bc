//! HTML listing adapter: scrapes a configured listing page with CSS
//! selectors (spec §4.2's `HtmlSelectors{item,title,date,hidden_url}`).
//! `scraper` does the DOM parsing; link resolution against the page's own
//! URL mirrors `rootsignal-archive::fetchers::page::extract_links_by_pattern`'s
//! relative-to-absolute join.

use newsgate_common::parse_lenient;
use newsgate_common::config::HtmlSelectors;
use newsgate_common::Result;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::http::PageFetcher;
use crate::sources::Candidate;

pub async fn collect_html_listing(
    fetcher: &dyn PageFetcher,
    page_url: &str,
    source_label: &str,
    selectors: &HtmlSelectors,
) -> Result<Vec<Candidate>> {
    let page = fetcher.get(page_url).await?;
    let html = String::from_utf8_lossy(&page.body);
    let items = parse_listing(&html, page_url, source_label, selectors);
    if items.is_empty() {
        warn!(page_url, source_label, "html listing adapter produced zero candidates");
    } else {
        info!(page_url, source_label, items = items.len(), "html listing collected");
    }
    Ok(items)
}

fn parse_listing(html: &str, base_url: &str, source_label: &str, selectors: &HtmlSelectors) -> Vec<Candidate> {
    let (Some(item_sel), Some(title_sel), Some(date_sel), Some(url_sel)) = (
        Selector::parse(&selectors.item).ok(),
        Selector::parse(&selectors.title).ok(),
        Selector::parse(&selectors.date).ok(),
        Selector::parse(&selectors.hidden_url).ok(),
    ) else {
        return Vec::new();
    };
    let base = Url::parse(base_url).ok();
    let document = Html::parse_document(html);

    document
        .select(&item_sel)
        .filter_map(|item| {
            let raw_href = item
                .select(&url_sel)
                .next()
                .and_then(|el| el.value().attr("href").or_else(|| el.value().attr("data-url")))?;
            let raw_url = resolve(raw_href, base.as_ref())?;
            let title = item.select(&title_sel).next().map(|el| el.text().collect::<String>().trim().to_string());
            let published_at = item
                .select(&date_sel)
                .next()
                .and_then(|el| el.value().attr("datetime").map(|s| s.to_string()).or_else(|| Some(el.text().collect::<String>())))
                .and_then(|s| parse_lenient(s.trim()));
            Some(Candidate { source: source_label.to_string(), raw_url, title, published_at })
        })
        .collect()
}

fn resolve(href: &str, base: Option<&Url>) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    base?.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors() -> HtmlSelectors {
        HtmlSelectors {
            item: "div.item".to_string(),
            title: "h2".to_string(),
            date: "time".to_string(),
            hidden_url: "a".to_string(),
        }
    }

    #[test]
    fn extracts_candidates_from_listing_markup() {
        let html = r#"
        <html><body>
          <div class="item">
            <a href="/news/a">link</a>
            <h2>UBS reports earnings</h2>
            <time datetime="2026-01-02T00:00:00Z">Jan 2</time>
          </div>
        </body></html>"#;
        let items = parse_listing(html, "https://example.com/listing", "example_listing", &selectors());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].raw_url, "https://example.com/news/a");
        assert_eq!(items[0].title.as_deref(), Some("UBS reports earnings"));
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn items_missing_a_link_are_skipped() {
        let html = r#"<div class="item"><h2>No link here</h2></div>"#;
        assert!(parse_listing(html, "https://example.com", "x", &selectors()).is_empty());
    }
}
