//! Content extraction (C6), grounded on
//! `rootsignal-archive::readability::html_to_markdown` for the heuristic
//! path and `rootsignal-scout::pipeline::scraper::ChromeScraper::scrape_raw`
//! for the laxer bare-extraction fallback. The chain is heuristic first,
//! then (only if that's thin) a JSON-LD `articleBody` scan, then (if still
//! thin) bare extraction with no Readability filtering at all. Headless-
//! browser extraction is an external collaborator this crate does not
//! implement: [`ExtractionMethod::Browser`] stays a defined, reachable
//! outcome but [`ContentExtractor::extract`] never produces it itself.

use newsgate_common::types::ExtractionMethod;
use newsgate_common::{PipelineError, Result};
use spider_transformations::transformation::content::{transform_content_input, ReturnFormat, TransformConfig, TransformInput};
use tracing::{debug, warn};

use crate::http::PageFetcher;

/// Below this many characters, a single extraction attempt is treated as too
/// thin to accept outright and the chain falls through to the next tier.
pub const MIN_HEURISTIC_CHARS: usize = 100;

/// Below this many characters, the final extracted text (whichever tier
/// produced it) is rejected outright (mirrors the `length(extracted_text) >=
/// 600` gate the store applies when selecting items awaiting summary).
pub const MIN_USABLE_CHARS: usize = 600;

pub struct ExtractionOutcome {
    pub text: String,
    pub method: ExtractionMethod,
}

pub struct ContentExtractor<'a> {
    http: &'a dyn PageFetcher,
}

impl<'a> ContentExtractor<'a> {
    pub fn new(http: &'a dyn PageFetcher) -> Self {
        Self { http }
    }

    pub async fn extract(&self, url: &str) -> Result<ExtractionOutcome> {
        let page = self.http.get(url).await?;
        let html = String::from_utf8_lossy(&page.body).into_owned();

        let heuristic = html_to_markdown(html.as_bytes(), Some(&page.final_url));
        let mut text = heuristic;

        if text.chars().count() < MIN_HEURISTIC_CHARS {
            if let Some(body) = extract_json_ld_article_body(&html) {
                debug!(url, "heuristic extraction thin, trying json-ld articleBody");
                if body.chars().count() >= MIN_HEURISTIC_CHARS {
                    text = body;
                }
            }
        }

        if text.chars().count() < MIN_HEURISTIC_CHARS {
            debug!(url, "json-ld fallback thin or absent, trying bare extraction");
            let bare = bare_extract_text(html.as_bytes(), Some(&page.final_url));
            if bare.chars().count() > text.chars().count() {
                text = bare;
            }
        }

        let chars = text.chars().count();
        if chars < MIN_USABLE_CHARS {
            warn!(url, chars, "extraction produced insufficient text");
            return Err(PipelineError::ExtractionInsufficient { url: url.to_string(), chars });
        }

        Ok(ExtractionOutcome { text, method: ExtractionMethod::Heuristic })
    }
}

fn html_to_markdown(html: &[u8], url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };
    transform_content_input(input, &config)
}

/// Last-resort extraction with no Readability or main-content filtering,
/// closer to `trafilatura.bare_extraction()` than the heuristic tier above:
/// it keeps whatever text nodes survive basic HTML cleanup even on pages the
/// heuristic pass judges to have no clear "main content" region.
fn bare_extract_text(html: &[u8], url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: false,
        main_content: false,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };
    transform_content_input(input, &config)
}

/// Pull `articleBody` out of any `<script type="application/ld+json">` block
/// whose JSON parses and contains that field, either at the top level or
/// inside a `@graph` array (both shapes appear across Swiss news sites).
fn extract_json_ld_article_body(html: &str) -> Option<String> {
    let script_re =
        regex::Regex::new(r#"(?is)<script[^>]+type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
            .expect("valid regex");

    for cap in script_re.captures_iter(html) {
        let raw = cap.get(1)?.as_str();
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else { continue };
        if let Some(body) = find_article_body(&value) {
            return Some(body);
        }
    }
    None
}

fn find_article_body(value: &serde_json::Value) -> Option<String> {
    if let Some(body) = value.get("articleBody").and_then(|v| v.as_str()) {
        return Some(body.to_string());
    }
    if let Some(graph) = value.get("@graph").and_then(|v| v.as_array()) {
        for node in graph {
            if let Some(body) = node.get("articleBody").and_then(|v| v.as_str()) {
                return Some(body.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPageFetcher;

    fn long_article_html(marker: &str) -> String {
        let body = format!("{marker} reports markets moved sharply today on new regulatory measures. ").repeat(10);
        format!(r#"<html><body><article>{body}</article></body></html>"#)
    }

    #[tokio::test]
    async fn heuristic_extraction_is_tried_first_and_accepted_on_its_own() {
        let fetcher = MockPageFetcher::new().with_page("https://a", long_article_html("heuristic"));
        let extractor = ContentExtractor::new(&fetcher);
        let outcome = extractor.extract("https://a").await.unwrap();
        assert!(outcome.text.contains("heuristic"));
    }

    #[tokio::test]
    async fn json_ld_is_only_tried_when_heuristic_text_is_thin() {
        let long_body = "full article body text ".repeat(40);
        let html = format!(
            r#"<html><body><p>short</p><script type="application/ld+json">{{"@type":"NewsArticle","articleBody":"{long_body}"}}</script></body></html>"#
        );
        let fetcher = MockPageFetcher::new().with_page("https://b", html);
        let extractor = ContentExtractor::new(&fetcher);
        let outcome = extractor.extract("https://b").await.unwrap();
        assert!(outcome.text.contains("full article body text"));
    }

    #[tokio::test]
    async fn content_with_no_clear_article_wrapper_still_extracts_via_some_tier() {
        let long_body = "plain text node with no article wrapper repeated many times. ".repeat(40);
        let html = format!(r#"<html><body><div>{long_body}</div></body></html>"#);
        let fetcher = MockPageFetcher::new().with_page("https://c", html);
        let extractor = ContentExtractor::new(&fetcher);
        let outcome = extractor.extract("https://c").await.unwrap();
        assert!(outcome.text.chars().count() >= MIN_USABLE_CHARS);
    }

    #[tokio::test]
    async fn all_tiers_thin_is_rejected() {
        let fetcher = MockPageFetcher::new().with_page("https://d", "<html><body>too short</body></html>");
        let extractor = ContentExtractor::new(&fetcher);
        assert!(extractor.extract("https://d").await.is_err());
    }

    #[test]
    fn finds_article_body_at_top_level() {
        let html = r#"<script type="application/ld+json">{"@type":"NewsArticle","articleBody":"hello world"}</script>"#;
        assert_eq!(extract_json_ld_article_body(html), Some("hello world".to_string()));
    }

    #[test]
    fn finds_article_body_inside_graph() {
        let html = r#"<script type="application/ld+json">{"@graph":[{"@type":"Organization"},{"@type":"NewsArticle","articleBody":"nested body"}]}</script>"#;
        assert_eq!(extract_json_ld_article_body(html), Some("nested body".to_string()));
    }

    #[test]
    fn malformed_json_ld_is_skipped_not_panicked() {
        let html = r#"<script type="application/ld+json">{not json</script>"#;
        assert_eq!(extract_json_ld_article_body(html), None);
    }

    #[test]
    fn absent_json_ld_returns_none() {
        assert_eq!(extract_json_ld_article_body("<html><body>plain</body></html>"), None);
    }
}
