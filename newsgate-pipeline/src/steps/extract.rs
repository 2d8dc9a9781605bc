//! Content extractor step (C6): resolves Google News redirects first, then
//! runs heuristic extraction, persisting either an `ExtractedArticle` or a
//! failure count per item (spec §4.6). Items are processed with bounded
//! concurrency since extraction is dominated by page-fetch latency.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use newsgate_common::types::ExtractedArticle;
use newsgate_common::Result;
use newsgate_fetch::{redirect, ContentExtractor, PageFetcher};
use newsgate_store::{ItemQuery, Store};
use tracing::{info, warn};

pub const EXTRACT_CONCURRENCY: usize = 5;

#[derive(Debug, Default)]
pub struct ExtractOutcome {
    pub attempted: usize,
    pub extracted: usize,
    pub failed: usize,
}

/// `skip_gnews_redirects` excludes known aggregator-redirector URLs up
/// front rather than attempting to resolve them (spec §4.6 step 1); it
/// defaults to `true` since redirect resolution has no reliable browser
/// fallback here (see `redirect` module docs).
pub async fn extract_content(store: &dyn Store, fetcher: &dyn PageFetcher, run_id: &str, skip_gnews_redirects: bool) -> Result<ExtractOutcome> {
    let items = store.query_items(ItemQuery::SelectedAwaitingExtraction { run_id }).await?;
    let attempted = items.len();
    let extractor = ContentExtractor::new(fetcher);

    let outcomes: Vec<bool> = stream::iter(items.into_iter().map(|item| {
        let extractor = &extractor;
        async move {
            if skip_gnews_redirects && redirect::is_google_news_redirect(&item.normalized_url) {
                warn!(item_id = item.id, "skipping known aggregator redirector");
                let _ = store.record_extraction_failure(item.id, "skipped aggregator redirector").await;
                return false;
            }

            let resolved_url = match redirect::resolve(fetcher, &item.normalized_url).await {
                Ok(Some(url)) => url,
                Ok(None) => {
                    warn!(item_id = item.id, "google news redirect did not resolve");
                    let _ = store.record_extraction_failure(item.id, "unresolved redirect").await;
                    return false;
                }
                Err(e) => {
                    warn!(item_id = item.id, error = %e, "redirect resolution failed");
                    let _ = store.record_extraction_failure(item.id, &e.to_string()).await;
                    return false;
                }
            };

            match extractor.extract(&resolved_url).await {
                Ok(outcome) => {
                    let article = ExtractedArticle {
                        item_id: item.id,
                        extracted_text: outcome.text,
                        extraction_method: outcome.method,
                        extracted_at: Utc::now(),
                        failure_count: 0,
                        last_failure_reason: None,
                    };
                    match store.upsert_extracted_article(article).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(item_id = item.id, error = %e, "failed to persist extracted article");
                            false
                        }
                    }
                }
                Err(e) => {
                    warn!(item_id = item.id, error = %e, "content extraction failed");
                    let _ = store.record_extraction_failure(item.id, &e.to_string()).await;
                    false
                }
            }
        }
    }))
    .buffer_unordered(EXTRACT_CONCURRENCY)
    .collect()
    .await;

    let extracted = outcomes.iter().filter(|ok| **ok).count();
    let failed = attempted - extracted;
    info!(run_id, attempted, extracted, failed, "extraction complete");
    Ok(ExtractOutcome { attempted, extracted, failed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use chrono::Utc as ChronoUtc;
    use newsgate_fetch::MockPageFetcher;
    use newsgate_store::{InMemoryStore, NewItem, TriageUpdate};

    fn long_article_html() -> String {
        let body = "Swiss franc markets moved sharply today as regulators announced new measures. ".repeat(10);
        format!(r#"<html><body><article>{body}</article></body></html>"#)
    }

    async fn seeded_selected_item(store: &InMemoryStore, url: &str) -> i64 {
        let item = store
            .upsert_item(NewItem {
                source: "nzz".into(),
                raw_url: url.into(),
                normalized_url: url.into(),
                url_hash: url.into(),
                title: Some("t".into()),
                published_at: Some(ChronoUtc::now()),
                first_seen_at: ChronoUtc::now(),
            })
            .await
            .unwrap();
        store
            .record_triage(
                item.id,
                TriageUpdate { run_id: "run-1".into(), triage_topic: "topic".into(), triage_confidence: 0.9, is_match: true },
            )
            .await
            .unwrap();
        store.assign_selection("run-1", &[item.id], &[]).await.unwrap();
        item.id
    }

    #[tokio::test]
    async fn extracts_and_persists_usable_article() {
        let store = InMemoryStore::new();
        let id = seeded_selected_item(&store, "https://nzz.ch/a").await;
        let fetcher = MockPageFetcher::new().with_page("https://nzz.ch/a", long_article_html());

        let outcome = extract_content(&store, &fetcher, "run-1", true).await.unwrap();
        assert_eq!(outcome.extracted, 1);
        assert_eq!(outcome.failed, 0);
        assert!(store.get_extracted_article(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn thin_page_is_recorded_as_failure() {
        let store = InMemoryStore::new();
        let id = seeded_selected_item(&store, "https://nzz.ch/b").await;
        let fetcher = MockPageFetcher::new().with_page("https://nzz.ch/b", "<html><body>too short</body></html>");

        let outcome = extract_content(&store, &fetcher, "run-1", true).await.unwrap();
        assert_eq!(outcome.extracted, 0);
        assert_eq!(outcome.failed, 1);
        let article = store.get_extracted_article(id).await.unwrap().unwrap();
        assert_eq!(article.failure_count, 1);
    }

    #[tokio::test]
    async fn gnews_redirect_is_skipped_by_default_without_attempting_resolution() {
        let store = InMemoryStore::new();
        let id = seeded_selected_item(&store, "https://news.google.com/rss/articles/CBMiXYZ").await;
        // No page registered for this URL: if resolution were attempted, the mock
        // fetcher would return an error rather than a skip outcome.
        let fetcher = MockPageFetcher::new();

        let outcome = extract_content(&store, &fetcher, "run-1", true).await.unwrap();
        assert_eq!(outcome.extracted, 0);
        assert_eq!(outcome.failed, 1);
        let article = store.get_extracted_article(id).await.unwrap();
        assert!(article.is_none());
    }

    #[tokio::test]
    async fn gnews_redirect_is_resolved_when_the_flag_is_disabled() {
        let store = InMemoryStore::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode("https://nzz.ch/a");
        let url = format!("https://news.google.com/rss/articles/{encoded}");
        let id = seeded_selected_item(&store, &url).await;
        let fetcher = MockPageFetcher::new().with_page("https://nzz.ch/a", long_article_html());

        let outcome = extract_content(&store, &fetcher, "run-1", false).await.unwrap();
        assert_eq!(outcome.extracted, 1);
        assert!(store.get_extracted_article(id).await.unwrap().is_some());
    }
}
