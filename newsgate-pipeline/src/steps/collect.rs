//! Collector (C3): pulls candidate metadata from feed/sitemap/JSON-API/HTML
//! sources, normalizes URLs, deduplicates within the batch, and inserts new
//! Items at stage=collected. Per-source failures are logged and swallowed so
//! the run continues with the remaining sources (spec §4.3 "Failure
//! semantics"), mirroring the per-source `buffer_unordered` fan-out in
//! `rootsignal-scout::pipeline::scrape_phase`.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use newsgate_common::config::{FeedConfig, HtmlSelectors, JsonFieldMapping};
use newsgate_common::{normalize_url, title_similarity, url_hash, Result};
use newsgate_fetch::sources::{feed, html_listing, json_api, sitemap, Candidate};
use newsgate_fetch::PageFetcher;
use newsgate_store::{NewItem, Store};
use tracing::{info, warn};

/// How many sources are fetched concurrently; each source itself is a single
/// request, so this bounds outstanding HTTP calls, not items.
pub const SOURCE_CONCURRENCY: usize = 6;

/// Titles within the same source whose Jaccard similarity is at or above
/// this are treated as the same story and only the first is kept (spec
/// §4.3 "Intra-batch dedup").
const INTRA_BATCH_TITLE_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone)]
enum SourceKind {
    Feed,
    Sitemap,
    HtmlListing(HtmlSelectors),
    Json { item_path: String, fields: JsonFieldMapping },
}

#[derive(Debug, Clone)]
struct SourceJob {
    label: String,
    url: String,
    kind: SourceKind,
}

#[derive(Debug, Default)]
pub struct CollectOutcome {
    pub candidates_seen: usize,
    pub items_inserted: usize,
}

pub async fn collect(
    store: &dyn Store,
    fetcher: &dyn PageFetcher,
    config: &FeedConfig,
    max_items_per_feed: usize,
) -> Result<CollectOutcome> {
    let jobs = build_jobs(config);
    let job_count = jobs.len();
    info!(sources = job_count, "collection starting");

    let per_source: Vec<Vec<Candidate>> = stream::iter(jobs.into_iter().map(|job| async move {
        match run_job(fetcher, &job, max_items_per_feed).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(source = job.label, url = job.url, error = %e, "source collection failed, skipping");
                Vec::new()
            }
        }
    }))
    .buffer_unordered(SOURCE_CONCURRENCY)
    .collect()
    .await;

    let mut candidates_seen = 0usize;
    let mut items_inserted = 0usize;
    let mut seen_hashes: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut accepted_titles_by_source: std::collections::HashMap<String, Vec<String>> =
        std::collections::HashMap::new();

    for batch in per_source {
        for candidate in batch {
            candidates_seen += 1;
            let normalized = normalize_url(&candidate.raw_url);
            let hash = url_hash(&candidate.raw_url);

            if !seen_hashes.insert(hash.clone()) {
                continue;
            }

            if let Some(title) = candidate.title.as_deref() {
                let accepted = accepted_titles_by_source.entry(candidate.source.clone()).or_default();
                if accepted
                    .iter()
                    .any(|t| title_similarity(t, title) >= INTRA_BATCH_TITLE_THRESHOLD)
                {
                    continue;
                }
                accepted.push(title.to_string());
            }

            let item = store
                .upsert_item(NewItem {
                    source: candidate.source,
                    raw_url: candidate.raw_url,
                    normalized_url: normalized,
                    url_hash: hash,
                    title: candidate.title,
                    published_at: candidate.published_at,
                    first_seen_at: Utc::now(),
                })
                .await?;
            if item.pipeline_stage == newsgate_common::types::PipelineStage::Collected {
                items_inserted += 1;
            }
        }
    }

    info!(candidates_seen, items_inserted, "collection complete");
    Ok(CollectOutcome { candidates_seen, items_inserted })
}

async fn run_job(fetcher: &dyn PageFetcher, job: &SourceJob, max_items: usize) -> Result<Vec<Candidate>> {
    match &job.kind {
        SourceKind::Feed => feed::collect_feed(fetcher, &job.url, &job.label, max_items).await,
        SourceKind::Sitemap => sitemap::collect_sitemap(fetcher, &job.url, &job.label).await,
        SourceKind::HtmlListing(selectors) => {
            html_listing::collect_html_listing(fetcher, &job.url, &job.label, selectors).await
        }
        SourceKind::Json { item_path, fields } => {
            json_api::collect_json_api(fetcher, &job.url, &job.label, item_path, fields).await
        }
    }
}

fn build_jobs(config: &FeedConfig) -> Vec<SourceJob> {
    let mut jobs = Vec::new();

    for (source, urls) in &config.rss {
        for url in urls {
            jobs.push(SourceJob { label: source.clone(), url: url.clone(), kind: SourceKind::Feed });
        }
    }
    for (source, urls) in &config.additional_rss {
        for url in urls {
            jobs.push(SourceJob { label: source.clone(), url: url.clone(), kind: SourceKind::Feed });
        }
    }
    if let Some(urls) = &config.google_news_rss {
        for url in urls {
            jobs.push(SourceJob {
                label: "google_news".to_string(),
                url: url.clone(),
                kind: SourceKind::Feed,
            });
        }
    }
    for (source, urls) in &config.sitemaps {
        for url in urls {
            jobs.push(SourceJob { label: source.clone(), url: url.clone(), kind: SourceKind::Sitemap });
        }
    }
    for (source, html_cfg) in &config.html {
        jobs.push(SourceJob {
            label: source.clone(),
            url: html_cfg.url.clone(),
            kind: SourceKind::HtmlListing(html_cfg.selectors.clone()),
        });
    }
    for (source, json_cfg) in &config.json {
        jobs.push(SourceJob {
            label: source.clone(),
            url: json_cfg.url.clone(),
            kind: SourceKind::Json { item_path: json_cfg.item_path.clone(), fields: json_cfg.fields.clone() },
        });
    }

    jobs
}
