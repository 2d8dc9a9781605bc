//! Summarizer (C8): produces a structured summary for every item that has
//! usable extracted text, is unclustered or the cluster primary, and has no
//! summary yet (spec §4.7, enforced by `Store::query_items(AwaitingSummary)`).

use chrono::Utc;
use futures::stream::{self, StreamExt};
use newsgate_common::types::Summary;
use newsgate_common::Result;
use newsgate_oracle::{Oracle, SummaryRequest};
use newsgate_store::{ItemQuery, Store};
use tracing::{info, warn};

pub const SUMMARIZE_CONCURRENCY: usize = 8;

#[derive(Debug, Default)]
pub struct SummarizeOutcome {
    pub attempted: usize,
    pub summarized: usize,
}

pub async fn summarize(store: &dyn Store, oracle: &dyn Oracle, run_id: &str, model: &str) -> Result<SummarizeOutcome> {
    let items = store.query_items(ItemQuery::AwaitingSummary { run_id }).await?;
    let attempted = items.len();

    let outcomes: Vec<bool> = stream::iter(items.into_iter().map(|item| async move {
        let Some(article) = store.get_extracted_article(item.id).await.ok().flatten() else {
            return false;
        };
        let Some(topic) = item.triage_topic.clone() else { return false };

        let request = SummaryRequest { title: item.title.clone().unwrap_or_default(), url: item.normalized_url.clone(), content: article.extracted_text };
        match oracle.summarize(request).await {
            Ok(summary) => {
                let row = Summary {
                    item_id: item.id,
                    topic,
                    model: model.to_string(),
                    summary: summary.summary,
                    key_points: summary.key_points,
                    entities: summary.entities,
                    created_at: Utc::now(),
                    topic_already_covered: false,
                    cross_run_cluster_id: None,
                };
                match store.upsert_summary(row).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(item_id = item.id, error = %e, "failed to persist summary");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(item_id = item.id, error = %e, "summarization failed");
                false
            }
        }
    }))
    .buffer_unordered(SUMMARIZE_CONCURRENCY)
    .collect()
    .await;

    let summarized = outcomes.iter().filter(|ok| **ok).count();
    info!(run_id, attempted, summarized, "summarization complete");
    Ok(SummarizeOutcome { attempted, summarized })
}
