//! Selection gate (C5): ranks matched-but-unranked items for a run by
//! confidence then recency, and promotes the top N to `Selected` while the
//! remainder become `MatchedNotSelected` (spec §4.5).

use newsgate_common::Result;
use newsgate_store::{ItemQuery, Store};
use tracing::info;

#[derive(Debug, Default)]
pub struct SelectOutcome {
    pub candidates: usize,
    pub selected: usize,
}

pub async fn select(store: &dyn Store, run_id: &str, max_articles_per_run: usize) -> Result<SelectOutcome> {
    let mut matched = store.query_items(ItemQuery::MatchedForRun { run_id }).await?;
    matched.sort_by(|a, b| {
        b.triage_confidence
            .partial_cmp(&a.triage_confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.first_seen_at.cmp(&a.first_seen_at))
    });

    let candidates = matched.len();
    let selected_ids: Vec<i64> = matched.iter().take(max_articles_per_run).map(|i| i.id).collect();
    let rest_ids: Vec<i64> = matched.iter().skip(max_articles_per_run).map(|i| i.id).collect();

    store.assign_selection(run_id, &selected_ids, &rest_ids).await?;

    info!(run_id, candidates, selected = selected_ids.len(), "selection complete");
    Ok(SelectOutcome { candidates, selected: selected_ids.len() })
}
