//! Cross-run topic deduplicator (C9): compares each new summary against
//! signatures left by earlier runs the same day and marks repeats so the
//! digest builder only sees genuinely new coverage (spec §4.9). The first
//! run of a day has no prior signatures to compare against, so every new
//! summary is UNIQUE by construction.

use chrono::{NaiveDate, Utc};
use newsgate_common::types::{DedupDecision, DeduplicationLogEntry, TopicSignature};
use newsgate_common::Result;
use newsgate_oracle::Oracle;
use newsgate_store::Store;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// How many of the most recent prior signatures are offered to the oracle
/// as comparison context per new summary.
const COMPARISON_WINDOW: usize = 10;

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub compared: usize,
    pub duplicates: usize,
    pub unique: usize,
}

pub async fn deduplicate_across_runs(store: &dyn Store, oracle: &dyn Oracle, date: NaiveDate, topic: &str) -> Result<DedupOutcome> {
    let new_summaries = store.summaries_for_date_topic(date, topic, true).await?;
    let prior_signatures = store.signatures_for_date(date).await?;
    let next_seq = prior_signatures.iter().map(|s| s.run_sequence).max().unwrap_or(0) + 1;

    let mut outcome = DedupOutcome::default();
    let mut fresh_signatures = Vec::new();

    for (summary, item, _cluster) in new_summaries {
        outcome.compared += 1;
        let started = Instant::now();

        if prior_signatures.is_empty() {
            outcome.unique += 1;
            store
                .insert_dedup_log(DeduplicationLogEntry {
                    date,
                    new_article_id: item.id,
                    matched_signature_id: None,
                    decision: DedupDecision::Unique,
                    confidence_score: None,
                    processing_time_ms: started.elapsed().as_millis() as i64,
                    created_at: Utc::now(),
                })
                .await?;
            fresh_signatures.push(new_signature(date, &summary.summary, topic, item.id, next_seq));
            continue;
        }

        let window: Vec<&TopicSignature> = prior_signatures.iter().take(COMPARISON_WINDOW).collect();
        let previous_context = window
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Previous Article {} (ID: {}):\n{}", i + 1, s.signature_id, s.article_summary))
            .collect::<Vec<_>>()
            .join("\n\n");

        let comparison = match oracle.compare_topic(&previous_context, item.title.as_deref().unwrap_or(""), &summary.summary).await {
            Ok(comparison) => comparison,
            Err(e) => {
                tracing::warn!(item_id = item.id, error = %e, "topic comparison failed, treating as unique");
                newsgate_oracle::TopicComparison { is_duplicate: false, matched_index: None }
            }
        };

        if comparison.is_duplicate {
            outcome.duplicates += 1;
            let matched = comparison.matched_index.and_then(|idx| window.get(idx)).or_else(|| window.first());
            if let Some(matched) = matched {
                store.mark_topic_covered(item.id, &matched.signature_id).await?;
            }
            store
                .insert_dedup_log(DeduplicationLogEntry {
                    date,
                    new_article_id: item.id,
                    matched_signature_id: matched.map(|s| s.signature_id.clone()),
                    decision: DedupDecision::Duplicate,
                    confidence_score: None,
                    processing_time_ms: started.elapsed().as_millis() as i64,
                    created_at: Utc::now(),
                })
                .await?;
        } else {
            outcome.unique += 1;
            store
                .insert_dedup_log(DeduplicationLogEntry {
                    date,
                    new_article_id: item.id,
                    matched_signature_id: None,
                    decision: DedupDecision::Unique,
                    confidence_score: None,
                    processing_time_ms: started.elapsed().as_millis() as i64,
                    created_at: Utc::now(),
                })
                .await?;
            fresh_signatures.push(new_signature(date, &summary.summary, topic, item.id, next_seq));
        }
    }

    store.insert_signatures(fresh_signatures).await?;
    info!(date = %date, topic, compared = outcome.compared, duplicates = outcome.duplicates, unique = outcome.unique, "cross-run dedup complete");
    Ok(outcome)
}

fn new_signature(date: NaiveDate, summary: &str, topic: &str, item_id: i64, run_sequence: i32) -> TopicSignature {
    TopicSignature {
        signature_id: Uuid::new_v4().to_string(),
        date,
        article_summary: summary.to_string(),
        topic_theme: topic.to_string(),
        source_article_id: item_id,
        run_sequence,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc as ChronoUtc};
    use newsgate_common::types::Summary;
    use newsgate_oracle::{MockOracle, TopicComparison};
    use newsgate_store::{InMemoryStore, NewItem, TriageUpdate};

    async fn seeded_item_with_summary(store: &InMemoryStore, url: &str, title: &str, summary_text: &str) -> i64 {
        let day = ChronoUtc.with_ymd_and_hms(2026, 7, 31, 10, 0, 0).unwrap();
        let item = store
            .upsert_item(NewItem {
                source: "nzz".into(),
                raw_url: url.into(),
                normalized_url: url.into(),
                url_hash: url.into(),
                title: Some(title.into()),
                published_at: Some(day),
                first_seen_at: day,
            })
            .await
            .unwrap();
        store
            .record_triage(
                item.id,
                TriageUpdate { run_id: "run-1".into(), triage_topic: "creditreform_insights".into(), triage_confidence: 0.9, is_match: true },
            )
            .await
            .unwrap();
        store
            .upsert_summary(Summary {
                item_id: item.id,
                topic: "creditreform_insights".into(),
                model: "gpt-5-mini".into(),
                summary: summary_text.into(),
                key_points: vec![],
                entities: Default::default(),
                created_at: day,
                topic_already_covered: false,
                cross_run_cluster_id: None,
            })
            .await
            .unwrap();
        item.id
    }

    #[tokio::test]
    async fn first_run_of_day_marks_everything_unique() {
        let store = InMemoryStore::new();
        let _id = seeded_item_with_summary(&store, "https://a", "UBS news", "UBS reports record profits.").await;
        let oracle = MockOracle::failing();

        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let outcome = deduplicate_across_runs(&store, &oracle, date, "creditreform_insights").await.unwrap();
        assert_eq!(outcome.unique, 1);
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(store.signatures_for_date(date).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_verdict_marks_topic_covered() {
        let store = InMemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        store
            .insert_signatures(vec![TopicSignature {
                signature_id: "sig-1".into(),
                date,
                article_summary: "UBS reports record profits.".into(),
                topic_theme: "creditreform_insights".into(),
                source_article_id: 1,
                run_sequence: 1,
                created_at: ChronoUtc.with_ymd_and_hms(2026, 7, 31, 8, 0, 0).unwrap(),
            }])
            .await
            .unwrap();
        let id = seeded_item_with_summary(&store, "https://b", "UBS news again", "UBS reported record profits again today.").await;

        let oracle = MockOracle::new().with_comparison(TopicComparison { is_duplicate: true, matched_index: Some(0) });
        let outcome = deduplicate_across_runs(&store, &oracle, date, "creditreform_insights").await.unwrap();
        assert_eq!(outcome.duplicates, 1);

        let summary = store.get_summary(id).await.unwrap().unwrap();
        assert!(summary.topic_already_covered);
        assert_eq!(summary.cross_run_cluster_id.as_deref(), Some("sig-1"));
    }

    #[tokio::test]
    async fn oracle_error_during_comparison_defaults_to_unique() {
        let store = InMemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        store
            .insert_signatures(vec![TopicSignature {
                signature_id: "sig-1".into(),
                date,
                article_summary: "UBS reports record profits.".into(),
                topic_theme: "creditreform_insights".into(),
                source_article_id: 1,
                run_sequence: 1,
                created_at: ChronoUtc.with_ymd_and_hms(2026, 7, 31, 8, 0, 0).unwrap(),
            }])
            .await
            .unwrap();
        let id = seeded_item_with_summary(&store, "https://b", "UBS news again", "Different coverage entirely.").await;

        let oracle = MockOracle::failing();
        let outcome = deduplicate_across_runs(&store, &oracle, date, "creditreform_insights").await.unwrap();
        assert_eq!(outcome.unique, 1);
        assert_eq!(outcome.duplicates, 0);
        let summary = store.get_summary(id).await.unwrap().unwrap();
        assert!(!summary.topic_already_covered);
        assert_eq!(store.signatures_for_date(date).await.unwrap().len(), 2);
    }
}
