//! Title-cluster deduplicator (C7): groups same-day extracted matches by
//! oracle-assigned title group, picks the member with the longest extracted
//! text as primary, and records the rest as non-primary so the summarizer
//! skips them (spec §4.6/§4.7 "unclustered-or-primary").

use chrono::{NaiveDate, Utc};
use newsgate_common::types::{ArticleCluster, ClusteringMethod};
use newsgate_common::Result;
use newsgate_oracle::Oracle;
use newsgate_store::{ItemQuery, Store};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Default)]
pub struct ClusterOutcome {
    pub groups_with_duplicates: usize,
    pub items_marked_non_primary: usize,
}

pub async fn cluster_titles(store: &dyn Store, oracle: &dyn Oracle, date: NaiveDate) -> Result<ClusterOutcome> {
    let items = store.query_items(ItemQuery::ExtractedToday { date }).await?;
    if items.len() < 2 {
        return Ok(ClusterOutcome::default());
    }

    let titles: Vec<String> = items.iter().map(|i| i.title.clone().unwrap_or_default()).collect();
    let assignments = oracle.cluster_titles(&titles).await?;

    let mut by_label: HashMap<String, Vec<usize>> = HashMap::new();
    for assignment in &assignments {
        by_label.entry(assignment.group_label.clone()).or_default().push(assignment.title_index);
    }

    let mut groups_with_duplicates = 0usize;
    let mut items_marked_non_primary = 0usize;
    let mut rows = Vec::new();

    for (label, indices) in by_label {
        if indices.len() < 2 {
            continue;
        }
        groups_with_duplicates += 1;

        let mut lengths = Vec::with_capacity(indices.len());
        for &idx in &indices {
            let item = &items[idx];
            let text_len = store
                .get_extracted_article(item.id)
                .await?
                .map(|a| a.extracted_text.chars().count())
                .unwrap_or(0);
            lengths.push((idx, text_len));
        }
        let primary_idx = lengths.iter().max_by_key(|(_, len)| *len).map(|(idx, _)| *idx).unwrap();

        let cluster_id = cluster_id_for(&label, indices.len());
        for &idx in &indices {
            let is_primary = idx == primary_idx;
            if !is_primary {
                items_marked_non_primary += 1;
            }
            rows.push(ArticleCluster {
                cluster_id: cluster_id.clone(),
                article_id: items[idx].id,
                is_primary,
                similarity_score: 1.0,
                clustering_method: ClusteringMethod::GptTitleClustering,
                created_at: Utc::now(),
            });
        }
    }

    let n = rows.len();
    store.insert_cluster_rows(rows).await?;
    info!(date = %date, groups_with_duplicates, items_marked_non_primary, rows = n, "title clustering complete");
    Ok(ClusterOutcome { groups_with_duplicates, items_marked_non_primary })
}

fn cluster_id_for(label: &str, size: usize) -> String {
    let mut hasher = Sha1::new();
    hasher.update(label.as_bytes());
    hasher.update(b"|");
    hasher.update(size.to_string().as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc as ChronoUtc};
    use newsgate_common::types::{ExtractedArticle, ExtractionMethod};
    use newsgate_oracle::{MockOracle, TitleGroupAssignment};
    use newsgate_store::{InMemoryStore, NewItem, TriageUpdate};

    async fn seeded_extracted_item(store: &InMemoryStore, url: &str, title: &str, text: &str) -> i64 {
        let day = ChronoUtc.with_ymd_and_hms(2026, 7, 31, 9, 0, 0).unwrap();
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
                TriageUpdate { run_id: "run-1".into(), triage_topic: "topic".into(), triage_confidence: 0.9, is_match: true },
            )
            .await
            .unwrap();
        store
            .upsert_extracted_article(ExtractedArticle {
                item_id: item.id,
                extracted_text: text.into(),
                extraction_method: ExtractionMethod::Heuristic,
                extracted_at: day,
                failure_count: 0,
                last_failure_reason: None,
            })
            .await
            .unwrap();
        item.id
    }

    #[tokio::test]
    async fn longest_text_wins_primary_within_a_group() {
        let store = InMemoryStore::new();
        let short_id = seeded_extracted_item(&store, "https://a", "UBS names new CEO", "short text here").await;
        let long_id = seeded_extracted_item(
            &store,
            "https://b",
            "UBS appoints new chief executive",
            &"much longer article body ".repeat(30),
        )
        .await;

        let oracle = MockOracle::new();
        *oracle.cluster_groups.lock().unwrap() = vec![
            TitleGroupAssignment { title_index: 0, group_label: "ubs_ceo".into() },
            TitleGroupAssignment { title_index: 1, group_label: "ubs_ceo".into() },
        ];

        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let outcome = cluster_titles(&store, &oracle, date).await.unwrap();
        assert_eq!(outcome.groups_with_duplicates, 1);
        assert_eq!(outcome.items_marked_non_primary, 1);

        let long_cluster = store.cluster_for_article(long_id, ClusteringMethod::GptTitleClustering).await.unwrap().unwrap();
        let short_cluster = store.cluster_for_article(short_id, ClusteringMethod::GptTitleClustering).await.unwrap().unwrap();
        assert!(long_cluster.is_primary);
        assert!(!short_cluster.is_primary);
    }

    #[tokio::test]
    async fn singleton_groups_produce_no_cluster_rows() {
        let store = InMemoryStore::new();
        let first = seeded_extracted_item(&store, "https://a", "Unique story one", "text body here").await;
        let second = seeded_extracted_item(&store, "https://b", "Totally different story", "other text body").await;

        let oracle = MockOracle::new();
        *oracle.cluster_groups.lock().unwrap() = vec![
            TitleGroupAssignment { title_index: 0, group_label: "unique_one".into() },
            TitleGroupAssignment { title_index: 1, group_label: "unique_two".into() },
        ];

        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let outcome = cluster_titles(&store, &oracle, date).await.unwrap();
        assert_eq!(outcome.groups_with_duplicates, 0);
        assert!(store.cluster_for_article(first, ClusteringMethod::GptTitleClustering).await.unwrap().is_none());
        assert!(store.cluster_for_article(second, ClusteringMethod::GptTitleClustering).await.unwrap().is_none());
    }
}
