//! Incremental digest builder (C10): folds each day's newly eligible
//! summaries into a per-topic digest, generating a fresh digest the first
//! time a topic has material and merging incrementally afterwards (spec
//! §4.10).

use chrono::{NaiveDate, Utc};
use newsgate_common::types::{DigestContent, DigestGenerationLog, DigestState, GenerationType};
use newsgate_common::Result;
use newsgate_oracle::{DigestArticle, Oracle};
use newsgate_store::Store;
use std::collections::HashSet;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Default)]
pub struct DigestOutcome {
    pub topics_processed: usize,
    pub total_new_articles: usize,
    pub api_calls_made: usize,
}

pub async fn build_digests(store: &dyn Store, oracle: &dyn Oracle, date: NaiveDate, topics: &[String]) -> Result<DigestOutcome> {
    let started = Instant::now();
    let mut outcome = DigestOutcome::default();
    let mut api_calls = 0usize;

    for topic in topics {
        let prior = store.get_digest_state(date, topic).await?;
        let processed_ids: HashSet<i64> = prior.as_ref().map(|s| s.processed_article_ids.iter().copied().collect()).unwrap_or_default();

        let candidates = store.summaries_for_date_topic(date, topic, true).await?;
        let new: Vec<_> = candidates.into_iter().filter(|(_, item, _)| !processed_ids.contains(&item.id)).collect();

        if new.is_empty() {
            let now = Utc::now();
            store
                .insert_digest_generation_log(DigestGenerationLog {
                    digest_date: date,
                    generation_type: GenerationType::Cached,
                    topics_processed: 1,
                    total_articles: prior.as_ref().map(|s| s.article_count).unwrap_or(0),
                    new_articles: 0,
                    api_calls_made: 0,
                    execution_time_seconds: started.elapsed().as_secs_f64(),
                    created_at: now,
                })
                .await?;
            continue;
        }
        outcome.topics_processed += 1;
        outcome.total_new_articles += new.len();

        let new_articles: Vec<DigestArticle> = new
            .iter()
            .map(|(summary, item, _)| DigestArticle {
                title: item.title.clone().unwrap_or_default(),
                url: item.normalized_url.clone(),
                summary: summary.summary.clone(),
                published_at: item.published_at,
            })
            .collect();
        let new_ids: Vec<i64> = new.iter().map(|(_, item, _)| item.id).collect();

        let (generation_type, content, article_count) = match &prior {
            None => {
                api_calls += 1;
                let digest = oracle.full_digest(topic, &new_articles).await?;
                let content = DigestContent {
                    headline: digest.headline,
                    why_it_matters: digest.why_it_matters,
                    sources: digest.sources,
                    article_count: digest.article_count,
                    generated_at: Utc::now(),
                    last_updated: None,
                };
                (GenerationType::Full, content, new_articles.len() as i32)
            }
            Some(existing) => {
                api_calls += 1;
                let partial = oracle.partial_digest(topic, &new_articles).await?;
                api_calls += 1;
                let merged = oracle
                    .merge_digest(&existing.digest_content.headline, &existing.digest_content.why_it_matters, &partial, topic)
                    .await;
                let (headline, why_it_matters, sources) = match merged {
                    Ok(m) => (m.headline, m.why_it_matters, m.sources),
                    Err(_) => (
                        existing.digest_content.headline.clone(),
                        existing.digest_content.why_it_matters.clone(),
                        existing.digest_content.sources.clone(),
                    ),
                };
                let article_count = existing.article_count + new_articles.len() as i32;
                let content = DigestContent {
                    headline,
                    why_it_matters,
                    sources,
                    article_count,
                    generated_at: existing.digest_content.generated_at,
                    last_updated: Some(Utc::now()),
                };
                (GenerationType::Incremental, content, article_count)
            }
        };

        let mut all_ids = processed_ids.into_iter().collect::<Vec<_>>();
        all_ids.extend(new_ids);

        let now = Utc::now();
        store
            .save_digest_state(DigestState {
                digest_date: date,
                topic: topic.clone(),
                processed_article_ids: all_ids,
                digest_content: content,
                article_count,
                created_at: prior.as_ref().map(|s| s.created_at).unwrap_or(now),
                updated_at: now,
            })
            .await?;

        store
            .insert_digest_generation_log(DigestGenerationLog {
                digest_date: date,
                generation_type,
                topics_processed: 1,
                total_articles: article_count,
                new_articles: new_articles.len() as i32,
                api_calls_made: api_calls as i32,
                execution_time_seconds: started.elapsed().as_secs_f64(),
                created_at: now,
            })
            .await?;
    }

    outcome.api_calls_made = api_calls;
    info!(date = %date, topics_processed = outcome.topics_processed, total_new_articles = outcome.total_new_articles, "digest build complete");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc as ChronoUtc};
    use newsgate_common::types::Summary;
    use newsgate_oracle::{FullDigest, MockOracle};
    use newsgate_store::{InMemoryStore, NewItem, TriageUpdate};

    async fn seeded_item_with_summary(store: &InMemoryStore, url: &str, title: &str) -> i64 {
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
                summary: format!("summary for {title}"),
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
    async fn first_digest_for_topic_is_a_full_generation() {
        let store = InMemoryStore::new();
        seeded_item_with_summary(&store, "https://a", "UBS names new CEO").await;
        let oracle = MockOracle::new();
        *oracle.full_digest_response.lock().unwrap() = Some(FullDigest {
            headline: "UBS leadership shakeup".into(),
            why_it_matters: "Credit risk implications for counterparties.".into(),
            sources: vec!["https://a".into()],
            article_count: 1,
            generated_at: "2026-07-31T10:00:00Z".into(),
        });

        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let outcome = build_digests(&store, &oracle, date, &["creditreform_insights".to_string()]).await.unwrap();
        assert_eq!(outcome.topics_processed, 1);

        let state = store.get_digest_state(date, "creditreform_insights").await.unwrap().unwrap();
        assert_eq!(state.digest_content.headline, "UBS leadership shakeup");
        assert_eq!(state.article_count, 1);
    }

    #[tokio::test]
    async fn no_new_summaries_leaves_digest_untouched() {
        let store = InMemoryStore::new();
        let oracle = MockOracle::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let outcome = build_digests(&store, &oracle, date, &["creditreform_insights".to_string()]).await.unwrap();
        assert_eq!(outcome.topics_processed, 0);
        assert!(store.get_digest_state(date, "creditreform_insights").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_new_summaries_still_logs_a_cached_generation_attempt() {
        let store = InMemoryStore::new();
        let oracle = MockOracle::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        build_digests(&store, &oracle, date, &["creditreform_insights".to_string()]).await.unwrap();

        let log = store.digest_generation_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].generation_type, GenerationType::Cached);
        assert_eq!(log[0].new_articles, 0);
        assert_eq!(log[0].api_calls_made, 0);
    }
}
