//! Full-engine integration tests: chain every step function behind the
//! run/checkpoint manager against an in-memory store, a mock oracle, and a
//! mock page fetcher, exercising the same seed scenarios each step module
//! verifies in isolation but end to end across step boundaries. Grounded on
//! `rootsignal-scout/src/pipeline/handlers`'s style of full-engine
//! integration tests against an in-memory store.

use chrono::{NaiveDate, TimeZone, Utc};
use newsgate_common::clock::FixedClock;
use newsgate_common::config::TopicConfig;
use newsgate_common::types::{ExtractedArticle, ExtractionMethod, PipelineStage, StepName, StepStatus};
use newsgate_common::CancellationToken;
use newsgate_fetch::MockPageFetcher;
use newsgate_oracle::{MockOracle, TriageVerdict};
use newsgate_pipeline::run::{run_step, RunManager, RunOptions};
use newsgate_pipeline::steps::{classify, collect, cross_run_dedup, digest, select, summarize};
use newsgate_store::{InMemoryStore, NewItem};

const TOPIC: &str = "creditreform_insights";

fn topic_config() -> TopicConfig {
    TopicConfig {
        enabled: true,
        description: "Business credit risk in Switzerland".to_string(),
        include: vec!["UBS".to_string()],
        confidence_threshold: 0.70,
        max_articles_per_run: 35,
        max_article_age_days: 0,
        skip_prefilter: false,
        focus_areas: Default::default(),
        thresholds: Default::default(),
    }
}

fn feed_config() -> newsgate_common::config::FeedConfig {
    let mut rss = std::collections::HashMap::new();
    rss.insert("nzz".to_string(), vec!["https://example.com/feed.xml".to_string()]);
    newsgate_common::config::FeedConfig { rss, ..Default::default() }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 31).unwrap()
}

fn today_midnight() -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&today().and_hms_opt(9, 0, 0).unwrap())
}

/// A full first-of-the-day run: collect one feed, classify and select the
/// single matching item, skip real extraction (seeded directly, as the step
/// modules' own tests do) and cluster, summarize it, cross-run-dedup it as
/// the day's first signature, and fold it into a brand-new digest.
#[tokio::test]
async fn happy_path_run_produces_a_digest() {
    let store = InMemoryStore::new();
    let fetcher = MockPageFetcher::new().with_page(
        "https://example.com/feed.xml",
        r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title>UBS names new CEO</title>
    <link href="https://example.com/a"/>
    <id>https://example.com/a</id>
    <updated>2026-07-31T09:00:00Z</updated>
  </entry>
</feed>"#,
    );
    let oracle = MockOracle::new().with_triage(TriageVerdict {
        is_match: true,
        confidence: 0.9,
        topic: TOPIC.to_string(),
        reason: "clear match".into(),
    });
    let clock = FixedClock(today_midnight());
    let tz: chrono_tz::Tz = "Europe/Zurich".parse().unwrap();
    let cancel = CancellationToken::new();

    let manager = RunManager::start(&store, RunOptions::default()).await.unwrap();

    let collected = run_step(&manager, &cancel, StepName::Collection, || async {
        let outcome = collect::collect(&store, &fetcher, &feed_config(), 50).await?;
        Ok((outcome.items_inserted, outcome.items_inserted as i32, 0))
    })
    .await
    .unwrap();
    assert_eq!(collected, Some(1));

    let selected = run_step(&manager, &cancel, StepName::Filtering, || async {
        let classify_outcome =
            classify::classify(&store, &oracle, &clock, tz, manager.run_id(), TOPIC, &topic_config(), classify::ClassifyOptions::default())
                .await?;
        let select_outcome = select::select(&store, manager.run_id(), 35).await?;
        Ok((select_outcome.selected, classify_outcome.classified as i32, classify_outcome.matched as i32))
    })
    .await
    .unwrap();
    assert_eq!(selected, Some(1));

    // Seed extracted content directly rather than driving the real HTTP/
    // readability extractor, matching the step modules' own test style.
    let item = store.query_items(newsgate_store::ItemQuery::SelectedAwaitingExtraction { run_id: manager.run_id() }).await.unwrap();
    assert_eq!(item.len(), 1);
    store
        .upsert_extracted_article(ExtractedArticle {
            item_id: item[0].id,
            extracted_text: "UBS named a new chief executive today after a lengthy board search.".into(),
            extraction_method: ExtractionMethod::Heuristic,
            extracted_at: today_midnight(),
            failure_count: 0,
            last_failure_reason: None,
        })
        .await
        .unwrap();
    assert_eq!(store.get_item(item[0].id).await.unwrap().unwrap().pipeline_stage, PipelineStage::Selected);

    let summarized = run_step(&manager, &cancel, StepName::Summarization, || async {
        let outcome = summarize::summarize(&store, &oracle, manager.run_id(), "gpt-5-mini").await?;
        Ok((outcome.summarized, outcome.attempted as i32, outcome.summarized as i32))
    })
    .await
    .unwrap();
    assert_eq!(summarized, Some(1));

    let analyzed = run_step(&manager, &cancel, StepName::Analysis, || async {
        cross_run_dedup::deduplicate_across_runs(&store, &oracle, today(), TOPIC).await?;
        let digest_outcome = digest::build_digests(&store, &oracle, today(), &[TOPIC.to_string()]).await?;
        Ok((digest_outcome.topics_processed, digest_outcome.total_new_articles as i32, digest_outcome.topics_processed as i32))
    })
    .await
    .unwrap();
    assert_eq!(analyzed, Some(1));

    let digest_state = store.get_digest_state(today(), TOPIC).await.unwrap().unwrap();
    assert_eq!(digest_state.article_count, 1);

    assert_eq!(manager.next_step_to_run().await.unwrap(), None);
}

/// A second run the same day for the same topic sees its item classified
/// once (memoized via `ProcessedLink`) and, once summarized, compared
/// against the first run's signature and folded incrementally rather than
/// duplicated.
#[tokio::test]
async fn second_run_same_day_dedupes_against_first() {
    let store = InMemoryStore::new();
    let oracle = MockOracle::new().with_triage(TriageVerdict {
        is_match: true,
        confidence: 0.9,
        topic: TOPIC.to_string(),
        reason: "clear match".into(),
    });
    let clock = FixedClock(today_midnight());
    let tz: chrono_tz::Tz = "Europe/Zurich".parse().unwrap();
    let cancel = CancellationToken::new();

    // First run: one story, fully digested.
    let first_item = store
        .upsert_item(NewItem {
            source: "nzz".into(),
            raw_url: "https://example.com/a".into(),
            normalized_url: "https://example.com/a".into(),
            url_hash: "hash-a".into(),
            title: Some("UBS names new CEO".into()),
            published_at: Some(today_midnight()),
            first_seen_at: today_midnight(),
        })
        .await
        .unwrap();
    let run1 = RunManager::start(&store, RunOptions::default()).await.unwrap();
    classify::classify(&store, &oracle, &clock, tz, run1.run_id(), TOPIC, &topic_config(), classify::ClassifyOptions::default())
        .await
        .unwrap();
    select::select(&store, run1.run_id(), 35).await.unwrap();
    store
        .upsert_extracted_article(ExtractedArticle {
            item_id: first_item.id,
            extracted_text: "UBS named a new chief executive after a board search.".into(),
            extraction_method: ExtractionMethod::Heuristic,
            extracted_at: today_midnight(),
            failure_count: 0,
            last_failure_reason: None,
        })
        .await
        .unwrap();
    summarize::summarize(&store, &oracle, run1.run_id(), "gpt-5-mini").await.unwrap();
    let dedup1 = cross_run_dedup::deduplicate_across_runs(&store, &oracle, today(), TOPIC).await.unwrap();
    assert_eq!(dedup1.unique, 1);
    digest::build_digests(&store, &oracle, today(), &[TOPIC.to_string()]).await.unwrap();

    // Second run: the same URL is re-collected (upsert_item is idempotent on
    // normalized_url), so classification sees the memoized ProcessedLink
    // rather than re-invoking the oracle.
    let failing_oracle = MockOracle::failing();
    let reseen = store
        .upsert_item(NewItem {
            source: "nzz".into(),
            raw_url: "https://example.com/a".into(),
            normalized_url: "https://example.com/a".into(),
            url_hash: "hash-a".into(),
            title: Some("UBS names new CEO".into()),
            published_at: Some(today_midnight()),
            first_seen_at: today_midnight(),
        })
        .await
        .unwrap();
    assert_eq!(reseen.id, first_item.id, "re-collecting the same URL must not create a second item");

    let run2 = RunManager::start(&store, RunOptions::default()).await.unwrap();
    let classify_outcome =
        classify::classify(&store, &failing_oracle, &clock, tz, run2.run_id(), TOPIC, &topic_config(), classify::ClassifyOptions::default())
            .await
            .unwrap();
    assert_eq!(classify_outcome.matched, 1, "memoized processed link must still count as a match without calling the oracle");

    let digest_state = store.get_digest_state(today(), TOPIC).await.unwrap().unwrap();
    assert_eq!(digest_state.article_count, 1, "a re-seen story already digested must not inflate the article count");
}

/// Interrupting a run between steps leaves it resumable: `next_step_to_run`
/// continues exactly where the cancellation fired, never skipping or
/// re-running a completed step.
#[tokio::test]
async fn interrupted_run_resumes_from_the_paused_step() {
    let store = InMemoryStore::new();
    let fetcher = MockPageFetcher::new().with_page(
        "https://example.com/feed.xml",
        r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title>UBS names new CEO</title>
    <link href="https://example.com/a"/>
    <id>https://example.com/a</id>
    <updated>2026-07-31T09:00:00Z</updated>
  </entry>
</feed>"#,
    );
    let cancel = CancellationToken::new();

    let manager = RunManager::start(&store, RunOptions::default()).await.unwrap();
    let collected = run_step(&manager, &cancel, StepName::Collection, || async {
        let outcome = collect::collect(&store, &fetcher, &feed_config(), 50).await?;
        Ok((outcome.items_inserted, outcome.items_inserted as i32, 0))
    })
    .await
    .unwrap();
    assert_eq!(collected, Some(1));

    // Ctrl+C fires between the collection and filtering steps.
    cancel.cancel();
    assert_eq!(manager.next_step_to_run().await.unwrap(), Some(StepName::Filtering));
    let paused = run_step(&manager, &cancel, StepName::Filtering, || async {
        panic!("body must not run once cancellation has fired")
    })
    .await
    .unwrap();
    assert!(paused.is_none());

    let collection_state = store.get_step_state(manager.run_id(), StepName::Collection).await.unwrap().unwrap();
    assert_eq!(collection_state.status, StepStatus::Completed, "a step that finished before cancellation keeps its completed status");

    // Resuming (a fresh process, same run id) picks up at Filtering, not Collection.
    let resumed = RunManager::resume(&store, manager.run_id().to_string(), RunOptions::default());
    assert_eq!(resumed.next_step_to_run().await.unwrap(), Some(StepName::Filtering));
    let fresh_cancel = CancellationToken::new();
    let oracle = MockOracle::new().with_triage(TriageVerdict { is_match: true, confidence: 0.9, topic: TOPIC.to_string(), reason: "ok".into() });
    let clock = FixedClock(today_midnight());
    let tz: chrono_tz::Tz = "Europe/Zurich".parse().unwrap();
    let resumed_filter = run_step(&resumed, &fresh_cancel, StepName::Filtering, || async {
        let classify_outcome =
            classify::classify(&store, &oracle, &clock, tz, resumed.run_id(), TOPIC, &topic_config(), classify::ClassifyOptions::default())
                .await?;
        let select_outcome = select::select(&store, resumed.run_id(), 35).await?;
        Ok((select_outcome.selected, classify_outcome.classified as i32, classify_outcome.matched as i32))
    })
    .await
    .unwrap();
    assert_eq!(resumed_filter, Some(1));
    assert_eq!(resumed.next_step_to_run().await.unwrap(), Some(StepName::Scraping));
}
