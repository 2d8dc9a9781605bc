//! Relevance classifier (C4): single-pass per-topic triage via the oracle,
//! with priority ordering, per-URL memoization through `ProcessedLink`, and
//! a confidence threshold that fails closed. Per-item oracle failures are
//! caught here and recorded as `LinkResult::Error` rather than propagated,
//! per spec §4.4 "Failures on a single item ... the run proceeds".

use chrono::Utc;
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use newsgate_common::clock::{local_midnight_days_ago, today_in};
use newsgate_common::config::TopicConfig;
use newsgate_common::source_tier::{priority_score, source_tier_score};
use newsgate_common::types::{Item, LinkResult, ProcessedLink};
use newsgate_common::{Clock, Result};
use newsgate_oracle::{Oracle, TriageRequest};
use newsgate_store::{ItemQuery, Store, TriageUpdate};
use tracing::{debug, info, warn};
use url::Url;

pub const CLASSIFY_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyMode {
    Express,
    Standard,
}

impl ClassifyMode {
    fn cap(self) -> usize {
        match self {
            ClassifyMode::Express => 50,
            ClassifyMode::Standard => 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions {
    pub mode: ClassifyMode,
    pub skip_prefilter: bool,
    pub force_refresh: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self { mode: ClassifyMode::Standard, skip_prefilter: false, force_refresh: false }
    }
}

#[derive(Debug, Default)]
pub struct ClassifyOutcome {
    pub candidates_considered: usize,
    pub classified: usize,
    pub matched: usize,
}

pub async fn classify(
    store: &dyn Store,
    oracle: &dyn Oracle,
    clock: &dyn Clock,
    tz: Tz,
    run_id: &str,
    topic: &str,
    topic_config: &TopicConfig,
    options: ClassifyOptions,
) -> Result<ClassifyOutcome> {
    let mut candidates = store.query_items(ItemQuery::UnclassifiedForTopic { topic }).await?;
    apply_date_filter(&mut candidates, clock, tz, topic_config, &options);
    let candidates_considered = candidates.len();

    let mut scored: Vec<(Item, f64, f64)> = candidates
        .into_iter()
        .map(|item| {
            let (host, path, query) = url_parts(&item.normalized_url);
            let age_days = item
                .published_at
                .map(|p| (clock.now() - p).num_days().max(0))
                .unwrap_or(0);
            let tier = source_tier_score(&host);
            let score = priority_score(&host, age_days, &path, &query);
            (item, score, tier)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    if !options.skip_prefilter {
        scored.truncate(options.mode.cap());
    }

    let results: Vec<bool> = stream::iter(scored.into_iter().map(|(item, priority_score, source_tier)| {
        classify_one(store, oracle, run_id, topic, topic_config, item, priority_score, source_tier)
    }))
    .buffer_unordered(CLASSIFY_CONCURRENCY)
    .collect::<Vec<Result<bool>>>()
    .await
    .into_iter()
    .filter_map(|r| match r {
        Ok(is_match) => Some(is_match),
        Err(e) => {
            warn!(topic, error = %e, "classification of an item failed at the store layer");
            None
        }
    })
    .collect();

    let classified = results.len();
    let matched = results.iter().filter(|m| **m).count();
    info!(topic, candidates_considered, classified, matched, "classification complete");
    Ok(ClassifyOutcome { candidates_considered, classified, matched })
}

fn apply_date_filter(
    candidates: &mut Vec<Item>,
    clock: &dyn Clock,
    tz: Tz,
    topic_config: &TopicConfig,
    options: &ClassifyOptions,
) {
    if options.force_refresh {
        let cutoff = local_midnight_days_ago(clock, tz, 2);
        candidates.retain(|i| i.published_at.unwrap_or(i.first_seen_at) >= cutoff);
        return;
    }
    if topic_config.max_article_age_days == 0 {
        let today = today_in(clock, tz);
        candidates.retain(|i| {
            i.published_at.map(|d| d.with_timezone(&tz).date_naive()) == Some(today)
                || i.first_seen_at.with_timezone(&tz).date_naive() == today
        });
    } else {
        let cutoff = local_midnight_days_ago(clock, tz, topic_config.max_article_age_days as i64 - 1);
        candidates.retain(|i| i.published_at.unwrap_or(i.first_seen_at) >= cutoff);
    }
}

fn url_parts(normalized_url: &str) -> (String, String, String) {
    match Url::parse(normalized_url) {
        Ok(url) => (
            url.host_str().unwrap_or("").to_string(),
            url.path().to_string(),
            url.query().unwrap_or("").to_string(),
        ),
        Err(_) => (String::new(), String::new(), String::new()),
    }
}

async fn classify_one(
    store: &dyn Store,
    oracle: &dyn Oracle,
    run_id: &str,
    topic: &str,
    topic_config: &TopicConfig,
    item: Item,
    priority_score: f64,
    source_tier: f64,
) -> Result<bool> {
    if let Some(existing) = store.get_processed_link(&item.url_hash, topic).await? {
        let is_match = existing.result == LinkResult::Matched;
        store
            .record_triage(
                item.id,
                TriageUpdate {
                    run_id: run_id.to_string(),
                    triage_topic: topic.to_string(),
                    triage_confidence: existing.confidence,
                    is_match,
                },
            )
            .await?;
        return Ok(is_match);
    }

    let system_prompt = render_system_prompt(topic, topic_config);
    let request = TriageRequest {
        title: item.title.clone().unwrap_or_default(),
        url: item.normalized_url.clone(),
        topic: topic.to_string(),
        priority_score: Some(priority_score),
        source_tier: Some(source_tier),
    };

    let (result, confidence, is_match) = match oracle.triage(request, &system_prompt).await {
        Ok(verdict) => {
            if verdict.confidence < topic_config.confidence_threshold {
                debug!(item_id = item.id, confidence = verdict.confidence, "below confidence threshold");
                (LinkResult::Rejected, verdict.confidence, false)
            } else if verdict.is_match {
                (LinkResult::Matched, verdict.confidence, true)
            } else {
                (LinkResult::Rejected, verdict.confidence, false)
            }
        }
        Err(e) => {
            warn!(item_id = item.id, error = %e, "oracle triage failed, recording as no-match");
            (LinkResult::Error, 0.0, false)
        }
    };

    store
        .upsert_processed_link(ProcessedLink {
            url_hash: item.url_hash.clone(),
            url: item.normalized_url.clone(),
            topic: topic.to_string(),
            processed_at: Utc::now(),
            result,
            confidence,
        })
        .await?;

    store
        .record_triage(
            item.id,
            TriageUpdate { run_id: run_id.to_string(), triage_topic: topic.to_string(), triage_confidence: confidence, is_match },
        )
        .await?;

    Ok(is_match)
}

fn render_system_prompt(topic: &str, topic_config: &TopicConfig) -> String {
    let keywords = topic_config.include.join(", ");
    let focus_areas = topic_config
        .focus_areas
        .iter()
        .map(|(area, cfg)| format!("{area} (priority {}): {}", cfg.priority, cfg.keywords.join(", ")))
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "You classify news items for relevance to the '{topic}' topic.\n\
         Topic description: {description}\n\
         Keywords: {keywords}\n\
         Focus areas: {focus_areas}\n\
         Respond with strict JSON matching the triage schema.",
        description = topic_config.description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc as ChronoUtc};
    use newsgate_common::clock::FixedClock;
    use newsgate_common::config::TopicConfig;
    use newsgate_oracle::{MockOracle, TriageVerdict};
    use newsgate_store::{InMemoryStore, NewItem};

    fn topic_config() -> TopicConfig {
        TopicConfig {
            enabled: true,
            description: "Business credit risk in Switzerland".to_string(),
            include: vec!["UBS".to_string(), "franc".to_string()],
            confidence_threshold: 0.70,
            max_articles_per_run: 35,
            max_article_age_days: 0,
            skip_prefilter: false,
            focus_areas: Default::default(),
            thresholds: Default::default(),
        }
    }

    fn clock_today() -> FixedClock {
        FixedClock(ChronoUtc.with_ymd_and_hms(2026, 7, 31, 12, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn matches_above_threshold_and_persists_processed_link() {
        let store = InMemoryStore::new();
        let item = store
            .upsert_item(NewItem {
                source: "nzz".into(),
                raw_url: "https://nzz.ch/artikel/ubs".into(),
                normalized_url: "https://nzz.ch/artikel/ubs".into(),
                url_hash: "hash-1".into(),
                title: Some("UBS names new CEO".into()),
                published_at: Some(clock_today().now()),
                first_seen_at: clock_today().now(),
            })
            .await
            .unwrap();

        let oracle = MockOracle::new().with_triage(TriageVerdict {
            is_match: true,
            confidence: 0.92,
            topic: "creditreform_insights".into(),
            reason: "clear match".into(),
        });
        let clock = clock_today();
        let tz: Tz = "Europe/Zurich".parse().unwrap();
        let outcome = classify(
            &store,
            &oracle,
            &clock,
            tz,
            "run-1",
            "creditreform_insights",
            &topic_config(),
            ClassifyOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.matched, 1);
        let reloaded = store.get_item(item.id).await.unwrap().unwrap();
        assert!(reloaded.is_match);
        assert_eq!(reloaded.triage_confidence, Some(0.92));
        let link = store.get_processed_link(&item.url_hash, "creditreform_insights").await.unwrap().unwrap();
        assert_eq!(link.result, LinkResult::Matched);
    }

    #[tokio::test]
    async fn below_threshold_forces_no_match() {
        let store = InMemoryStore::new();
        store
            .upsert_item(NewItem {
                source: "nzz".into(),
                raw_url: "https://nzz.ch/artikel/x".into(),
                normalized_url: "https://nzz.ch/artikel/x".into(),
                url_hash: "hash-2".into(),
                title: Some("Something unrelated".into()),
                published_at: Some(clock_today().now()),
                first_seen_at: clock_today().now(),
            })
            .await
            .unwrap();

        let oracle = MockOracle::new().with_triage(TriageVerdict {
            is_match: true,
            confidence: 0.50,
            topic: "creditreform_insights".into(),
            reason: "weak".into(),
        });
        let clock = clock_today();
        let tz: Tz = "Europe/Zurich".parse().unwrap();
        let outcome = classify(
            &store,
            &oracle,
            &clock,
            tz,
            "run-1",
            "creditreform_insights",
            &topic_config(),
            ClassifyOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.matched, 0);
    }

    #[tokio::test]
    async fn processed_link_short_circuits_oracle_call() {
        let store = InMemoryStore::new();
        let item = store
            .upsert_item(NewItem {
                source: "nzz".into(),
                raw_url: "https://nzz.ch/artikel/y".into(),
                normalized_url: "https://nzz.ch/artikel/y".into(),
                url_hash: "hash-3".into(),
                title: Some("UBS franc news".into()),
                published_at: Some(clock_today().now()),
                first_seen_at: clock_today().now(),
            })
            .await
            .unwrap();
        store
            .upsert_processed_link(ProcessedLink {
                url_hash: item.url_hash.clone(),
                url: item.normalized_url.clone(),
                topic: "creditreform_insights".into(),
                processed_at: clock_today().now(),
                result: LinkResult::Matched,
                confidence: 0.81,
            })
            .await
            .unwrap();

        let oracle = MockOracle::failing();
        let clock = clock_today();
        let tz: Tz = "Europe/Zurich".parse().unwrap();
        let outcome = classify(
            &store,
            &oracle,
            &clock,
            tz,
            "run-1",
            "creditreform_insights",
            &topic_config(),
            ClassifyOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.matched, 1);
    }

    #[tokio::test]
    async fn oracle_failure_is_recorded_as_error_and_no_match() {
        let store = InMemoryStore::new();
        store
            .upsert_item(NewItem {
                source: "nzz".into(),
                raw_url: "https://nzz.ch/artikel/z".into(),
                normalized_url: "https://nzz.ch/artikel/z".into(),
                url_hash: "hash-4".into(),
                title: Some("UBS franc news".into()),
                published_at: Some(clock_today().now()),
                first_seen_at: clock_today().now(),
            })
            .await
            .unwrap();

        let oracle = MockOracle::failing();
        let clock = clock_today();
        let tz: Tz = "Europe/Zurich".parse().unwrap();
        let outcome = classify(
            &store,
            &oracle,
            &clock,
            tz,
            "run-1",
            "creditreform_insights",
            &topic_config(),
            ClassifyOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.matched, 0);
        let link = store.get_processed_link("hash-4", "creditreform_insights").await.unwrap().unwrap();
        assert_eq!(link.result, LinkResult::Error);
    }
}
