//! In-memory fake of [`Store`] for pipeline step tests, grounded on the
//! mock-trait pattern in `rootsignal-scout::pipeline::traits` (a
//! `Mutex`-guarded in-process state standing in for the real backend so
//! step logic can be exercised without a database).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use newsgate_common::types::*;
use newsgate_common::Result;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::traits::{ItemQuery, NewItem, Store, TriageUpdate};

#[derive(Default)]
struct State {
    items: Vec<Item>,
    extracted: HashMap<i64, ExtractedArticle>,
    summaries: HashMap<i64, Summary>,
    clusters: Vec<ArticleCluster>,
    processed_links: HashMap<(String, String), ProcessedLink>,
    signatures: Vec<TopicSignature>,
    dedup_log: Vec<DeduplicationLogEntry>,
    digest_state: HashMap<(NaiveDate, String), DigestState>,
    digest_log: Vec<DigestGenerationLog>,
    step_state: HashMap<(String, StepName), PipelineStepState>,
    next_id: i64,
}

/// Deterministic, single-process fake backing store. Every method takes the
/// lock, mutates, and releases it before returning; no two calls ever
/// interleave, matching the "writes are serializable at row granularity"
/// contract the real store provides transactionally.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Test-only inspection of logged digest generation attempts; the
    /// `Store` trait itself exposes no read path for this log.
    pub fn digest_generation_log(&self) -> Vec<DigestGenerationLog> {
        self.state.lock().unwrap().digest_log.clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_item(&self, item: NewItem) -> Result<Item> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .items
            .iter()
            .find(|i| i.normalized_url == item.normalized_url)
        {
            return Ok(existing.clone());
        }
        let id = state.next_id;
        state.next_id += 1;
        let row = Item {
            id,
            source: item.source,
            raw_url: item.raw_url,
            normalized_url: item.normalized_url,
            url_hash: item.url_hash,
            title: item.title,
            published_at: item.published_at,
            first_seen_at: item.first_seen_at,
            pipeline_stage: PipelineStage::Collected,
            pipeline_run_id: None,
            triage_topic: None,
            triage_confidence: None,
            is_match: false,
            selected_for_processing: false,
            selection_rank: None,
        };
        state.items.push(row.clone());
        Ok(row)
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        Ok(self.state.lock().unwrap().items.iter().find(|i| i.id == id).cloned())
    }

    async fn get_item_by_url_hash(&self, url_hash: &str) -> Result<Option<Item>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .items
            .iter()
            .find(|i| i.url_hash == url_hash)
            .cloned())
    }

    async fn query_items(&self, query: ItemQuery<'_>) -> Result<Vec<Item>> {
        let state = self.state.lock().unwrap();
        let out = match query {
            ItemQuery::UnclassifiedForTopic { .. } => state
                .items
                .iter()
                .filter(|i| i.triage_topic.is_none())
                .cloned()
                .collect(),
            ItemQuery::MatchedForRun { run_id } => state
                .items
                .iter()
                .filter(|i| {
                    i.pipeline_run_id.as_deref() == Some(run_id)
                        && i.is_match
                        && i.pipeline_stage == PipelineStage::Matched
                })
                .cloned()
                .collect(),
            ItemQuery::SelectedAwaitingExtraction { run_id } => state
                .items
                .iter()
                .filter(|i| {
                    i.pipeline_run_id.as_deref() == Some(run_id)
                        && i.is_match
                        && i.selected_for_processing
                        && !state.extracted.contains_key(&i.id)
                })
                .cloned()
                .collect(),
            ItemQuery::ExtractedToday { date } => state
                .items
                .iter()
                .filter(|i| {
                    i.is_match
                        && state.extracted.contains_key(&i.id)
                        && (i.published_at.map(|d| d.date_naive()) == Some(date)
                            || i.first_seen_at.date_naive() == date)
                })
                .cloned()
                .collect(),
            ItemQuery::AwaitingSummary { run_id } => {
                let mut rows: Vec<Item> = state
                    .items
                    .iter()
                    .filter(|i| {
                        i.pipeline_run_id.as_deref() == Some(run_id)
                            && i.is_match
                            && !state.summaries.contains_key(&i.id)
                            && state
                                .extracted
                                .get(&i.id)
                                .map(|e| e.extracted_text.chars().count() >= 600)
                                .unwrap_or(false)
                            && state
                                .clusters
                                .iter()
                                .filter(|c| {
                                    c.article_id == i.id
                                        && c.clustering_method == ClusteringMethod::GptTitleClustering
                                })
                                .all(|c| c.is_primary)
                    })
                    .cloned()
                    .collect();
                rows.sort_by(|a, b| {
                    b.triage_confidence
                        .partial_cmp(&a.triage_confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                rows
            }
        };
        Ok(out)
    }

    async fn record_triage(&self, item_id: i64, verdict: TriageUpdate) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(item) = state.items.iter_mut().find(|i| i.id == item_id) {
            item.triage_topic = Some(verdict.triage_topic);
            item.triage_confidence = Some(verdict.triage_confidence);
            item.is_match = verdict.is_match;
            item.pipeline_run_id = Some(verdict.run_id);
            item.pipeline_stage = if verdict.is_match {
                PipelineStage::Matched
            } else {
                PipelineStage::FilteredOut
            };
        }
        Ok(())
    }

    async fn assign_selection(
        &self,
        run_id: &str,
        selected_ids: &[i64],
        rest_ids: &[i64],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for (idx, id) in selected_ids.iter().enumerate() {
            if let Some(item) = state
                .items
                .iter_mut()
                .find(|i| i.id == *id && i.pipeline_run_id.as_deref() == Some(run_id))
            {
                item.selection_rank = Some((idx + 1) as i32);
                item.selected_for_processing = true;
                item.pipeline_stage = PipelineStage::Selected;
            }
        }
        for id in rest_ids {
            if let Some(item) = state
                .items
                .iter_mut()
                .find(|i| i.id == *id && i.pipeline_run_id.as_deref() == Some(run_id))
            {
                item.pipeline_stage = PipelineStage::MatchedNotSelected;
            }
        }
        Ok(())
    }

    async fn set_stage(&self, item_id: i64, stage: PipelineStage) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(item) = state.items.iter_mut().find(|i| i.id == item_id) {
            item.pipeline_stage = stage;
        }
        Ok(())
    }

    async fn get_processed_link(&self, url_hash: &str, topic: &str) -> Result<Option<ProcessedLink>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .processed_links
            .get(&(url_hash.to_string(), topic.to_string()))
            .cloned())
    }

    async fn upsert_processed_link(&self, link: ProcessedLink) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .processed_links
            .insert((link.url_hash.clone(), link.topic.clone()), link);
        Ok(())
    }

    async fn get_extracted_article(&self, item_id: i64) -> Result<Option<ExtractedArticle>> {
        Ok(self.state.lock().unwrap().extracted.get(&item_id).cloned())
    }

    async fn upsert_extracted_article(&self, article: ExtractedArticle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let item_id = article.item_id;
        state.extracted.insert(item_id, article);
        if let Some(item) = state.items.iter_mut().find(|i| i.id == item_id) {
            item.pipeline_stage = PipelineStage::Scraped;
        }
        Ok(())
    }

    async fn record_extraction_failure(&self, item_id: i64, reason: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .extracted
            .entry(item_id)
            .or_insert_with(|| ExtractedArticle {
                item_id,
                extracted_text: String::new(),
                extraction_method: ExtractionMethod::Failed,
                extracted_at: Utc::now(),
                failure_count: 0,
                last_failure_reason: None,
            });
        entry.failure_count += 1;
        entry.last_failure_reason = Some(reason.to_string());
        Ok(())
    }

    async fn insert_cluster_rows(&self, rows: Vec<ArticleCluster>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state.clusters.retain(|c| {
                !(c.cluster_id == row.cluster_id && c.article_id == row.article_id)
            });
            state.clusters.push(row);
        }
        Ok(())
    }

    async fn cluster_for_article(
        &self,
        article_id: i64,
        method: ClusteringMethod,
    ) -> Result<Option<ArticleCluster>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .clusters
            .iter()
            .find(|c| c.article_id == article_id && c.clustering_method == method)
            .cloned())
    }

    async fn cluster_members(&self, cluster_id: &str) -> Result<Vec<ArticleCluster>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .clusters
            .iter()
            .filter(|c| c.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    async fn get_summary(&self, item_id: i64) -> Result<Option<Summary>> {
        Ok(self.state.lock().unwrap().summaries.get(&item_id).cloned())
    }

    async fn upsert_summary(&self, summary: Summary) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let item_id = summary.item_id;
        state.summaries.insert(item_id, summary);
        if let Some(item) = state.items.iter_mut().find(|i| i.id == item_id) {
            item.pipeline_stage = PipelineStage::Summarized;
        }
        Ok(())
    }

    async fn summaries_for_date_topic(
        &self,
        date: NaiveDate,
        topic: &str,
        only_new: bool,
    ) -> Result<Vec<(Summary, Item, Option<ArticleCluster>)>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<(Summary, Item, Option<ArticleCluster>)> = state
            .summaries
            .values()
            .filter(|s| s.topic == topic && (!only_new || !s.topic_already_covered))
            .filter_map(|s| {
                let item = state.items.iter().find(|i| i.id == s.item_id)?;
                if item.published_at.map(|d| d.date_naive()) != Some(date)
                    && item.first_seen_at.date_naive() != date
                {
                    return None;
                }
                let cluster = state
                    .clusters
                    .iter()
                    .find(|c| {
                        c.article_id == s.item_id
                            && c.clustering_method == ClusteringMethod::GptTitleClustering
                    })
                    .cloned();
                Some((s.clone(), item.clone(), cluster))
            })
            .collect();
        out.sort_by(|a, b| {
            b.1.triage_confidence
                .partial_cmp(&a.1.triage_confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.created_at.cmp(&a.0.created_at))
        });
        Ok(out)
    }

    async fn mark_topic_covered(&self, item_id: i64, cross_run_cluster_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(summary) = state.summaries.get_mut(&item_id) {
            summary.topic_already_covered = true;
            summary.cross_run_cluster_id = Some(cross_run_cluster_id.to_string());
        }
        Ok(())
    }

    async fn signatures_for_date(&self, date: NaiveDate) -> Result<Vec<TopicSignature>> {
        let mut rows: Vec<TopicSignature> = self
            .state
            .lock()
            .unwrap()
            .signatures
            .iter()
            .filter(|s| s.date == date)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.run_sequence
                .cmp(&b.run_sequence)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(rows)
    }

    async fn insert_signatures(&self, rows: Vec<TopicSignature>) -> Result<()> {
        self.state.lock().unwrap().signatures.extend(rows);
        Ok(())
    }

    async fn purge_signatures_older_than(&self, cutoff: NaiveDate) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.signatures.len();
        state.signatures.retain(|s| s.date >= cutoff);
        Ok((before - state.signatures.len()) as u64)
    }

    async fn insert_dedup_log(&self, entry: DeduplicationLogEntry) -> Result<()> {
        self.state.lock().unwrap().dedup_log.push(entry);
        Ok(())
    }

    async fn get_digest_state(&self, date: NaiveDate, topic: &str) -> Result<Option<DigestState>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .digest_state
            .get(&(date, topic.to_string()))
            .cloned())
    }

    async fn save_digest_state(&self, state: DigestState) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        guard
            .digest_state
            .insert((state.digest_date, state.topic.clone()), state);
        Ok(())
    }

    async fn all_digest_states(&self, date: NaiveDate) -> Result<Vec<DigestState>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .digest_state
            .values()
            .filter(|s| s.digest_date == date)
            .cloned()
            .collect())
    }

    async fn insert_digest_generation_log(&self, entry: DigestGenerationLog) -> Result<()> {
        self.state.lock().unwrap().digest_log.push(entry);
        Ok(())
    }

    async fn upsert_step_state(&self, state: PipelineStepState) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let key = (state.run_id.clone(), state.step_name);
        if let Some(existing) = guard.step_state.get(&key) {
            let mut merged = state;
            if merged.started_at.is_none() {
                merged.started_at = existing.started_at;
            }
            guard.step_state.insert(key, merged);
        } else {
            guard.step_state.insert(key, state);
        }
        Ok(())
    }

    async fn get_step_state(&self, run_id: &str, step: StepName) -> Result<Option<PipelineStepState>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .step_state
            .get(&(run_id.to_string(), step))
            .cloned())
    }

    async fn steps_for_run(&self, run_id: &str) -> Result<Vec<PipelineStepState>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .step_state
            .values()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn purge_step_states_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.step_state.len();
        state.step_state.retain(|_, v| {
            v.started_at.map(|d| d >= cutoff).unwrap_or(true)
                || matches!(v.status, StepStatus::Running | StepStatus::Paused)
        });
        Ok((before - state.step_state.len()) as u64)
    }
}
