//! The durable Store abstraction (C2). Every other component is stateless
//! across restarts; all persistent state lives behind this trait so that
//! steps can be tested against an in-memory fake with no database.

use async_trait::async_trait;
use chrono::NaiveDate;
use newsgate_common::types::*;
use newsgate_common::Result;

/// Selector for the common "items pending the next stage" queries each step
/// needs (spec §4.2: "iterator queries for step inputs").
#[derive(Debug, Clone, Copy)]
pub enum ItemQuery<'a> {
    /// Items collected but not yet classified for `topic`.
    UnclassifiedForTopic { topic: &'a str },
    /// Items classified as a match for `run_id` but not yet ranked.
    MatchedForRun { run_id: &'a str },
    /// Selected items for `run_id` with no ExtractedArticle yet.
    SelectedAwaitingExtraction { run_id: &'a str },
    /// Matched items with an ExtractedArticle, published or first seen on `date`.
    ExtractedToday { date: NaiveDate },
    /// Matched items ready for summarization: extracted, unsummarized,
    /// unclustered-or-primary.
    AwaitingSummary { run_id: &'a str },
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- Items ---

    /// Insert a new Item if `normalized_url` is unseen; no-op (ignore) on
    /// conflict. Returns the resulting row (existing or newly inserted).
    async fn upsert_item(&self, item: NewItem) -> Result<Item>;

    async fn get_item(&self, id: i64) -> Result<Option<Item>>;
    async fn get_item_by_url_hash(&self, url_hash: &str) -> Result<Option<Item>>;

    async fn query_items(&self, query: ItemQuery<'_>) -> Result<Vec<Item>>;

    /// Apply a classifier verdict: update triage fields, is_match, stage,
    /// and run id. Per spec §4.4 step 6.
    async fn record_triage(&self, item_id: i64, verdict: TriageUpdate) -> Result<()>;

    /// Atomically assign selection_rank 1..N to the given item ids in order,
    /// set selected_for_processing + stage=Selected on them, and
    /// stage=MatchedNotSelected on every other matched item in the run.
    async fn assign_selection(
        &self,
        run_id: &str,
        selected_ids: &[i64],
        rest_ids: &[i64],
    ) -> Result<()>;

    async fn set_stage(&self, item_id: i64, stage: PipelineStage) -> Result<()>;

    // --- ProcessedLink (classifier memoization) ---

    async fn get_processed_link(&self, url_hash: &str, topic: &str) -> Result<Option<ProcessedLink>>;
    async fn upsert_processed_link(&self, link: ProcessedLink) -> Result<()>;

    // --- ExtractedArticle ---

    async fn get_extracted_article(&self, item_id: i64) -> Result<Option<ExtractedArticle>>;
    async fn upsert_extracted_article(&self, article: ExtractedArticle) -> Result<()>;
    async fn record_extraction_failure(&self, item_id: i64, reason: &str) -> Result<()>;

    // --- ArticleCluster ---

    async fn insert_cluster_rows(&self, rows: Vec<ArticleCluster>) -> Result<()>;
    async fn cluster_for_article(
        &self,
        article_id: i64,
        method: ClusteringMethod,
    ) -> Result<Option<ArticleCluster>>;
    async fn cluster_members(&self, cluster_id: &str) -> Result<Vec<ArticleCluster>>;

    // --- Summary ---

    async fn get_summary(&self, item_id: i64) -> Result<Option<Summary>>;
    async fn upsert_summary(&self, summary: Summary) -> Result<()>;
    async fn summaries_for_date_topic(
        &self,
        date: NaiveDate,
        topic: &str,
        only_new: bool,
    ) -> Result<Vec<(Summary, Item, Option<ArticleCluster>)>>;
    async fn mark_topic_covered(
        &self,
        item_id: i64,
        cross_run_cluster_id: &str,
    ) -> Result<()>;

    // --- TopicSignature ---

    async fn signatures_for_date(&self, date: NaiveDate) -> Result<Vec<TopicSignature>>;
    async fn insert_signatures(&self, rows: Vec<TopicSignature>) -> Result<()>;
    async fn purge_signatures_older_than(&self, cutoff: NaiveDate) -> Result<u64>;

    async fn insert_dedup_log(&self, entry: DeduplicationLogEntry) -> Result<()>;

    // --- DigestState ---

    async fn get_digest_state(&self, date: NaiveDate, topic: &str) -> Result<Option<DigestState>>;
    async fn save_digest_state(&self, state: DigestState) -> Result<()>;
    async fn all_digest_states(&self, date: NaiveDate) -> Result<Vec<DigestState>>;
    async fn insert_digest_generation_log(&self, entry: DigestGenerationLog) -> Result<()>;

    // --- PipelineStepState (run/checkpoint manager) ---

    async fn upsert_step_state(&self, state: PipelineStepState) -> Result<()>;
    async fn get_step_state(&self, run_id: &str, step: StepName) -> Result<Option<PipelineStepState>>;
    async fn steps_for_run(&self, run_id: &str) -> Result<Vec<PipelineStepState>>;
    async fn purge_step_states_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64>;
}

/// Fields needed to insert a brand-new Item; the store fills in id and
/// defaults for everything downstream steps haven't touched yet.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub source: String,
    pub raw_url: String,
    pub normalized_url: String,
    pub url_hash: String,
    pub title: Option<String>,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
    pub first_seen_at: chrono::DateTime<chrono::Utc>,
}

/// The classifier's verdict for one item (spec §4.4 step 6).
#[derive(Debug, Clone)]
pub struct TriageUpdate {
    pub run_id: String,
    pub triage_topic: String,
    pub triage_confidence: f64,
    pub is_match: bool,
}
