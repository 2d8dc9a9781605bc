//! Shared data model (spec §3). The Store owns durability; these are the
//! in-memory shapes every crate passes between steps.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Collected,
    Matched,
    FilteredOut,
    Selected,
    MatchedNotSelected,
    Scraped,
    Failed,
    Summarized,
    Analyzed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Collected => "collected",
            Self::Matched => "matched",
            Self::FilteredOut => "filtered_out",
            Self::Selected => "selected",
            Self::MatchedNotSelected => "matched_not_selected",
            Self::Scraped => "scraped",
            Self::Failed => "failed",
            Self::Summarized => "summarized",
            Self::Analyzed => "analyzed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PipelineStage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collected" => Ok(Self::Collected),
            "matched" => Ok(Self::Matched),
            "filtered_out" => Ok(Self::FilteredOut),
            "selected" => Ok(Self::Selected),
            "matched_not_selected" => Ok(Self::MatchedNotSelected),
            "scraped" => Ok(Self::Scraped),
            "failed" => Ok(Self::Failed),
            "summarized" => Ok(Self::Summarized),
            "analyzed" => Ok(Self::Analyzed),
            other => Err(format!("unknown pipeline_stage: {other}")),
        }
    }
}

/// A collected candidate article. Unique by `normalized_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub source: String,
    pub raw_url: String,
    pub normalized_url: String,
    pub url_hash: String,
    pub title: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub pipeline_stage: PipelineStage,
    pub pipeline_run_id: Option<String>,
    pub triage_topic: Option<String>,
    pub triage_confidence: Option<f64>,
    pub is_match: bool,
    pub selected_for_processing: bool,
    pub selection_rank: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Heuristic,
    Browser,
    Failed,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Heuristic => "heuristic",
            Self::Browser => "browser",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExtractionMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heuristic" => Ok(Self::Heuristic),
            "browser" => Ok(Self::Browser),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown extraction_method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedArticle {
    pub item_id: i64,
    pub extracted_text: String,
    pub extraction_method: ExtractionMethod,
    pub extracted_at: DateTime<Utc>,
    pub failure_count: i32,
    pub last_failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub item_id: i64,
    pub topic: String,
    pub model: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub entities: HashMap<String, Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub topic_already_covered: bool,
    pub cross_run_cluster_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringMethod {
    ContentSimilarity,
    GptTitleClustering,
}

impl std::fmt::Display for ClusteringMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ContentSimilarity => "content_similarity",
            Self::GptTitleClustering => "gpt_title_clustering",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ClusteringMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content_similarity" => Ok(Self::ContentSimilarity),
            "gpt_title_clustering" => Ok(Self::GptTitleClustering),
            other => Err(format!("unknown clustering_method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleCluster {
    pub cluster_id: String,
    pub article_id: i64,
    pub is_primary: bool,
    pub similarity_score: f64,
    pub clustering_method: ClusteringMethod,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkResult {
    Matched,
    Rejected,
    Error,
}

impl std::fmt::Display for LinkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Matched => "matched",
            Self::Rejected => "rejected",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LinkResult {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matched" => Ok(Self::Matched),
            "rejected" => Ok(Self::Rejected),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown link_result: {other}")),
        }
    }
}

/// Classifier memoization: (url_hash, topic) -> oracle verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedLink {
    pub url_hash: String,
    pub url: String,
    pub topic: String,
    pub processed_at: DateTime<Utc>,
    pub result: LinkResult,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Collection,
    Filtering,
    Scraping,
    Summarization,
    Analysis,
}

impl StepName {
    /// Canonical step order used for resume lookups and retention sweeps.
    pub const ORDER: [StepName; 5] = [
        StepName::Collection,
        StepName::Filtering,
        StepName::Scraping,
        StepName::Summarization,
        StepName::Analysis,
    ];
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Collection => "collection",
            Self::Filtering => "filtering",
            Self::Scraping => "scraping",
            Self::Summarization => "summarization",
            Self::Analysis => "analysis",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StepName {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection" => Ok(Self::Collection),
            "filtering" => Ok(Self::Filtering),
            "scraping" => Ok(Self::Scraping),
            "summarization" => Ok(Self::Summarization),
            "analysis" => Ok(Self::Analysis),
            other => Err(format!("unknown step_name: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            other => Err(format!("unknown step_status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStepState {
    pub run_id: String,
    pub step_name: StepName,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub article_count: i32,
    pub match_count: i32,
    pub error_message: Option<String>,
    pub can_resume: bool,
}

/// Opaque digest payload; schema documented in spec §3 / §4.10.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestContent {
    pub headline: String,
    pub why_it_matters: String,
    pub sources: Vec<String>,
    pub article_count: i32,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestState {
    pub digest_date: NaiveDate,
    pub topic: String,
    pub processed_article_ids: Vec<i64>,
    pub digest_content: DigestContent,
    pub article_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSignature {
    pub signature_id: String,
    pub date: NaiveDate,
    pub article_summary: String,
    pub topic_theme: String,
    pub source_article_id: i64,
    pub run_sequence: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupDecision {
    Duplicate,
    Unique,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduplicationLogEntry {
    pub date: NaiveDate,
    pub new_article_id: i64,
    pub matched_signature_id: Option<String>,
    pub decision: DedupDecision,
    pub confidence_score: Option<f64>,
    pub processing_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationType {
    Full,
    Incremental,
    Cached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestGenerationLog {
    pub digest_date: NaiveDate,
    pub generation_type: GenerationType,
    pub topics_processed: i32,
    pub total_articles: i32,
    pub new_articles: i32,
    pub api_calls_made: i32,
    pub execution_time_seconds: f64,
    pub created_at: DateTime<Utc>,
}
