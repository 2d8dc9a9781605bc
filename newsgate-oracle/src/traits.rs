//! The external AI oracle, narrowed from `ai-client::traits::Agent` /
//! `OutputBuilder` to the single-turn, strict-JSON-schema shape this domain
//! needs: no multi-turn tool calling, no embeddings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsgate_common::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// (a) Triage input, per spec §6 oracle contract (a).
#[derive(Debug, Clone, Serialize)]
pub struct TriageRequest {
    pub title: String,
    pub url: String,
    pub topic: String,
    pub priority_score: Option<f64>,
    pub source_tier: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TriageVerdict {
    pub is_match: bool,
    pub confidence: f64,
    pub topic: String,
    pub reason: String,
}

/// (b) Summary input/output, per spec §4.7.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRequest {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ArticleSummary {
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub entities: HashMap<String, Vec<String>>,
}

/// (c) Title clustering: one `(title_index, group_label)` pair per response
/// line, per spec §4.6 step 1.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleGroupAssignment {
    pub title_index: usize,
    pub group_label: String,
}

/// (d) Topic comparison verdict, per spec §4.9 step 4.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicComparison {
    pub is_duplicate: bool,
    /// Index into the candidate signature list the oracle named as the
    /// match, when it named one unambiguously.
    pub matched_index: Option<usize>,
}

/// (e) Full digest, per spec §4.10 step 4.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FullDigest {
    pub headline: String,
    pub why_it_matters: String,
    pub sources: Vec<String>,
    pub article_count: i32,
    pub generated_at: String,
}

/// (e) Partial digest, per spec §4.10 step 5.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PartialDigest {
    pub key_insights: Vec<String>,
    pub important_developments: Vec<String>,
    pub new_sources: Vec<String>,
    pub entities_mentioned: HashMap<String, Vec<String>>,
    pub article_count: i32,
    pub generated_at: String,
}

/// (e) Digest merge result, per spec §4.10 step 5.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MergedDigest {
    pub headline: String,
    pub why_it_matters: String,
    pub sources: Vec<String>,
}

/// One article carried into a digest or merge call.
#[derive(Debug, Clone)]
pub struct DigestArticle {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn triage(&self, request: TriageRequest, system_prompt: &str) -> Result<TriageVerdict>;

    async fn summarize(&self, request: SummaryRequest) -> Result<ArticleSummary>;

    async fn cluster_titles(&self, titles: &[String]) -> Result<Vec<TitleGroupAssignment>>;

    async fn compare_topic(
        &self,
        previous_context: &str,
        new_title: &str,
        new_summary: &str,
    ) -> Result<TopicComparison>;

    async fn full_digest(&self, topic: &str, articles: &[DigestArticle]) -> Result<FullDigest>;

    async fn partial_digest(&self, topic: &str, new_articles: &[DigestArticle]) -> Result<PartialDigest>;

    async fn merge_digest(
        &self,
        existing_headline: &str,
        existing_why_it_matters: &str,
        partial: &PartialDigest,
        topic: &str,
    ) -> Result<MergedDigest>;
}
