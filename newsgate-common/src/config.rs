//! Environment-loaded runtime configuration and YAML file configuration
//! (spec §6). Secrets and deployment knobs come from the environment;
//! feed/topic/pipeline shape comes from YAML files loaded by the caller.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// Recognized environment variables (spec §6), loaded once at process start.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub model_nano: String,
    pub model_mini: String,
    pub model_analysis: String,
    pub confidence_threshold: f64,
    pub max_items_per_feed: usize,
    pub request_timeout_sec: u64,
    pub crawl_delay_sec: u64,
    pub user_agent: String,
    pub pipeline_language: Language,
    pub skip_gnews_redirects: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    De,
    En,
}

impl std::str::FromStr for Language {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "de" => Ok(Self::De),
            "en" => Ok(Self::En),
            other => anyhow::bail!("PIPELINE_LANGUAGE must be 'de' or 'en', got '{other}'"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "newsgate.db".to_string()),
            model_nano: env::var("MODEL_NANO").unwrap_or_else(|_| "gpt-5-nano".to_string()),
            model_mini: env::var("MODEL_MINI").unwrap_or_else(|_| "gpt-5-mini".to_string()),
            model_analysis: env::var("MODEL_ANALYSIS").unwrap_or_else(|_| "gpt-5".to_string()),
            confidence_threshold: parse_env_or("CONFIDENCE_THRESHOLD", 0.70)?,
            max_items_per_feed: parse_env_or("MAX_ITEMS_PER_FEED", 50usize)?,
            request_timeout_sec: parse_env_or("REQUEST_TIMEOUT_SEC", 12u64)?,
            crawl_delay_sec: parse_env_or("CRAWL_DELAY_SEC", 0u64)?,
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "newsgate/0.1 (+https://example.invalid/bot)".to_string()),
            pipeline_language: env::var("PIPELINE_LANGUAGE")
                .ok()
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(Language::De),
            skip_gnews_redirects: parse_env_or("SKIP_GNEWS_REDIRECTS", true)?,
        })
    }

    /// Log a redacted view of the loaded configuration (no secrets here, but
    /// the pattern mirrors other call sites that do carry secrets).
    pub fn log_redacted(&self) {
        tracing::info!(
            db_path = %self.db_path,
            confidence_threshold = self.confidence_threshold,
            max_items_per_feed = self.max_items_per_feed,
            language = ?self.pipeline_language,
            "loaded configuration"
        );
    }
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} must parse: {e}")),
        Err(_) => Ok(default),
    }
}

// --- Feed configuration (YAML) ---

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    #[serde(default)]
    pub rss: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub sitemaps: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub html: HashMap<String, HtmlSourceConfig>,
    #[serde(default)]
    pub json: HashMap<String, JsonSourceConfig>,
    #[serde(default)]
    pub additional_rss: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub google_news_rss: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HtmlSourceConfig {
    pub url: String,
    pub selectors: HtmlSelectors,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HtmlSelectors {
    pub item: String,
    pub title: String,
    pub date: String,
    pub hidden_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonSourceConfig {
    pub url: String,
    pub item_path: String,
    pub fields: JsonFieldMapping,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonFieldMapping {
    pub url: String,
    pub title: String,
    pub published_at: String,
}

pub fn load_feed_config(path: &Path) -> Result<FeedConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read feed config: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse feed config: {}", path.display()))
}

// --- Topic configuration (YAML) ---

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicConfigFile {
    pub topics: HashMap<String, TopicConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub description: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_max_articles_per_run")]
    pub max_articles_per_run: u32,
    #[serde(default)]
    pub max_article_age_days: u32,
    #[serde(default)]
    pub skip_prefilter: bool,
    #[serde(default)]
    pub focus_areas: HashMap<String, FocusArea>,
    #[serde(default)]
    pub thresholds: TopicThresholds,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TopicThresholds {
    #[serde(default)]
    pub early_termination_at: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FocusArea {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: f64,
}

fn default_true() -> bool {
    true
}
fn default_confidence_threshold() -> f64 {
    0.70
}
fn default_max_articles_per_run() -> u32 {
    35
}
fn default_priority() -> f64 {
    1.0
}

pub fn load_topic_config(path: &Path) -> Result<TopicConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read topic config: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse topic config: {}", path.display()))
}

// --- Pipeline configuration (YAML) ---

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfigFile {
    pub pipeline: PipelineSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    pub filtering: FilteringSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilteringSection {
    pub confidence_threshold: f64,
    pub max_articles_to_process: u32,
}

pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pipeline config: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse pipeline config: {}", path.display()))
}
