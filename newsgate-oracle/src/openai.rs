//! Concrete [`Oracle`] backed by the OpenAI chat-completions API, grounded
//! on `ai-client::openai::client::OpenAiClient`'s request/response shape.

use async_trait::async_trait;
use newsgate_common::{PipelineError, Result};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;

use crate::schema::StructuredOutput;
use crate::traits::*;
use crate::wire::*;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiOracle {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    model_nano: String,
    model_mini: String,
    model_analysis: String,
}

impl OpenAiOracle {
    pub fn new(
        api_key: impl Into<String>,
        model_nano: impl Into<String>,
        model_mini: impl Into<String>,
        model_analysis: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            http: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("reqwest client builds with a fixed timeout"),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_nano: model_nano.into(),
            model_mini: model_mini.into(),
            model_analysis: model_analysis.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).expect("api key is ascii"),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    async fn chat(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![WireMessage::system(system), WireMessage::user(user)],
            temperature: if uses_max_completion_tokens(model) { None } else { Some(0.0) },
            max_completion_tokens: if uses_max_completion_tokens(model) { Some(2048) } else { None },
        };
        let response = self.send(&request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::OracleInvalidOutput {
                detail: "no choices in chat response".into(),
            })
    }

    async fn structured<T: StructuredOutput>(&self, model: &str, system: &str, user: &str) -> Result<T> {
        let request = StructuredRequest {
            model: model.to_string(),
            messages: vec![WireMessage::system(system), WireMessage::user(user)],
            temperature: if uses_max_completion_tokens(model) { None } else { Some(0.0) },
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: "structured_response".to_string(),
                    strict: true,
                    schema: T::openai_schema(),
                },
            },
        };
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %model, "oracle structured output request");
        let resp = self
            .http
            .post(&url)
            .headers(self.headers())
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::TransientNetwork { url: url.clone(), source: e.into() })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(PipelineError::OracleRateLimit { retry_after_secs: retry_after });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::OracleInvalidOutput {
                detail: format!("oracle http {status}: {body}"),
            });
        }

        let chat_response: ChatResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::OracleInvalidOutput { detail: e.to_string() })?;
        let json_str = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::OracleInvalidOutput {
                detail: "no choices in structured response".into(),
            })?;

        serde_json::from_str(&json_str)
            .map_err(|e| PipelineError::OracleInvalidOutput { detail: format!("schema mismatch: {e}") })
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .headers(self.headers())
            .json(request)
            .send()
            .await
            .map_err(|e| PipelineError::TransientNetwork { url: url.clone(), source: e.into() })?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(PipelineError::OracleRateLimit { retry_after_secs: None });
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::OracleInvalidOutput {
                detail: format!("oracle http {status}: {body}"),
            });
        }
        resp.json()
            .await
            .map_err(|e| PipelineError::OracleInvalidOutput { detail: e.to_string() })
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn triage(&self, request: TriageRequest, system_prompt: &str) -> Result<TriageVerdict> {
        let user = serde_json::to_string(&request)
            .map_err(|e| PipelineError::OracleInvalidOutput { detail: e.to_string() })?;
        self.structured::<TriageVerdict>(&self.model_nano, system_prompt, &user).await
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<ArticleSummary> {
        let system = "Summarize the given news article for a business-credit-risk monitoring \
            digest. Be factual and concise.";
        let user = serde_json::to_string(&request)
            .map_err(|e| PipelineError::OracleInvalidOutput { detail: e.to_string() })?;
        self.structured::<ArticleSummary>(&self.model_mini, system, &user).await
    }

    async fn cluster_titles(&self, titles: &[String]) -> Result<Vec<TitleGroupAssignment>> {
        let system = "You group near-duplicate news headlines about the same underlying story. \
            Reply with exactly one line per title in the form '<index>, <Group-label>'.";
        let user = titles
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{i}: {t}"))
            .collect::<Vec<_>>()
            .join("\n");
        let raw = self.chat(&self.model_nano, system, &user).await?;
        Ok(parse_cluster_response(&raw))
    }

    async fn compare_topic(
        &self,
        previous_context: &str,
        new_title: &str,
        new_summary: &str,
    ) -> Result<TopicComparison> {
        let system = "You determine whether a new article covers the same underlying topic as \
            any of the previously summarized articles below. Answer beginning with YES or NO.";
        let user = format!(
            "Previous articles from today:\n{previous_context}\n\nNew article:\nTitle: {new_title}\nSummary: {new_summary}"
        );
        let raw = self.chat(&self.model_mini, system, &user).await?;
        Ok(parse_comparison_response(&raw))
    }

    async fn full_digest(&self, topic: &str, articles: &[DigestArticle]) -> Result<FullDigest> {
        let system = format!(
            "Write a concise executive digest for new developments in the '{topic}' topic."
        );
        let user = render_articles(articles);
        self.structured::<FullDigest>(&self.model_analysis, &system, &user).await
    }

    async fn partial_digest(&self, topic: &str, new_articles: &[DigestArticle]) -> Result<PartialDigest> {
        let system = format!(
            "Summarize only the NEW developments to append to an existing digest for the \
             '{topic}' topic, at most 5 key insights and 3 important developments."
        );
        let user = render_articles(new_articles);
        self.structured::<PartialDigest>(&self.model_analysis, &system, &user).await
    }

    async fn merge_digest(
        &self,
        existing_headline: &str,
        existing_why_it_matters: &str,
        partial: &PartialDigest,
        topic: &str,
    ) -> Result<MergedDigest> {
        let system = format!(
            "Merge an existing digest with new partial findings for the '{topic}' topic into an \
             updated headline, why-it-matters paragraph, and sources list."
        );
        let user = serde_json::json!({
            "existing_headline": existing_headline,
            "existing_why_it_matters": existing_why_it_matters,
            "partial": partial,
        })
        .to_string();
        self.structured::<MergedDigest>(&self.model_analysis, &system, &user).await
    }
}

fn render_articles(articles: &[DigestArticle]) -> String {
    articles
        .iter()
        .map(|a| {
            format!(
                "- {} ({})\n  {}",
                a.title,
                a.published_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
                a.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses `"<index>, <Group-label>"` lines, ignoring malformed ones.
fn parse_cluster_response(raw: &str) -> Vec<TitleGroupAssignment> {
    raw.lines()
        .filter_map(|line| {
            let (idx_str, label) = line.split_once(',')?;
            let title_index: usize = idx_str.trim().parse().ok()?;
            Some(TitleGroupAssignment { title_index, group_label: label.trim().to_string() })
        })
        .collect()
}

/// A YES/NO verdict is the only part of the response treated as reliable;
/// free-text prose can contain digits (a year, a percentage) that have
/// nothing to do with which previous article matched, so none of it is
/// parsed as an index. Per spec §9 open question, a YES always matches the
/// first (most recent) previous signature, left for the caller to resolve.
fn parse_comparison_response(raw: &str) -> TopicComparison {
    let trimmed = raw.trim_start();
    if trimmed.to_uppercase().starts_with("YES") {
        TopicComparison { is_duplicate: true, matched_index: None }
    } else {
        TopicComparison { is_duplicate: false, matched_index: None }
    }
}
