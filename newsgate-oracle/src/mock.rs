//! Scripted [`Oracle`] fake for pipeline step tests, grounded on the
//! hand-written mock pattern used for `ai-client` consumers elsewhere in the
//! teacher workspace (no mockall, no network).

use async_trait::async_trait;
use newsgate_common::Result;
use std::sync::Mutex;

use crate::traits::*;

#[derive(Default)]
pub struct MockOracle {
    pub triage_verdict: Mutex<Option<TriageVerdict>>,
    pub summary: Mutex<Option<ArticleSummary>>,
    pub cluster_groups: Mutex<Vec<TitleGroupAssignment>>,
    pub comparison: Mutex<Option<TopicComparison>>,
    pub full_digest_response: Mutex<Option<FullDigest>>,
    pub partial_digest_response: Mutex<Option<PartialDigest>>,
    pub merge_response: Mutex<Option<MergedDigest>>,
    pub fail_next: Mutex<bool>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_triage(self, verdict: TriageVerdict) -> Self {
        *self.triage_verdict.lock().unwrap() = Some(verdict);
        self
    }

    pub fn with_summary(self, summary: ArticleSummary) -> Self {
        *self.summary.lock().unwrap() = Some(summary);
        self
    }

    pub fn with_comparison(self, comparison: TopicComparison) -> Self {
        *self.comparison.lock().unwrap() = Some(comparison);
        self
    }

    pub fn failing() -> Self {
        let mock = Self::new();
        *mock.fail_next.lock().unwrap() = true;
        mock
    }

    fn maybe_fail(&self) -> Result<()> {
        if *self.fail_next.lock().unwrap() {
            return Err(newsgate_common::PipelineError::OracleInvalidOutput {
                detail: "mock oracle configured to fail".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn triage(&self, request: TriageRequest, _system_prompt: &str) -> Result<TriageVerdict> {
        self.maybe_fail()?;
        Ok(self.triage_verdict.lock().unwrap().clone().unwrap_or(TriageVerdict {
            is_match: false,
            confidence: 0.0,
            topic: request.topic,
            reason: "no scripted verdict".into(),
        }))
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<ArticleSummary> {
        self.maybe_fail()?;
        Ok(self.summary.lock().unwrap().clone().unwrap_or(ArticleSummary {
            title: request.title,
            summary: "stub summary".into(),
            key_points: vec!["point one".into()],
            entities: Default::default(),
        }))
    }

    async fn cluster_titles(&self, titles: &[String]) -> Result<Vec<TitleGroupAssignment>> {
        self.maybe_fail()?;
        let scripted = self.cluster_groups.lock().unwrap();
        if !scripted.is_empty() {
            return Ok(scripted.clone());
        }
        Ok(titles
            .iter()
            .enumerate()
            .map(|(i, t)| TitleGroupAssignment { title_index: i, group_label: t.clone() })
            .collect())
    }

    async fn compare_topic(
        &self,
        _previous_context: &str,
        _new_title: &str,
        _new_summary: &str,
    ) -> Result<TopicComparison> {
        self.maybe_fail()?;
        Ok(self
            .comparison
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(TopicComparison { is_duplicate: false, matched_index: None }))
    }

    async fn full_digest(&self, topic: &str, articles: &[DigestArticle]) -> Result<FullDigest> {
        self.maybe_fail()?;
        Ok(self.full_digest_response.lock().unwrap().clone().unwrap_or(FullDigest {
            headline: format!("{topic} update"),
            why_it_matters: "stub".into(),
            sources: articles.iter().map(|a| a.url.clone()).collect(),
            article_count: articles.len() as i32,
            generated_at: "2026-01-01T00:00:00Z".into(),
        }))
    }

    async fn partial_digest(&self, _topic: &str, new_articles: &[DigestArticle]) -> Result<PartialDigest> {
        self.maybe_fail()?;
        Ok(self.partial_digest_response.lock().unwrap().clone().unwrap_or(PartialDigest {
            key_insights: vec!["stub insight".into()],
            important_developments: vec![],
            new_sources: new_articles.iter().map(|a| a.url.clone()).collect(),
            entities_mentioned: Default::default(),
            article_count: new_articles.len() as i32,
            generated_at: "2026-01-01T00:00:00Z".into(),
        }))
    }

    async fn merge_digest(
        &self,
        existing_headline: &str,
        existing_why_it_matters: &str,
        _partial: &PartialDigest,
        _topic: &str,
    ) -> Result<MergedDigest> {
        self.maybe_fail()?;
        Ok(self.merge_response.lock().unwrap().clone().unwrap_or(MergedDigest {
            headline: existing_headline.to_string(),
            why_it_matters: existing_why_it_matters.to_string(),
            sources: vec![],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_mock_returns_oracle_invalid_output() {
        let oracle = MockOracle::failing();
        let err = oracle
            .triage(
                TriageRequest {
                    title: "t".into(),
                    url: "u".into(),
                    topic: "credit_risk".into(),
                    priority_score: None,
                    source_tier: None,
                },
                "system",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, newsgate_common::PipelineError::OracleInvalidOutput { .. }));
    }

    #[tokio::test]
    async fn scripted_triage_is_returned_verbatim() {
        let oracle = MockOracle::new().with_triage(TriageVerdict {
            is_match: true,
            confidence: 0.95,
            topic: "credit_risk".into(),
            reason: "clear match".into(),
        });
        let verdict = oracle
            .triage(
                TriageRequest {
                    title: "t".into(),
                    url: "u".into(),
                    topic: "credit_risk".into(),
                    priority_score: None,
                    source_tier: None,
                },
                "system",
            )
            .await
            .unwrap();
        assert!(verdict.is_match);
        assert_eq!(verdict.confidence, 0.95);
    }
}
