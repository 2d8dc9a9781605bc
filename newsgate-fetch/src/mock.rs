//! Scripted [`PageFetcher`] for adapter/pipeline tests: no network, no
//! DATABASE_URL, just a fixed map of URL to canned response, following the
//! hand-written mock style used throughout the teacher workspace instead of
//! a generic HTTP-mocking crate.

use async_trait::async_trait;
use newsgate_common::{PipelineError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::http::{FetchedPage, PageFetcher};

#[derive(Default)]
pub struct MockPageFetcher {
    responses: Mutex<HashMap<String, FetchedPage>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.with_final_url(url, body, None)
    }

    pub fn with_final_url(self, url: impl Into<String>, body: impl Into<String>, final_url: Option<String>) -> Self {
        let url = url.into();
        let final_url = final_url.unwrap_or_else(|| url.clone());
        self.responses.lock().unwrap().insert(
            url,
            FetchedPage { final_url, status: 200, body: bytes::Bytes::from(body.into().into_bytes()) },
        );
        self
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn get(&self, url: &str) -> Result<FetchedPage> {
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::TransientNetwork {
                url: url.to_string(),
                source: anyhow::anyhow!("no scripted response for {url}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_scripted_body_for_registered_url() {
        let fetcher = MockPageFetcher::new().with_page("https://example.com/a", "hello");
        let page = fetcher.get("https://example.com/a").await.unwrap();
        assert_eq!(&page.body[..], b"hello");
    }

    #[tokio::test]
    async fn unscripted_url_is_a_transient_network_error() {
        let fetcher = MockPageFetcher::new();
        let err = fetcher.get("https://example.com/missing").await.unwrap_err();
        assert!(matches!(err, PipelineError::TransientNetwork { .. }));
    }
}
