//! Shared HTTP client wrapper, grounded on `rootsignal-archive`'s per-service
//! `reqwest::Client::builder().timeout(...)` pattern (`services/feed.rs`,
//! `fetchers/page.rs`): one client per process, fixed timeout, fixed
//! user agent, no retries baked in here (steps decide what to retry).

use async_trait::async_trait;
use newsgate_common::{PipelineError, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub body: bytes::Bytes,
}

/// Seam between the source/extraction adapters and the network, grounded on
/// `rootsignal-scout::pipeline::traits::ContentFetcher`'s trait+mock split
/// so pipeline steps can be tested without a live HTTP server.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedPage>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        let user_agent = user_agent.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self { client, user_agent }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// HEAD a URL without following the usual GET cost, used by the
    /// redirector to cheaply resolve aggregator links. Falls back to a GET
    /// if the server rejects HEAD.
    pub async fn resolve_redirect(&self, url: &str) -> Result<String> {
        let head = self
            .client
            .head(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await;
        match head {
            Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
                Ok(resp.url().to_string())
            }
            _ => Ok(PageFetcher::get(self, url).await?.final_url),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    /// GET `url`, following redirects (reqwest's default policy), returning
    /// the final URL actually served alongside the raw body.
    async fn get(&self, url: &str) -> Result<FetchedPage> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| PipelineError::TransientNetwork { url: url.to_string(), source: e.into() })?;

        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(PipelineError::TransientNetwork {
                url: url.to_string(),
                source: anyhow::anyhow!("http {status} fetching {url}"),
            });
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::TransientNetwork { url: url.to_string(), source: e.into() })?;

        Ok(FetchedPage { final_url, status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_fixed_timeout() {
        let fetcher = HttpFetcher::new("newsgate/0.1", Duration::from_secs(5));
        assert_eq!(fetcher.user_agent, "newsgate/0.1");
    }
}
