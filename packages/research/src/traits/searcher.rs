//! Web search provider used by the gathering step.
//!
//! Calls must go through the provider's shared
//! [`RateLimiter`](crate::throttle::RateLimiter); the step chain does this,
//! so implementations stay unthrottled.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::security::SecretString;
use crate::types::SearchHit;

#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Search the web and return up to `num_results` hits for the query.
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>>;

    fn provider(&self) -> &str {
        "search"
    }
}

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Tavily-backed web searcher.
pub struct TavilyWebSearcher {
    api_key: SecretString,
    client: reqwest::Client,
    endpoint: String,
    search_depth: String,
}

impl TavilyWebSearcher {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key),
            client: reqwest::Client::new(),
            endpoint: TAVILY_URL.to_string(),
            search_depth: "advanced".to_string(),
        }
    }

    /// Point the searcher at another endpoint (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    include_raw_content: bool,
}

#[derive(Deserialize)]
struct TavilyResponse {
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    title: Option<String>,
    content: Option<String>,
    raw_content: Option<String>,
    score: Option<f32>,
}

#[async_trait]
impl WebSearcher for TavilyWebSearcher {
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>> {
        if self.api_key.is_empty() {
            return Err(PipelineError::Configuration("TAVILY_API_KEY is empty".into()));
        }

        let request = TavilyRequest {
            query,
            search_depth: &self.search_depth,
            max_results: num_results,
            include_raw_content: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::transient("tavily", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("tavily", status, &body));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::permanent("tavily", format!("malformed response: {}", e)))?;

        Ok(parsed
            .results
            .into_iter()
            .take(num_results)
            .map(|r| {
                let text = r.raw_content.or(r.content).unwrap_or_default();
                let mut hit = SearchHit::new(r.url, text);
                if let Some(title) = r.title {
                    hit = hit.with_title(title);
                }
                if let Some(score) = r.score {
                    hit = hit.with_score(score);
                }
                hit
            })
            .collect())
    }

    fn provider(&self) -> &str {
        "tavily"
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub(crate) fn classify_status(provider: &str, status: StatusCode, body: &str) -> PipelineError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.chars().take(300).collect::<String>());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
        PipelineError::transient(provider, message)
    } else {
        PipelineError::permanent(provider, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(classify_status("tavily", StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify_status("tavily", StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = classify_status("tavily", StatusCode::UNAUTHORIZED, "invalid api key");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn empty_key_is_a_configuration_error() {
        let searcher = TavilyWebSearcher::new("  ");
        let err = searcher.search("seo", 3).await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
