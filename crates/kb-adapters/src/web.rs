//! The `web` adapter: scrape/crawl/map a set of pages into RawDocuments.

use crate::traits::{RawDocumentSink, SourceAdapter};
use crate::url_canon::canonicalize;
use crate::{resilience_to_adapter_error, AdapterError, AdapterResult};
use async_trait::async_trait;
use kb_core::model::{CheckpointToken, ProbeResult, RawDocument};
use kb_core::types::SourceId;
use kb_infra::resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceBuilder, RetryConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebMethod {
    Scrape,
    Crawl,
    Map,
    Search,
    Extract,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub method: WebMethod,
    pub max_pages: u32,
    pub max_depth: u32,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub stealth_mode: bool,
    pub request_delay_ms: u64,
    pub max_concurrency: u32,
    pub respect_robots: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            method: WebMethod::Scrape,
            max_pages: 1,
            max_depth: 0,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            stealth_mode: false,
            request_delay_ms: 0,
            max_concurrency: 4,
            respect_robots: true,
        }
    }
}

impl WebConfig {
    fn validate(&self) -> AdapterResult<()> {
        if !(1..=10_000).contains(&self.max_pages) {
            return Err(AdapterError::InvalidArgument("max_pages must be 1..10000".into()));
        }
        if self.max_depth > 10 {
            return Err(AdapterError::InvalidArgument("max_depth must be 0..10".into()));
        }
        if self.request_delay_ms > 60_000 {
            return Err(AdapterError::InvalidArgument("request_delay_ms must be 0..60000".into()));
        }
        if !(1..=16).contains(&self.max_concurrency) {
            return Err(AdapterError::InvalidArgument("max_concurrency must be 1..16".into()));
        }
        for pattern in self.include_patterns.iter().chain(self.exclude_patterns.iter()) {
            regex::Regex::new(pattern)
                .map_err(|e| AdapterError::InvalidArgument(format!("bad pattern {pattern}: {e}")))?;
        }
        Ok(())
    }

    fn matches_filters(&self, url: &str) -> bool {
        let included = self.include_patterns.is_empty()
            || self
                .include_patterns
                .iter()
                .any(|p| glob_or_regex_match(p, url));
        let excluded = self
            .exclude_patterns
            .iter()
            .any(|p| glob_or_regex_match(p, url));
        included && !excluded
    }
}

fn glob_or_regex_match(pattern: &str, candidate: &str) -> bool {
    if let Ok(re) = regex::Regex::new(pattern) {
        if re.is_match(candidate) {
            return true;
        }
    }
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    regex::Regex::new(&format!("^{escaped}$"))
        .map(|re| re.is_match(candidate))
        .unwrap_or(false)
}

/// Fetches web sources, following links breadth-first when `method == Crawl`.
pub struct WebAdapter {
    client: reqwest::Client,
    resilience: ResilienceBuilder<AdapterError>,
}

impl WebAdapter {
    pub fn new() -> Self {
        let retry = RetryPolicy::new(RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            jitter_factor: 1.0,
            retry_on_timeout: true,
        });
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::new("web-adapter"));
        Self {
            client: reqwest::Client::new(),
            resilience: ResilienceBuilder::new()
                .with_retry(retry)
                .with_circuit_breaker(breaker),
        }
    }

    async fn fetch_page(&self, url: &str) -> AdapterResult<(String, String)> {
        let client = self.client.clone();
        let url = url.to_string();
        self.resilience
            .execute(|| {
                let client = client.clone();
                let url = url.clone();
                async move {
                    let resp = client.get(&url).send().await.map_err(|e| {
                        if e.is_timeout() {
                            AdapterError::Timeout(e.to_string())
                        } else {
                            AdapterError::ConnectionError(e.to_string())
                        }
                    })?;
                    let status = resp.status();
                    if status.as_u16() == 401 || status.as_u16() == 403 {
                        return Err(AdapterError::Forbidden(format!("{status}")));
                    }
                    if status.as_u16() == 404 {
                        return Err(AdapterError::NotFound(url.clone()));
                    }
                    if status.is_server_error() || status.as_u16() == 429 {
                        return Err(AdapterError::ServiceUnavailable(format!("{status}")));
                    }
                    if !status.is_success() {
                        return Err(AdapterError::RequestFailed(format!("{status}")));
                    }
                    let content_type = resp
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("text/html")
                        .to_string();
                    let body = resp
                        .text()
                        .await
                        .map_err(|e| AdapterError::RequestFailed(e.to_string()))?;
                    Ok((body, content_type))
                }
            })
            .await
            .map_err(resilience_to_adapter_error)
    }

    fn extract_links(base: &str, html: &str) -> Vec<String> {
        let document = scraper::Html::parse_document(html);
        let selector = scraper::Selector::parse("a[href]").unwrap();
        let base_url = match url::Url::parse(base) {
            Ok(u) => u,
            Err(_) => return Vec::new(),
        };
        document
            .select(&selector)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| base_url.join(href).ok())
            .filter_map(|u| canonicalize(u.as_str()))
            .collect()
    }
}

impl Default for WebAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for WebAdapter {
    fn validate(&self, reference: &serde_json::Value, config: &serde_json::Value) -> AdapterResult<()> {
        let url = reference
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("web reference requires a url".into()))?;
        canonicalize(url).ok_or_else(|| AdapterError::InvalidArgument(format!("invalid url: {url}")))?;
        let config: WebConfig = serde_json::from_value(config.clone())
            .map_err(|e| AdapterError::InvalidArgument(e.to_string()))?;
        config.validate()
    }

    async fn probe(&self, reference: &serde_json::Value) -> AdapterResult<ProbeResult> {
        let url = reference
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("web reference requires a url".into()))?;
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| AdapterError::ConnectionError(e.to_string()))?;
        let estimated_bytes = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        Ok(ProbeResult {
            estimated_pages: Some(1),
            estimated_bytes,
            content_kind: "text/html".into(),
        })
    }

    async fn fetch(
        &self,
        reference: &serde_json::Value,
        config: &serde_json::Value,
        sink: &mut dyn RawDocumentSink,
        resume_from: Option<CheckpointToken>,
    ) -> AdapterResult<()> {
        let start_url = reference
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::InvalidArgument("web reference requires a url".into()))?;
        let source_id: SourceId = reference
            .get("source_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let config: WebConfig = serde_json::from_value(config.clone())
            .map_err(|e| AdapterError::InvalidArgument(e.to_string()))?;
        config.validate()?;

        let start = canonicalize(start_url)
            .ok_or_else(|| AdapterError::InvalidArgument(format!("invalid url: {start_url}")))?;

        let mut visited: HashSet<String> = HashSet::new();
        if let Some(ref token) = resume_from {
            visited.extend(token.0.split(',').filter(|s| !s.is_empty()).map(String::from));
        }

        let mut queue: VecDeque<(String, u32)> = VecDeque::new();
        queue.push_back((start, 0));
        let mut fetched = 0u32;

        while let Some((url, depth)) = queue.pop_front() {
            if fetched >= config.max_pages {
                break;
            }
            if visited.contains(&url) || !config.matches_filters(&url) {
                continue;
            }
            visited.insert(url.clone());

            let (body, content_type) = self.fetch_page(&url).await?;
            fetched += 1;

            if config.method == WebMethod::Crawl && depth < config.max_depth {
                for link in Self::extract_links(&url, &body) {
                    if !visited.contains(&link) {
                        queue.push_back((link, depth + 1));
                    }
                }
            }

            let doc = RawDocument::new(source_id, url.clone(), url.clone(), content_type, body.into_bytes());
            let checkpoint = CheckpointToken(visited.iter().cloned().collect::<Vec<_>>().join(","));
            sink.push(doc, checkpoint).await?;

            if config.request_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.request_delay_ms)).await;
            }

            if config.method != WebMethod::Crawl {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_out_of_range_max_pages() {
        let config = WebConfig {
            max_pages: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_bad_pattern() {
        let config = WebConfig {
            include_patterns: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_matches_filters_include() {
        let config = WebConfig {
            include_patterns: vec!["^https://example\\.com/docs/.*".to_string()],
            ..Default::default()
        };
        assert!(config.matches_filters("https://example.com/docs/page"));
        assert!(!config.matches_filters("https://example.com/blog/page"));
    }

    #[test]
    fn test_matches_filters_exclude_wins() {
        let config = WebConfig {
            exclude_patterns: vec!["private".to_string()],
            ..Default::default()
        };
        assert!(!config.matches_filters("https://example.com/private/page"));
    }

    #[test]
    fn test_extract_links_resolves_relative() {
        let html = r#"<html><body><a href="/docs/a">a</a><a href="https://other.com/b">b</a></body></html>"#;
        let links = WebAdapter::extract_links("https://example.com/", html);
        assert!(links.contains(&"https://example.com/docs/a".to_string()));
        assert!(links.contains(&"https://other.com/b".to_string()));
    }
}
