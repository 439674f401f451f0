pub(crate) mod analysis;
pub(crate) mod cache;
pub(crate) mod normalize;
pub(crate) mod pipeline;
pub(crate) mod reservoir;
pub(crate) mod sources;

use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::ons::cache::TtlCache;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Unexpected status: {0}")]
    Status(reqwest::StatusCode),
    #[error("Empty response body")]
    EmptyBody,
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Expected a JSON array, got {0}")]
    NotAnArray(&'static str),
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Client for the ONS "energiaagora" feeds.
///
/// Every fetch goes through a per-URL TTL cache, and failures never leave
/// this type: they are logged and turned into the empty result.
pub struct OnsClient {
    client: Client,
    cache: TtlCache<String, Arc<Value>>,
}

impl OnsClient {
    pub fn new(
        timeout: Duration,
        cache_ttl: Duration,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            cache: TtlCache::new(cache_ttl),
        })
    }

    /// Fetch a time-series feed as raw records.
    /// Returns an empty vector when the feed is unavailable for any reason.
    pub async fn fetch_records(&self, url: &str) -> Vec<Value> {
        match self.try_fetch_records(url).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(url, error = %e, "feed unavailable");
                Vec::new()
            }
        }
    }

    /// Fetch a JSON document of any shape, `None` when unavailable
    pub async fn fetch_document(&self, url: &str) -> Option<Arc<Value>> {
        match self.cached_document(url).await {
            Ok(document) => Some(document),
            Err(e) => {
                tracing::warn!(url, error = %e, "document unavailable");
                None
            }
        }
    }

    async fn try_fetch_records(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        let document = self.cached_document(url).await?;
        match document.as_ref() {
            Value::Array(records) => Ok(records.clone()),
            other => Err(FetchError::NotAnArray(kind_of(other))),
        }
    }

    async fn cached_document(&self, url: &str) -> Result<Arc<Value>, FetchError> {
        if let Some(document) = self.cache.get(&url.to_string()) {
            tracing::trace!(url, "cache hit");
            return Ok(document);
        }

        let document = Arc::new(self.fetch_and_parse(url).await?);
        self.cache.insert(url.to_string(), Arc::clone(&document));
        tracing::trace!(url, entries = self.cache.len(), "cached");
        Ok(document)
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        let document: Value = serde_json::from_str(&body)?;
        tracing::debug!(url, bytes = body.len(), "fetched");
        Ok(document)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::test_support::spawn_upstream;
    use std::sync::atomic::Ordering;

    fn client(ttl: Duration) -> OnsClient {
        OnsClient::new(Duration::from_secs(5), ttl, "ons-monitor-test").unwrap()
    }

    #[tokio::test]
    async fn test_fetch_records_ok() {
        let (base, _) = spawn_upstream().await;
        let records = client(Duration::from_secs(15))
            .fetch_records(&format!("{}/ok", base))
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["geracao"], 60.0);
    }

    #[tokio::test]
    async fn test_failures_return_empty_sentinel() {
        let (base, _) = spawn_upstream().await;
        let client = client(Duration::from_secs(15));

        for path in ["server-error", "not-found", "empty", "invalid", "object", "empty-array"] {
            let records = client.fetch_records(&format!("{}/{}", base, path)).await;
            assert!(records.is_empty(), "{} should yield no records", path);
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_returns_empty_sentinel() {
        let client =
            OnsClient::new(Duration::from_millis(500), Duration::from_secs(15), "test").unwrap();
        // port 9 (discard) is closed on loopback in CI environments
        let records = client.fetch_records("http://127.0.0.1:9/feed").await;
        assert!(records.is_empty());
        assert!(client.fetch_document("not a url").await.is_none());
    }

    #[tokio::test]
    async fn test_results_are_memoized_per_url() {
        let (base, hits) = spawn_upstream().await;
        let client = client(Duration::from_secs(15));
        let url = format!("{}/ok", base);

        client.fetch_records(&url).await;
        client.fetch_records(&url).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let (base, hits) = spawn_upstream().await;
        let client = client(Duration::ZERO);
        let url = format!("{}/ok", base);

        client.fetch_records(&url).await;
        client.fetch_records(&url).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (base, _) = spawn_upstream().await;
        let client = client(Duration::from_secs(15));

        client.fetch_records(&format!("{}/server-error", base)).await;
        assert_eq!(client.cache.len(), 0);
    }

    #[tokio::test]
    async fn test_fetch_document_keeps_objects() {
        let (base, _) = spawn_upstream().await;
        let document = client(Duration::from_secs(15))
            .fetch_document(&format!("{}/object", base))
            .await
            .unwrap();

        assert!(document.is_object());
    }
}
