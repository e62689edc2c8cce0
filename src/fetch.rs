//! Transport for dictionary files.
//!
//! The engine only needs "give me the dictionary at this path". [`Fetcher`]
//! is that seam; [`HttpFetcher`] is the stock implementation over `reqwest`.
//! Errors returned here never reach translation callers: the fetch cache
//! turns every failure into "not found".

use crate::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Parsed contents of one (language, namespace) dictionary file.
pub type Dictionary = Map<String, Value>;

/// Transport failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request for {path} returned status {status}")]
    Status { path: String, status: u16 },

    #[error("response for {path} is not valid JSON: {message}")]
    Decode { path: String, message: String },

    #[error("response for {path} is not a JSON object")]
    NotAnObject { path: String },
}

impl FetchError {
    /// Whether retrying the same request could succeed.
    ///
    /// Network errors, 5xx and 429 are transient; other statuses and bad
    /// payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Decode { .. } | FetchError::NotAnObject { .. } => false,
        }
    }
}

/// Fetches a dictionary by resource path.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, path: &str) -> Result<Dictionary, FetchError>;
}

/// Fetches dictionary files over HTTP(S).
///
/// Paths are joined onto `base_url` unless they are already absolute URLs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpFetcher {
    /// Create a fetcher with a default client (10s timeout) and the
    /// `asset_fetch` retry preset.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|source| FetchError::Request {
                path: base_url.clone(),
                source,
            })?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a fetcher around an existing client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            retry: RetryConfig::asset_fetch(),
        }
    }

    /// Build from `TRANSLATE_ASSET_BASE_URL` (default `http://localhost:8080`).
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("TRANSLATE_ASSET_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        Ok(Self::new(base_url)?)
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve an asset path against the base URL.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn fetch_once(&self, path: &str) -> Result<Dictionary, FetchError> {
        let url = self.url_for(path);
        debug!("Fetching dictionary {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Request {
            path: path.to_string(),
            source,
        })?;

        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(dictionary)) => Ok(dictionary),
            Ok(_) => Err(FetchError::NotAnObject {
                path: path.to_string(),
            }),
            Err(e) => Err(FetchError::Decode {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<Dictionary, FetchError> {
        with_retry_if(
            &self.retry,
            &format!("Dictionary {}", path),
            || self.fetch_once(path),
            FetchError::is_retryable,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn fetcher(base: &str) -> HttpFetcher {
        HttpFetcher::new(base)
            .unwrap()
            .with_retry(RetryConfig::new(3, Duration::from_millis(5)))
    }

    // ==================== URL Tests ====================

    #[test]
    fn test_url_for_joins_slashes() {
        let fetcher = HttpFetcher::new("http://example.com/").unwrap();
        assert_eq!(
            fetcher.url_for("/assets/i18n/en/common.json"),
            "http://example.com/assets/i18n/en/common.json"
        );
        assert_eq!(
            fetcher.url_for("assets/i18n/en/common.json"),
            "http://example.com/assets/i18n/en/common.json"
        );
    }

    #[test]
    fn test_url_for_keeps_absolute_urls() {
        let fetcher = HttpFetcher::new("http://example.com").unwrap();
        assert_eq!(
            fetcher.url_for("https://cdn.example.com/en.json"),
            "https://cdn.example.com/en.json"
        );
    }

    // ==================== Retryability Tests ====================

    #[test]
    fn test_status_retryability() {
        let status = |status| FetchError::Status {
            path: "p".to_string(),
            status,
        };
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
    }

    #[test]
    fn test_payload_errors_are_not_retryable() {
        assert!(!FetchError::NotAnObject {
            path: "p".to_string()
        }
        .is_retryable());
        assert!(!FetchError::Decode {
            path: "p".to_string(),
            message: "eof".to_string()
        }
        .is_retryable());
    }

    // ==================== HTTP Tests ====================

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/assets/i18n/en/common.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "test": "t" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let dictionary = fetcher(&mock_server.uri())
            .fetch("assets/i18n/en/common.json")
            .await
            .unwrap();

        assert_eq!(dictionary.get("test"), Some(&Value::from("t")));
    }

    #[tokio::test]
    async fn test_fetch_404_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/cy/common.json"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = fetcher(&mock_server.uri()).fetch("cy/common.json").await;

        assert!(matches!(
            result,
            Err(FetchError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_500_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/en/common.json"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&mock_server)
            .await;

        let result = fetcher(&mock_server.uri()).fetch("en/common.json").await;

        assert!(matches!(
            result,
            Err(FetchError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_non_object_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/en/list.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["a", "b"])))
            .mount(&mock_server)
            .await;

        let result = fetcher(&mock_server.uri()).fetch("en/list.json").await;
        assert!(matches!(result, Err(FetchError::NotAnObject { .. })));
    }

    #[tokio::test]
    async fn test_fetch_invalid_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/en/broken.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{ not json"))
            .mount(&mock_server)
            .await;

        let result = fetcher(&mock_server.uri()).fetch("en/broken.json").await;
        assert!(matches!(result, Err(FetchError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_fetch_connection_error() {
        let result = fetcher("http://localhost:1").fetch("en/common.json").await;
        assert!(matches!(result, Err(FetchError::Request { .. })));
    }
}
