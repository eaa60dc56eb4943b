//! reqwest-backed [`RemoteApiClient`].

use crate::{RemoteApiClient, RemoteFailure, RemoteResult, ReplayOutcome};
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::time::Duration;
use sync_queue::{HttpMethod, QueuedMutation};
use tracing::{debug, warn};
use url::Url;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL that relative endpoints resolve against.
    pub base_url: String,
    /// Request timeout in seconds. Timeouts surface as retryable failures.
    pub timeout_secs: u64,
    /// Path template used by `fetch`, resolved like an endpoint. The
    /// `{collection}` and `{id}` placeholders are substituted.
    pub resource_path: String,
}

/// REST convention: a resource lives at `<base>/<collection>/<id>`.
pub const DEFAULT_RESOURCE_PATH: &str = "{collection}/{id}";

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout_secs: 30,
            resource_path: DEFAULT_RESOURCE_PATH.to_string(),
        }
    }
}

/// Remote API client speaking JSON over HTTP.
pub struct HttpApiClient {
    base: Url,
    resource_path: String,
    client: Client,
}

impl HttpApiClient {
    pub fn new(config: HttpClientConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base: directory_url(&config.base_url)?,
            resource_path: config.resource_path,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Endpoint of one resource under the configured path template.
    fn resource_endpoint(&self, collection: &str, id: &str) -> String {
        self.resource_path
            .replace("{collection}", collection)
            .replace("{id}", id)
    }

    /// Resolve an endpoint. Absolute URLs are used as-is; anything else is
    /// appended below the base URL's path.
    fn resolve(&self, endpoint: &str) -> Result<Url, RemoteFailure> {
        if let Ok(absolute) = Url::parse(endpoint) {
            return Ok(absolute);
        }
        self.base
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| RemoteFailure {
                retryable: false,
                category: crate::StatusCategory::Client,
                status: None,
                message: format!("invalid endpoint '{endpoint}': {e}"),
            })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, RemoteFailure> {
        request.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else {
                "transport"
            };
            RemoteFailure::network(format!("{kind}: {e}"))
        })
    }
}

fn directory_url(raw: &str) -> RemoteResult<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Body as JSON, or `None` for empty or non-JSON bodies.
async fn json_body(response: Response) -> Option<Value> {
    let text = response.text().await.ok()?;
    if text.trim().is_empty() {
        return None;
    }
    serde_json::from_str(&text).ok()
}

#[async_trait]
impl RemoteApiClient for HttpApiClient {
    async fn replay(&self, mutation: &QueuedMutation) -> Result<ReplayOutcome, RemoteFailure> {
        let url = self.resolve(&mutation.endpoint)?;
        debug!(id = mutation.id, method = mutation.method.as_str(), url = %url, "Replaying mutation");

        let mut request = self.client.request(method(mutation.method), url);
        if !mutation.payload.is_null() {
            request = request.json(&mutation.payload);
        }

        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(id = mutation.id, status = status.as_u16(), "Replay rejected");
            return Err(RemoteFailure::from_status(status.as_u16(), body));
        }

        Ok(ReplayOutcome {
            resource: json_body(response).await,
        })
    }

    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteFailure> {
        let url = self.resolve(&self.resource_endpoint(collection, id))?;
        debug!(url = %url, "Fetching resource");

        let response = self.send(self.client.get(url)).await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteFailure::from_status(status.as_u16(), body));
        }
        Ok(json_body(response).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpApiClient {
        HttpApiClient::new(HttpClientConfig {
            base_url: base.to_string(),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = HttpClientConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:3000");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.resource_path, "{collection}/{id}");
    }

    #[test]
    fn test_resource_path_template() {
        let rest = client("http://api.local/v1");
        assert_eq!(
            rest.resolve(&rest.resource_endpoint("projects", "p1")).unwrap().as_str(),
            "http://api.local/v1/projects/p1"
        );

        let custom = HttpApiClient::new(HttpClientConfig {
            base_url: "http://api.local".to_string(),
            timeout_secs: 5,
            resource_path: "/api/{collection}?id={id}".to_string(),
        })
        .unwrap();
        assert_eq!(
            custom.resolve(&custom.resource_endpoint("tasks", "t7")).unwrap().as_str(),
            "http://api.local/api/tasks?id=t7"
        );
    }

    #[test]
    fn test_endpoint_resolves_below_base_path() {
        let c = client("http://api.local/v1");
        assert_eq!(c.resolve("/projects/p1").unwrap().as_str(), "http://api.local/v1/projects/p1");
        assert_eq!(c.resolve("projects").unwrap().as_str(), "http://api.local/v1/projects");
    }

    #[test]
    fn test_absolute_endpoint_is_kept() {
        let c = client("http://api.local/v1");
        assert_eq!(
            c.resolve("https://other.local/x").unwrap().as_str(),
            "https://other.local/x"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpApiClient::new(HttpClientConfig {
            base_url: "::nope".to_string(),
            timeout_secs: 5,
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
