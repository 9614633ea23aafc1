//! `web_fetch` capability: HTTP GET returning the body as text

use async_trait::async_trait;
use sdk::{Capability, CapabilityCall, CapabilityResult};
use std::time::Duration;
use tracing::{info, warn};

pub struct WebFetch {
    client: reqwest::Client,
}

impl WebFetch {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wisp/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl Capability for WebFetch {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch an http(s) URL with GET and return the response body as text."
    }

    fn arguments_hint(&self) -> &str {
        r#"{"url": "https://example.com"}"#
    }

    async fn execute(&self, call: &CapabilityCall) -> CapabilityResult {
        let Some(url) = call.arg_str("url") else {
            return CapabilityResult::failed("ERROR: web_fetch requires a string 'url'");
        };

        let parsed = match reqwest::Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            Ok(u) => {
                return CapabilityResult::failed(format!(
                    "ERROR: unsupported URL scheme '{}'",
                    u.scheme()
                ))
            }
            Err(e) => return CapabilityResult::failed(format!("ERROR: invalid URL: {}", e)),
        };

        info!("Fetching {}", parsed);

        let response = match self.client.get(parsed).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("web_fetch failed: {}", e);
                return CapabilityResult::failed(format!("ERROR: request failed: {}", e));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return CapabilityResult::failed(format!("ERROR: unreadable body: {}", e)),
        };

        if status.is_success() {
            CapabilityResult::ok(body)
        } else {
            CapabilityResult::failed(format!("HTTP {}\n{}", status, body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_ok_and_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello page"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .mount(&server)
            .await;

        let cap = WebFetch::new(Duration::from_secs(5));

        let ok = cap
            .execute(&CapabilityCall::new(
                "web_fetch",
                json!({"url": format!("{}/page", server.uri())}),
            ))
            .await;
        assert!(ok.success);
        assert_eq!(ok.output, "hello page");

        let missing = cap
            .execute(&CapabilityCall::new(
                "web_fetch",
                json!({"url": format!("{}/missing", server.uri())}),
            ))
            .await;
        assert!(!missing.success);
        assert!(missing.output.starts_with("HTTP 404"));
    }

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let cap = WebFetch::new(Duration::from_secs(5));
        let result = cap
            .execute(&CapabilityCall::new("web_fetch", json!({"url": "file:///etc/passwd"})))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("scheme"));
    }
}
