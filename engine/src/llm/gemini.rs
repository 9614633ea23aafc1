//! Gemini `generateContent` transport

use super::{LLMError, LLMProvider, Message, Role};
use crate::config::LLMConfig;
use async_trait::async_trait;
use serde_json::json;

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build a provider reading the API key from the configured env var
    pub fn from_config(config: &LLMConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable {} is not set. Export your Gemini API key there.",
                config.api_key_env
            )
        })?;
        Ok(Self::new(config.base_url.clone(), api_key))
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        messages: &[Message],
        system_prompt: &str,
        model: &str,
    ) -> super::Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let contents: Vec<_> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": if msg.role == Role::Model { "model" } else { "user" },
                    "parts": [{"text": msg.text}]
                })
            })
            .collect();

        let mut payload = serde_json::Map::new();
        payload.insert("contents".to_string(), json!(contents));

        if !system_prompt.is_empty() {
            payload.insert(
                "systemInstruction".to_string(),
                json!({"parts": [{"text": system_prompt}]}),
            );
        }

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                400 | 404 => LLMError::InvalidRequest(text),
                429 => LLMError::RateLimitExceeded,
                401 | 403 => LLMError::AuthenticationFailed(text),
                _ => LLMError::Overloaded(format!("Gemini API error ({}): {}", status, text)),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let candidate = data
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LLMError::ParseError("No candidates in response".to_string()))?;

        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .ok_or_else(|| LLMError::ParseError("No parts in candidate content".to_string()))?;

        let mut full_text = String::new();
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                full_text.push_str(text);
            }
        }

        Ok(full_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_complete_sends_roles_and_system_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(query_param("key", "k"))
            .and(body_partial_json(json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "model", "parts": [{"text": "hello"}]}
                ],
                "systemInstruction": {"parts": [{"text": "be brief"}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "Sure, "}, {"text": "done."}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(format!("{}/", server.uri()), "k");
        let text = provider
            .complete(
                &[Message::user("hi"), Message::model("hello")],
                "be brief",
                "gemini-test",
            )
            .await
            .unwrap();
        assert_eq!(text, "Sure, done.");
    }

    #[tokio::test]
    async fn test_status_codes_map_to_error_kinds() {
        let server = MockServer::start().await;
        for (model, status) in [("limited", 429u16), ("denied", 403), ("broken", 400), ("busy", 503)] {
            Mock::given(method("POST"))
                .and(path(format!("/models/{}:generateContent", model)))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;
        }

        let provider = GeminiProvider::new(server.uri(), "k");
        let call = |model: &'static str| {
            let provider = &provider;
            async move { provider.complete(&[Message::user("x")], "", model).await.unwrap_err() }
        };

        assert!(matches!(call("limited").await, LLMError::RateLimitExceeded));
        assert!(matches!(call("denied").await, LLMError::AuthenticationFailed(_)));
        assert!(matches!(call("broken").await, LLMError::InvalidRequest(_)));
        let busy = call("busy").await;
        assert!(matches!(busy, LLMError::Overloaded(_)));
        assert!(busy.is_capacity());
    }

    #[tokio::test]
    async fn test_missing_candidates_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"promptFeedback": {}})))
            .mount(&server)
            .await;

        let err = GeminiProvider::new(server.uri(), "k")
            .complete(&[Message::user("x")], "", "m")
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::ParseError(_)));
    }

    #[test]
    fn test_from_config_requires_key_env() {
        let config = LLMConfig {
            api_key_env: "WISP_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        let err = GeminiProvider::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("WISP_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
