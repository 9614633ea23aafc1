//! Model gateway with timeout and fallback
//!
//! Every call runs under a hard timeout. A capacity failure of the first
//! model (rate limit, overload, auth, timeout) is retried exactly once on the
//! fallback model; any other failure surfaces immediately. The orchestrator
//! never retries a single call itself.

use super::{LLMError, LLMProvider, Message};
use crate::config::LLMConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which model pair a call should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    /// Primary model, falling back to the fallback model
    Primary,

    /// Cheapest model, falling back to the primary model
    Cheap,
}

/// Language-model gateway used by every component that needs a completion
pub struct LLMGateway {
    provider: Arc<dyn LLMProvider>,
    primary_model: String,
    fallback_model: String,
    cheap_model: String,
    timeout: Duration,
}

impl LLMGateway {
    /// Create a gateway over a provider using the configured model names
    pub fn new(provider: Arc<dyn LLMProvider>, config: &LLMConfig) -> Self {
        Self {
            provider,
            primary_model: config.primary_model.clone(),
            fallback_model: config.fallback_model.clone(),
            cheap_model: config.cheap_model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// First and second model for a choice
    fn models(&self, choice: ModelChoice) -> (&str, &str) {
        match choice {
            ModelChoice::Primary => (&self.primary_model, &self.fallback_model),
            ModelChoice::Cheap => (&self.cheap_model, &self.primary_model),
        }
    }

    /// Complete a chat, falling back once on a capacity failure
    pub async fn complete(
        &self,
        messages: &[Message],
        system_prompt: &str,
        choice: ModelChoice,
    ) -> super::Result<String> {
        let (first, second) = self.models(choice);

        match self.attempt(messages, system_prompt, first).await {
            Ok(text) => Ok(text),
            Err(e) if e.is_capacity() && first != second => {
                warn!(model = first, error = %e, "Capacity failure, trying fallback model");
                self.attempt(messages, system_prompt, second)
                    .await
                    .map_err(|fallback_err| {
                        LLMError::FallbackExhausted(format!(
                            "{}: {}; {}: {}",
                            first, e, second, fallback_err
                        ))
                    })
            }
            Err(e) => Err(e),
        }
    }

    async fn attempt(
        &self,
        messages: &[Message],
        system_prompt: &str,
        model: &str,
    ) -> super::Result<String> {
        debug!(
            provider = self.provider.name(),
            model,
            messages = messages.len(),
            "Calling model"
        );

        match tokio::time::timeout(
            self.timeout,
            self.provider.complete(messages, system_prompt, model),
        )
        .await
        {
            Ok(Ok(text)) => {
                info!(model, chars = text.len(), "Model call succeeded");
                Ok(text)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(model, timeout_secs = self.timeout.as_secs(), "Model call timed out");
                Err(LLMError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    // Mock provider that fails for a configurable set of models
    struct MockProvider {
        failures: Vec<(&'static str, fn() -> LLMError)>,
        hang_on: Option<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                failures: Vec::new(),
                hang_on: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, model: &'static str, err: fn() -> LLMError) -> Self {
            self.failures.push((model, err));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LLMProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _system_prompt: &str,
            model: &str,
        ) -> super::super::Result<String> {
            self.calls.lock().unwrap().push(model.to_string());
            if self.hang_on == Some(model) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            match self.failures.iter().find(|(m, _)| *m == model) {
                Some((_, err)) => Err(err()),
                None => Ok(format!("answer from {}", model)),
            }
        }
    }

    fn test_config() -> LLMConfig {
        LLMConfig {
            primary_model: "pro".to_string(),
            fallback_model: "flash".to_string(),
            cheap_model: "lite".to_string(),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    fn gateway(provider: Arc<MockProvider>) -> LLMGateway {
        LLMGateway::new(provider, &test_config())
    }

    #[tokio::test]
    async fn test_primary_success_uses_one_call() {
        let provider = Arc::new(MockProvider::new());
        let text = gateway(Arc::clone(&provider))
            .complete(&[Message::user("hi")], "sys", ModelChoice::Primary)
            .await
            .unwrap();

        assert_eq!(text, "answer from pro");
        assert_eq!(provider.calls(), vec!["pro"]);
    }

    #[tokio::test]
    async fn test_capacity_failure_falls_back_once() {
        let provider =
            Arc::new(MockProvider::new().failing("pro", || LLMError::RateLimitExceeded));
        let text = gateway(Arc::clone(&provider))
            .complete(&[Message::user("hi")], "sys", ModelChoice::Primary)
            .await
            .unwrap();

        assert_eq!(text, "answer from flash");
        assert_eq!(provider.calls(), vec!["pro", "flash"]);
    }

    #[tokio::test]
    async fn test_non_capacity_failure_surfaces_immediately() {
        let provider = Arc::new(
            MockProvider::new().failing("pro", || LLMError::InvalidRequest("bad".into())),
        );
        let err = gateway(Arc::clone(&provider))
            .complete(&[Message::user("hi")], "sys", ModelChoice::Primary)
            .await
            .unwrap_err();

        assert!(matches!(err, LLMError::InvalidRequest(_)));
        assert_eq!(provider.calls(), vec!["pro"]);
    }

    #[tokio::test]
    async fn test_both_models_failing_is_exhausted() {
        let provider = Arc::new(
            MockProvider::new()
                .failing("pro", || LLMError::Overloaded("503".into()))
                .failing("flash", || LLMError::RateLimitExceeded),
        );
        let err = gateway(Arc::clone(&provider))
            .complete(&[Message::user("hi")], "sys", ModelChoice::Primary)
            .await
            .unwrap_err();

        assert!(matches!(err, LLMError::FallbackExhausted(_)));
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_cheap_choice_falls_back_to_primary() {
        let provider = Arc::new(
            MockProvider::new().failing("lite", || LLMError::AuthenticationFailed("401".into())),
        );
        let text = gateway(Arc::clone(&provider))
            .complete(&[Message::user("hi")], "sys", ModelChoice::Cheap)
            .await
            .unwrap();

        assert_eq!(text, "answer from pro");
        assert_eq!(provider.calls(), vec!["lite", "pro"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_capacity_failure() {
        let mut mock = MockProvider::new();
        mock.hang_on = Some("pro");
        let provider = Arc::new(mock);

        let text = gateway(Arc::clone(&provider))
            .with_timeout(Duration::from_secs(2))
            .complete(&[Message::user("hi")], "sys", ModelChoice::Primary)
            .await
            .unwrap();

        assert_eq!(text, "answer from flash");
        assert_eq!(provider.calls(), vec!["pro", "flash"]);
    }
}
