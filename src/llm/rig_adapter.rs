//! Bridges rig-core completion models to `LlmProvider`.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::completion::{CompletionModel, Prompt};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Wraps any rig `CompletionModel`.
///
/// A fresh single-turn agent is built per request so that preamble,
/// temperature and token cap follow the request.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut builder = AgentBuilder::new(self.model.clone());
        if let Some(preamble) = request.system_prompt() {
            builder = builder.preamble(&preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        let agent = builder.build();

        let content = agent
            .prompt(request.user_prompt())
            .await
            .map_err(|e| classify_prompt_error(self.provider, e.to_string()))?;

        Ok(CompletionResponse { content })
    }
}

/// Map a provider error message onto `LlmError`.
fn classify_prompt_error(provider: &str, reason: String) -> LlmError {
    let lower = reason.to_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("api key")
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_recognized() {
        let err = classify_prompt_error("gemini", "HttpError: 401 Unauthorized".into());
        assert!(matches!(err, LlmError::AuthFailed { .. }));

        let err = classify_prompt_error("gemini", "API key not valid".into());
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn other_errors_are_request_failures() {
        let err = classify_prompt_error("openai", "connection reset by peer".into());
        match err {
            LlmError::RequestFailed { provider, reason } => {
                assert_eq!(provider, "openai");
                assert!(reason.contains("connection reset"));
            }
            other => panic!("Expected RequestFailed, got {:?}", other),
        }
    }
}
