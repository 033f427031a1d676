use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::config::OpenAiSettings;
use crate::openai;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("timed out")]
    Timeout,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("unparseable payload: {0}")]
    ParseFailure(String),
}

/// One prompt for one enhancement branch.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub branch: &'static str,
    pub instructions: String,
    pub input: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

/// The external model service. Implementations return the reply's JSON
/// object; shaping it into a branch payload is the caller's job.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn run(&self, request: LlmRequest) -> Result<serde_json::Value, LlmError>;
}

/// Used when no API key is configured; every branch falls back.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLlmClient;

#[async_trait]
impl LlmClient for DisabledLlmClient {
    async fn run(&self, _request: LlmRequest) -> Result<serde_json::Value, LlmError> {
        Err(LlmError::Provider("no LLM provider configured".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiLlmClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiLlmClient {
    pub fn new(settings: &OpenAiSettings) -> anyhow::Result<Self> {
        // Branch and stage deadlines are enforced by the caller; this only
        // stops a wedged connection from lingering.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("build OpenAI http client")?;
        Ok(Self {
            client,
            endpoint: openai::responses_endpoint(&settings.base_url),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    async fn run(&self, request: LlmRequest) -> Result<serde_json::Value, LlmError> {
        tracing::debug!(branch = request.branch, model = %self.model, "llm request");

        let text = openai::responses_text(
            &self.client,
            openai::ResponsesCall {
                endpoint: &self.endpoint,
                api_key: &self.api_key,
                model: &self.model,
                instructions: &request.instructions,
                input: &request.input,
                max_output_tokens: request.max_output_tokens,
                temperature: request.temperature,
            },
        )
        .await
        .map_err(|err| LlmError::Provider(format!("{err:#}")))?;

        let payload = openai::json_payload(&text)
            .ok_or_else(|| LlmError::ParseFailure("reply contains no JSON object".to_string()))?;
        serde_json::from_str(payload).map_err(|err| LlmError::ParseFailure(err.to_string()))
    }
}

/// The OpenAI client when settings are present, otherwise the disabled one.
pub fn client_from_settings(
    openai_settings: Option<&OpenAiSettings>,
) -> anyhow::Result<Arc<dyn LlmClient>> {
    match openai_settings {
        Some(settings) => {
            tracing::info!(model = %settings.model, "LLM enhancement via OpenAI");
            Ok(Arc::new(OpenAiLlmClient::new(settings)?))
        }
        None => {
            tracing::info!("OPENAI_API_KEY is not set; AI enhancement will use fallbacks");
            Ok(Arc::new(DisabledLlmClient))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_client_always_fails() {
        let err = DisabledLlmClient
            .run(LlmRequest {
                branch: "entity",
                instructions: String::new(),
                input: String::new(),
                max_output_tokens: 10,
                temperature: 0.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Provider(_)));
    }
}
