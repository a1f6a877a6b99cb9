use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::settings::LlmSettings;

/// A collaborator that can author a UI document from a prompt.
///
/// The returned string is the raw model output; callers own validation
/// and any fallback decision.
#[async_trait]
pub trait UiGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

/// `UiGenerator` backed by an OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleGenerator {
    settings: LlmSettings,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiCompatibleGenerator {
    /// Build a generator from settings. Fails when no API key is set.
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        if !settings.is_configured() {
            return Err(LlmError::MissingApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| LlmError::Http(error.to_string()))?;
        Ok(Self { settings, client })
    }

    /// Build a generator from the environment, `None` when no credential
    /// is configured.
    pub fn from_env() -> Option<Self> {
        let settings = LlmSettings::from_env();
        if !settings.is_configured() {
            return None;
        }
        Self::new(settings).ok()
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl UiGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey)?;
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.settings.temperature,
        };

        let send = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send();
        let response = tokio::time::timeout(self.settings.timeout, send)
            .await
            .map_err(|_| LlmError::Http("request timed out".to_string()))?
            .map_err(|error| LlmError::Http(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "generative UI call rejected");
            return Err(LlmError::Http(format!("status {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| LlmError::MalformedResponse(error.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("no choices in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_requires_api_key() {
        let err = OpenAiCompatibleGenerator::new(LlmSettings::default()).err();
        assert!(matches!(err, Some(LlmError::MissingApiKey)));
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let settings = LlmSettings {
            api_key: Some("sk-test".to_string()),
            base_url: "https://example.test/v1/".to_string(),
            ..LlmSettings::default()
        };
        let generator = OpenAiCompatibleGenerator::new(settings).expect("generator");
        assert_eq!(generator.endpoint(), "https://example.test/v1/chat/completions");
    }

    #[test]
    fn response_parsing_reads_first_choice() {
        let raw = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "[{\"beginRendering\": {}}]"}}
            ]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).expect("parse");
        let content = parsed.choices[0].message.content.as_deref();
        assert_eq!(content, Some("[{\"beginRendering\": {}}]"));
    }
}
