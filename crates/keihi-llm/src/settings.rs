use std::env;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f64 = 0.2;
const DEFAULT_TIMEOUT_MS: u64 = 20_000;

/// Connection settings for the generative UI call.
///
/// Both the credential and the model are optional: an unconfigured
/// generator is not an error, callers are expected to fall back to a
/// deterministic builder instead.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl LlmSettings {
    /// Read settings from the environment, `KEIHI_LLM_*` first with
    /// OpenAI-style variables as fallback.
    pub fn from_env() -> Self {
        let base_url = env::var("KEIHI_LLM_BASE_URL")
            .or_else(|_| env::var("OPENAI_BASE_URL"))
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = env::var("KEIHI_LLM_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|value| !value.is_empty());
        let model = env::var("KEIHI_LLM_MODEL")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let temperature = env::var("KEIHI_LLM_TEMPERATURE")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);
        let timeout = env::var("KEIHI_LLM_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS));

        Self {
            base_url,
            api_key,
            model,
            temperature,
            timeout,
        }
    }

    /// Whether enough is configured to attempt a generative call.
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_unconfigured() {
        let settings = LlmSettings::default();
        assert!(!settings.is_configured());
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn empty_api_key_counts_as_unconfigured() {
        let settings = LlmSettings {
            api_key: Some(String::new()),
            ..LlmSettings::default()
        };
        assert!(!settings.is_configured());
    }

    #[test]
    fn present_api_key_counts_as_configured() {
        let settings = LlmSettings {
            api_key: Some("sk-test".to_string()),
            ..LlmSettings::default()
        };
        assert!(settings.is_configured());
    }
}
