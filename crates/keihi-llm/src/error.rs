use std::fmt;

#[derive(Debug, Clone)]
pub enum LlmError {
    MissingApiKey,
    Http(String),
    MalformedResponse(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::MissingApiKey => write!(f, "missing LLM API key"),
            LlmError::Http(msg) => write!(f, "LLM request failed: {msg}"),
            LlmError::MalformedResponse(msg) => write!(f, "malformed LLM response: {msg}"),
        }
    }
}

impl std::error::Error for LlmError {}
