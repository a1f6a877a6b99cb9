use std::fmt;

/// Unified error type for the keihi crate.
#[derive(Debug, Clone)]
pub enum AgentError {
    /// Malformed or unusable caller input (bad payload, unsupported file format).
    InvalidInput(String),
    /// A collaborating backend failed (OCR, generative UI).
    ExternalService(String),
    /// Claim persistence failed.
    Storage(String),
    /// The requested operation is not supported by this agent.
    Unsupported(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            AgentError::ExternalService(msg) => write!(f, "external service error: {msg}"),
            AgentError::Storage(msg) => write!(f, "storage error: {msg}"),
            AgentError::Unsupported(msg) => write!(f, "unsupported operation: {msg}"),
        }
    }
}

impl std::error::Error for AgentError {}

/// Result type alias using [`AgentError`].
pub type AgentResult<T> = Result<T, AgentError>;
