use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TvAgentError>;

#[derive(Debug, Error)]
pub enum TvAgentError {
    #[error("device connection failed: {0}")]
    Connection(String),

    #[error("device call timed out after {0:?}")]
    Timeout(Duration),

    #[error("unknown capability `{0}`")]
    CapabilityNotFound(String),

    #[error("invalid arguments for `{capability}`: {details}")]
    InvalidArguments {
        capability: String,
        details: String,
    },

    #[error("target `{target}` not found on screen (saw: {})", .seen.join(", "))]
    NavigationTargetNotFound { target: String, seen: Vec<String> },

    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("tool selector call failed: {0}")]
    Selector(String),

    #[error("profile store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TvAgentError {
    /// Transport timeouts are surfaced as partial failures and never retried;
    /// connection failures get one reconnect-and-retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}
