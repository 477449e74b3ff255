//! Errors from language model calls.

/// Failure modes of a chat-completion request.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("model API returned {code}: {body}")]
    Status { code: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("model call timed out after {0} seconds")]
    Timeout(u64),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("stream error: {0}")]
    Stream(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Http(e.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        LlmError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let e = LlmError::Status {
            code: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(e.to_string(), "model API returned 429: rate limited");
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(LlmError::from(err), LlmError::Parse(_)));
    }
}
