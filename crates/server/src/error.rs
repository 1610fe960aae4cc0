//! Errors decoding host input.

/// Structured errors for malformed host events.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The event line is not valid JSON for any known event.
    #[error("INVALID_EVENT: {0}")]
    InvalidEvent(#[from] serde_json::Error),

    /// A wire request could not be turned into a request.
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::InvalidRequest("bad hex".into());
        assert!(err.to_string().starts_with("INVALID_REQUEST"));
    }
}
