use thiserror::Error;

/// Everything that can go wrong between the client and the WordPress backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    /// The server answered `success: false`.
    #[error("{0}")]
    Rejected(String),
    #[error("not logged in")]
    NotAuthenticated,
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Short line suitable for a toast or alert dialog.
    pub fn alert_text(&self) -> String {
        match self {
            ApiError::Transport(_) | ApiError::Status(_) => {
                "Network error, please check your connection".to_string()
            }
            ApiError::Rejected(msg) if !msg.trim().is_empty() => msg.clone(),
            ApiError::Rejected(_) => "The server rejected the request".to_string(),
            ApiError::NotAuthenticated => "Please log in again".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::NotAuthenticated | ApiError::Status(401 | 403))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_is_shown_verbatim() {
        let err = ApiError::Rejected("Agent ID or password is wrong".into());
        assert_eq!(err.alert_text(), "Agent ID or password is wrong");
        assert_eq!(
            ApiError::Rejected("  ".into()).alert_text(),
            "The server rejected the request"
        );
    }

    #[test]
    fn auth_failures_are_recognised() {
        assert!(ApiError::NotAuthenticated.is_auth());
        assert!(ApiError::Status(401).is_auth());
        assert!(!ApiError::Status(500).is_auth());
        assert_eq!(ApiError::Status(502).to_string(), "HTTP 502");
    }
}
