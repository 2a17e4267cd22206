use prwarden_core::WardenError;

/// Failure talking to the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The API answered with a non-success status.
    #[error("GitHub API error {status}: {message}")]
    Http { status: u16, message: String },

    /// The request did not complete within the configured timeout.
    #[error("GitHub request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure.
    #[error("GitHub request failed: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("unexpected GitHub response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// Whether an idempotent read may be attempted again.
    ///
    /// # Examples
    ///
    /// ```
    /// use prwarden_github::PlatformError;
    ///
    /// assert!(PlatformError::Http { status: 502, message: String::new() }.is_retryable());
    /// assert!(!PlatformError::Http { status: 404, message: String::new() }.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            PlatformError::Http { status, .. } => *status == 429 || *status >= 500,
            PlatformError::Timeout(_) | PlatformError::Transport(_) => true,
            PlatformError::Decode(_) => false,
        }
    }
}

impl From<PlatformError> for WardenError {
    fn from(err: PlatformError) -> Self {
        WardenError::Platform(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_retry() {
        for status in [429, 500, 502, 503] {
            let err = PlatformError::Http {
                status,
                message: "x".into(),
            };
            assert!(err.is_retryable(), "{status} should retry");
        }
    }

    #[test]
    fn client_errors_and_decode_do_not_retry() {
        for status in [400, 401, 403, 404, 422] {
            let err = PlatformError::Http {
                status,
                message: "x".into(),
            };
            assert!(!err.is_retryable(), "{status} should not retry");
        }
        assert!(!PlatformError::Decode("bad".into()).is_retryable());
        assert!(PlatformError::Timeout("slow".into()).is_retryable());
    }

    #[test]
    fn converts_into_warden_error() {
        let err: WardenError = PlatformError::Transport("reset".into()).into();
        assert!(matches!(err, WardenError::Platform(_)));
        assert!(err.to_string().contains("reset"));
    }
}
