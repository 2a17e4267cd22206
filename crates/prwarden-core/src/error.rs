/// Errors that can abort a prwarden run.
///
/// Only input and platform-metadata failures are expected to reach the
/// binary; reasoning-service and remediation failures are absorbed by the
/// pipeline and reported in the published comment instead.
///
/// # Examples
///
/// ```
/// use prwarden_core::WardenError;
///
/// let err = WardenError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The trigger could not be turned into a run (e.g. no subject identifier).
    #[error("invalid trigger: {0}")]
    Input(String),

    /// Hosting platform API failure.
    #[error("platform error: {0}")]
    Platform(String),

    /// Reasoning service failure.
    #[error("reasoning service error: {0}")]
    Reasoning(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: WardenError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = WardenError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn input_error_displays_message() {
        let err = WardenError::Input("no subject".into());
        assert_eq!(err.to_string(), "invalid trigger: no subject");
    }
}
