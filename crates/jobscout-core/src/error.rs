use thiserror::Error;

/// Application-wide error types for jobscout.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (fetching a page without a browser).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The browser driver failed to open, navigate or query a page.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// Operation timed out.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The input could not be parsed as a fetchable URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The driver cannot perform the requested interaction
    /// (e.g. clicking a script-only control on a static page).
    #[error("Unsupported by driver: {0}")]
    Unsupported(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_cause() {
        let err = AppError::Timeout(15);
        assert_eq!(err.to_string(), "Operation timed out after 15 seconds");
        let err = AppError::ConfigError("JOBSCOUT_MAX_WORKERS must be at least 1".into());
        assert!(err.to_string().contains("JOBSCOUT_MAX_WORKERS"));
    }
}
