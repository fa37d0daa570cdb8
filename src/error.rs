//! Error types for the hubcomplete application.

use hubcomplete_search::SearchError;

/// Top-level error type for the application crate.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration file could not be parsed, serialized or validated.
    #[error("config error: {0}")]
    Config(String),

    /// Search engine error.
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Host protocol channel error (stdin/stdout).
    #[error("channel error: {0}")]
    Channel(String),

    /// A host command was malformed or could not be applied.
    #[error("command error: {0}")]
    Command(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_errors_convert() {
        let err: AppError = SearchError::RateLimitExceeded.into();
        assert_eq!(err.to_string(), "search error: rate limit exceeded");
    }

    #[test]
    fn io_errors_convert() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.to_string().starts_with("I/O error"));
    }
}
