use thiserror::Error;

/// Result alias for operator calls.
pub type Result<T> = std::result::Result<T, OperatorError>;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// A required pattern failed to match. The page format has changed;
    /// fatal to the current call.
    #[error("parse error: {0}")]
    Parse(String),
}
