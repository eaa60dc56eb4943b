//! Client construction errors.
//!
//! Request failures are not errors here; they are classified into
//! [`crate::RemoteFailure`] values for the caller to act on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Building the HTTP client failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Base or health URL does not parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = RemoteError::Config("timeout must be positive".to_string());
        assert_eq!(err.to_string(), "Configuration error: timeout must be positive");
    }

    #[test]
    fn url_error_from_parse() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: RemoteError = parse_err.into();
        assert!(err.to_string().starts_with("Invalid URL:"));
    }
}
