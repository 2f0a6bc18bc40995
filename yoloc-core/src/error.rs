//! Error types for yoloc core.

use std::{error::Error, fmt, io};

/// Error type for yoloc core operations.
#[derive(Debug)]
pub enum YolocError {
    /// An underlying I/O error.
    Io(io::Error),
    /// Transport-level HTTP failure (connect, TLS, timeout, status).
    Http(String),
    /// The remote API answered but reported an error payload.
    Remote(String),
    /// A response or persisted blob could not be decoded.
    Decode(String),
    /// Invalid configuration detected before any check runs.
    Config(String),
    /// The caller cancelled the run.
    Cancelled,
    /// A catch-all error with a message.
    Other(String),
}

impl YolocError {
    /// Whether this error is a configuration error that must abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl fmt::Display for YolocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Http(message) => write!(f, "http error: {message}"),
            Self::Remote(message) => write!(f, "remote api error: {message}"),
            Self::Decode(message) => write!(f, "decode error: {message}"),
            Self::Config(message) => write!(f, "invalid configuration: {message}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for YolocError {}

impl From<io::Error> for YolocError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<reqwest::Error> for YolocError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

impl From<serde_json::Error> for YolocError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// Convenience result type for yoloc core.
pub type Result<T> = std::result::Result<T, YolocError>;

#[cfg(test)]
mod tests {
    use super::YolocError;
    use std::io;

    #[test]
    fn io_error_formats_message() {
        let error = YolocError::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(format!("{error}"), "io error: boom");
    }

    #[test]
    fn config_error_is_fatal() {
        let error = YolocError::Config("missing owner".to_string());
        assert!(error.is_fatal());
        assert_eq!(format!("{error}"), "invalid configuration: missing owner");
        assert!(!YolocError::Remote("rate limited".to_string()).is_fatal());
    }

    #[test]
    fn from_json_error_maps_to_decode() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let error: YolocError = err.into();
        match error {
            YolocError::Decode(message) => assert!(!message.is_empty()),
            other => panic!("expected Decode variant, got {other:?}"),
        }
    }
}
