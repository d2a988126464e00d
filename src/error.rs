use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// DNS, connection refused, TLS, or a broken body stream
    Network,
    Timeout,
    /// The server answered with a non-2xx status
    HttpStatus,
    InvalidUrl,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Network => write!(f, "network error"),
            FetchErrorKind::Timeout => write!(f, "timeout"),
            FetchErrorKind::HttpStatus => write!(f, "HTTP error"),
            FetchErrorKind::InvalidUrl => write!(f, "invalid URL"),
        }
    }
}

/// A failed HTTP interaction, reduced to owned data so it can travel inside task events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}: {message}", .code.map(|c| format!(" {}", c)).unwrap_or_default())]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub code: Option<u16>,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn status(status: reqwest::StatusCode) -> Self {
        Self {
            kind: FetchErrorKind::HttpStatus,
            code: Some(status.as_u16()),
            message: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FetchErrorKind::Timeout
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::status(status);
        }

        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_builder() {
            FetchErrorKind::InvalidUrl
        } else {
            FetchErrorKind::Network
        };

        Self::new(kind, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Transport failure or non-2xx answer from the API
    Network,
    /// Well-formed JSON without the field the action needs
    MissingField,
    /// Body was not the JSON shape the action expects
    Decode,
}

/// Failure talking to the link-unrestriction API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("API error ({kind:?}{}): {reason}", .code.map(|c| format!(", code {}", c)).unwrap_or_default())]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub code: Option<u16>,
    pub reason: String,
}

impl ApiError {
    pub fn missing_field(field: &str) -> Self {
        Self {
            kind: ApiErrorKind::MissingField,
            code: None,
            reason: format!("response has no '{}' field", field),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Decode,
            code: None,
            reason: reason.into(),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            code: err.code,
            reason: err.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("cannot write {}: {message}", .path.display())]
    Filesystem { path: PathBuf, message: String },
    #[error("stream read failed: {0}")]
    Stream(String),
    #[error("no data received for {0} seconds")]
    Timeout(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task {0} panicked")]
    Panicked(String),
    #[error("task {0} was aborted")]
    Aborted(String),
}
