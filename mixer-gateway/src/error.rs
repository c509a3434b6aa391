//! Gateway-side error taxonomy: `unavailable` (backend I/O) and
//! `cache-transient` (cache read/write), on top of the translator's `invalid-input`/
//! `internal`/`not-found` kinds it re-exports for callers that see both layers.

use std::fmt;

pub use mixer_translate::error::ErrorKind as TranslateErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Internal,
    Unavailable,
    CacheTransient,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Internal => "internal",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::CacheTransient => "cache-transient",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("translation failed: {0}")]
    Translate(#[from] mixer_translate::error::TranslateError),
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("cache error: {message}")]
    CacheTransient { message: String },
}

impl GatewayError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        GatewayError::Unavailable {
            message: message.into(),
        }
    }

    pub fn cache_transient(message: impl Into<String>) -> Self {
        GatewayError::CacheTransient {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Translate(e) => match e.kind() {
                TranslateErrorKind::InvalidInput => ErrorKind::InvalidInput,
                TranslateErrorKind::NotFound => ErrorKind::NotFound,
                TranslateErrorKind::Internal => ErrorKind::Internal,
            },
            GatewayError::Unavailable { .. } => ErrorKind::Unavailable,
            GatewayError::CacheTransient { .. } => ErrorKind::CacheTransient,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
