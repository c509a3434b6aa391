//! Error taxonomy for the translator.
//!
//! Two layers, following the same `FederationError`/`SingleFederationError` split
//! `apollo-federation` uses:
//! [`TranslateError`] is what callers match on; [`ErrorKind`] groups variants into a
//! small closed set, so a caller can decide propagation policy (`invalid-input`
//! and `internal` surface immediately; `not-found` surfaces as a typed failure; the
//! dispatcher downgrades `unavailable` to an empty result) without enumerating variants.

use std::fmt;

/// One of the five error kinds used across both crates. `unavailable` and
/// `cache-transient` are gateway-side kinds (see `mixer-gateway::error`); the translator
/// only ever produces the first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// A parse error location, carried so user-visible errors can point at the offending
/// line or token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.line)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid-input at {location}: {message}")]
    InvalidInput {
        message: String,
        location: SourceLocation,
    },
    #[error("not-found: {message}")]
    NotFound { message: String },
    #[error("internal: {message}")]
    Internal { message: String },
}

impl TranslateError {
    pub fn invalid_input(message: impl Into<String>, line: u32) -> Self {
        TranslateError::InvalidInput {
            message: message.into(),
            location: SourceLocation { line },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        TranslateError::NotFound {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TranslateError::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslateError::InvalidInput { .. } => ErrorKind::InvalidInput,
            TranslateError::NotFound { .. } => ErrorKind::NotFound,
            TranslateError::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Break out of the current function, returning an internal translator error.
///
/// Mirrors `apollo-federation::error`'s `bail!`/`internal_error!` macros, minus the
/// federation-specific machinery.
#[macro_export]
macro_rules! bail_internal {
    ( $( $arg:tt )+ ) => {
        return Err($crate::error::TranslateError::internal(format!( $( $arg )+ )))
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;
