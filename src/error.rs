//! Error kinds raised by the translation pipeline.
//!
//! Backend errors never reach callers of the resolver; they are logged and
//! the lookup falls through to the next tier. Administrative operations
//! surface the remaining kinds as structured results.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslationError {
    /// The translation backend could not be reached
    #[error("translation backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend did not answer within the per-call deadline
    #[error("translation backend timed out after {0:?}")]
    BackendTimeout(Duration),

    /// The backend answered with a non-success status
    #[error("translation backend returned {status}: {body}")]
    BackendBadResponse { status: u16, body: String },

    /// The backend body could not be parsed
    #[error("translation backend returned a malformed body: {0}")]
    BackendMalformed(String),

    /// The language code is not part of the master catalogue
    #[error("unknown language: {0}")]
    UnknownLanguage(String),

    /// The source language is always enabled
    #[error("the source language cannot be removed")]
    CannotRemoveSource,

    /// Writing the prebuilt store or registry state failed
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// Another build holds the builder lock
    #[error("a translation build is already in progress")]
    BuildInProgress,
}

impl TranslationError {
    /// Stable machine-readable reason used in admin responses.
    pub fn reason(&self) -> &'static str {
        match self {
            TranslationError::BackendUnavailable(_) => "backend_unavailable",
            TranslationError::BackendTimeout(_) => "backend_timeout",
            TranslationError::BackendBadResponse { .. } => "backend_bad_response",
            TranslationError::BackendMalformed(_) => "backend_malformed",
            TranslationError::UnknownLanguage(_) => "unknown_language",
            TranslationError::CannotRemoveSource => "cannot_remove_source",
            TranslationError::PersistenceFailed(_) => "persistence_failed",
            TranslationError::BuildInProgress => "build_in_progress",
        }
    }

    /// True for the kinds produced by the backend client.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            TranslationError::BackendUnavailable(_)
                | TranslationError::BackendTimeout(_)
                | TranslationError::BackendBadResponse { .. }
                | TranslationError::BackendMalformed(_)
        )
    }

    /// Wrap any persistence failure (I/O, serialization, database).
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        TranslationError::PersistenceFailed(err.to_string())
    }
}

pub type TranslationResult<T> = std::result::Result<T, TranslationError>;
