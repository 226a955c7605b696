//! Error types and stable error codes for the engine.
//!
//! This module provides a unified error type (`EngineError`) that every
//! subsystem (resolver, analyzer, editor, refactorings, build runner) returns
//! at its boundary, plus the stable numeric codes that appear in JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Validation errors (missing/malformed argument from the caller)
//! - `3`: Resolution errors (file/type/member/symbol absent or ambiguous)
//! - `4`: Apply errors (uniqueness violations, filesystem failures)
//! - `5`: External tool errors (build failure or timeout)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! ## Design
//!
//! - **Unified type**: `EngineError` is the single error type crossing the
//!   operation boundary; nothing in the engine panics across it.
//! - **Actionable payloads**: `NotFound` carries suggestions, `Ambiguous`
//!   carries disambiguation candidates, `Uniqueness` carries the match count.
//!   The transport surfaces these verbatim so the caller can retry.

use std::fmt;
use std::io;

use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Stable numeric codes for JSON output and CLI exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from the caller.
    Validation = 2,
    /// Resolution errors (not found, ambiguous).
    Resolution = 3,
    /// Apply errors (uniqueness violation, IO failure).
    Apply = 4,
    /// External build tool failed or timed out.
    ExternalTool = 5,
    /// Internal errors (bugs, unexpected state).
    Internal = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for all engine operations.
///
/// Every variant carries enough context to produce an actionable message.
/// Operations recover these at the boundary and render them as descriptive
/// JSON results; they must never terminate the hosting process.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or malformed argument. Never proceeds.
    #[error("invalid arguments: {message}")]
    Validation { message: String },

    /// File/type/member/symbol absent. Carries up to 10 suggestions.
    #[error("{what} not found")]
    NotFound {
        what: String,
        suggestions: Vec<String>,
        /// Optional fuzzy-match diagnostic (editor zero-match fallback).
        detail: Option<String>,
    },

    /// A path or symbol resolves to more than one candidate. Never
    /// auto-resolved; candidates are resubmittable disambiguated forms.
    #[error("{what} is ambiguous ({} candidates)", candidates.len())]
    Ambiguous {
        what: String,
        candidates: Vec<String>,
    },

    /// A text-replace target occurs more than once. Never auto-picks one.
    #[error("text occurs {matches} times in {file}; provide more context to disambiguate")]
    Uniqueness {
        file: String,
        matches: usize,
        needle_preview: String,
    },

    /// Filesystem failure during read/write/copy.
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// External build subprocess exceeded the wall-clock timeout.
    #[error("build timed out after {seconds}s")]
    BuildTimeout { seconds: u64 },

    /// External build subprocess could not be run.
    #[error("build tool failure: {message}")]
    BuildFailure { message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    Internal { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&EngineError> for OutputErrorCode {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::Validation { .. } => OutputErrorCode::Validation,
            EngineError::NotFound { .. } => OutputErrorCode::Resolution,
            EngineError::Ambiguous { .. } => OutputErrorCode::Resolution,
            EngineError::Uniqueness { .. } => OutputErrorCode::Apply,
            EngineError::Io { .. } => OutputErrorCode::Apply,
            EngineError::BuildTimeout { .. } => OutputErrorCode::ExternalTool,
            EngineError::BuildFailure { .. } => OutputErrorCode::ExternalTool,
            EngineError::Internal { .. } => OutputErrorCode::Internal,
        }
    }
}

impl From<EngineError> for OutputErrorCode {
    fn from(err: EngineError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl EngineError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error without suggestions.
    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound {
            what: what.into(),
            suggestions: Vec::new(),
            detail: None,
        }
    }

    /// Create a not-found error carrying candidate suggestions.
    pub fn not_found_with_suggestions(
        what: impl Into<String>,
        suggestions: Vec<String>,
    ) -> Self {
        EngineError::NotFound {
            what: what.into(),
            suggestions,
            detail: None,
        }
    }

    /// Create an ambiguity error carrying disambiguation candidates.
    pub fn ambiguous(what: impl Into<String>, candidates: Vec<String>) -> Self {
        EngineError::Ambiguous {
            what: what.into(),
            candidates,
        }
    }

    /// Create an IO error tagged with the path it happened on.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal {
            message: message.into(),
        }
    }

    /// Get the stable output code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
