//! Error Types
//!
//! Crate-wide error enum plus a stable, machine-readable error code for
//! callers that need to map failures onto fallback messages or telemetry.

use thiserror::Error;

/// Errors produced by flow-lock transitions and context storage
#[derive(Error, Debug)]
pub enum FlowError {
    /// A transition was requested that the current lock does not allow
    #[error("{0}")]
    InvalidState(String),

    /// Optimistic write lost against a concurrent writer
    #[error("Version conflict for session {session_id}: expected {expected}, found {found}")]
    VersionConflict {
        session_id: String,
        expected: i64,
        found: i64,
    },

    /// Context store backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Context record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for FlowError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Stable error codes, independent of the message text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidState,
    VersionConflict,
    Storage,
    Serialization,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid_state",
            Self::VersionConflict => "version_conflict",
            Self::Storage => "storage",
            Self::Serialization => "serialization",
        }
    }
}

impl FlowError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::VersionConflict { .. } => ErrorCode::VersionConflict,
            Self::Storage(_) => ErrorCode::Storage,
            Self::Serialization(_) => ErrorCode::Serialization,
        }
    }

    /// Whether the error indicates a caller logic bug rather than an I/O failure
    pub fn is_logic_error(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
