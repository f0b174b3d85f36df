//! Error types for kinder-core operations.
//!
//! Nothing in the engine is fatal: callers log these and carry on with the
//! next poll or the next user action.

use std::path::PathBuf;

use kinder_protocol::ProtocolError;

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshot source errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failures reported by a [`SnapshotSource`](crate::source::SnapshotSource).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The referenced entity is gone (deleted movie, unknown user).
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// The request never produced a usable answer.
    #[error("Transport failed during {operation}: {details}")]
    Transport { operation: String, details: String },

    #[error(transparent)]
    Decode(#[from] ProtocolError),
}

impl SourceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        SourceError::NotFound { what: what.into() }
    }

    pub fn transport(operation: impl Into<String>, details: impl Into<String>) -> Self {
        SourceError::Transport {
            operation: operation.into(),
            details: details.into(),
        }
    }

    /// Resolution failures drop a single entry; everything else aborts the
    /// current refresh.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, SourceError::NotFound { .. })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum KinderError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file unreadable: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Replay Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Replay script unreadable: {path}: {source}")]
    ReplayRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Replay script malformed: {path}: {source}")]
    ReplayMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Cursor Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("No movie is awaiting a decision")]
    NoMoviePresented,

    #[error("Nothing to correct")]
    NothingToCorrect,

    #[error("Voting has ended: {reason}")]
    CursorEnded { reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Source Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Convenience type alias for Results using KinderError.
pub type Result<T> = std::result::Result<T, KinderError>;
