//! Error types for the favarc CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 4=validation, 6=sync, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::{SourceError, SyncError};

/// Result type alias for favarc operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    DatabaseError,

    // Sync (exit 6)
    SyncError,
    RemoteError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::SyncError => "SYNC_ERROR",
            Self::RemoteError => "REMOTE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::DatabaseError => 2,
            Self::SyncError | Self::RemoteError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether re-running the same command may succeed.
    ///
    /// Remote failures are never retried automatically; a manual re-run is
    /// safe because inserts and exports are idempotent.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteError | Self::DatabaseError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in favarc operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: no archive database at {path}")]
    NotInitialized { path: PathBuf },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Remote fetch failed: {0}")]
    Remote(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Remote(_) => ErrorCode::RemoteError,
            Self::Sync(SyncError::Database(_)) => ErrorCode::DatabaseError,
            Self::Sync(_) => ErrorCode::SyncError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized { path } => Some(format!(
                "Run `favarc sync` to create the archive at {}, or pass --db.",
                path.display()
            )),
            Self::Remote(_) => Some(
                "Records fetched before the failure were kept and exported. \
                 Re-run `favarc sync` to continue."
                    .to_string(),
            ),
            Self::Config(msg) if msg.contains("endpoint") => Some(
                "Set FAVARC_ENDPOINT, pass --endpoint, or add \"endpoint\" to config.json."
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_errors_map_to_sync_exit_code() {
        let err = Error::from(SourceError::Status {
            status: 502,
            body: "bad gateway".into(),
        });
        assert_eq!(err.error_code(), ErrorCode::RemoteError);
        assert_eq!(err.exit_code(), 6);
        assert!(err.hint().is_some());
    }

    #[test]
    fn test_wrapped_database_error_keeps_category() {
        let err = Error::from(SyncError::Database("locked".into()));
        assert_eq!(err.error_code(), ErrorCode::DatabaseError);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_structured_json_shape() {
        let err = Error::NotInitialized {
            path: PathBuf::from("/tmp/favs/archive.db"),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "NOT_INITIALIZED");
        assert_eq!(json["error"]["exit_code"], 2);
        assert_eq!(json["error"]["retryable"], false);
        assert!(json["error"]["hint"]
            .as_str()
            .unwrap()
            .contains("/tmp/favs/archive.db"));
    }
}
