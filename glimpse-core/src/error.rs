//! Core error handling module
//!
//! • One enum for every failure the preview pipeline can meet
//! • `CompactString` payloads keep hot-path errors off the heap
//! • `trace()` emits a single structured `tracing` event
//! • `#[non_exhaustive]` for forward-compatible extension
use std::{
    io::{self, ErrorKind},
    path::Path,
    time::Duration,
};

use compact_str::{CompactString, ToCompactString};
use thiserror::Error;
use tracing::{Level, event};

/// Convenient alias carrying our unified error type
pub type CoreResult<T> = Result<T, CoreError>;

/// Primary error enumeration (grouped by concern)
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CoreError {
    // ────────────────────────────────────────────────────────────
    // Type resolution
    // ────────────────────────────────────────────────────────────
    #[error("MIME detection failed for {path}: {reason}")]
    DetectionFailed {
        path: CompactString,
        reason: CompactString,
    },

    #[error("No preview rule for MIME type {mime}")]
    NoMimeRule { mime: CompactString },

    // ────────────────────────────────────────────────────────────
    // Collaborators
    // ────────────────────────────────────────────────────────────
    #[error("Archive error on {path}: {reason}")]
    Archive {
        path: CompactString,
        reason: CompactString,
    },

    #[error("Decode error on {path}: {reason}")]
    Decode {
        path: CompactString,
        reason: CompactString,
    },

    #[error("External tool {command} failed: {reason}")]
    ExternalTool {
        command: CompactString,
        reason: CompactString,
    },

    #[error("External tool {command} timed out after {timeout_ms} ms")]
    ToolTimeout {
        command: CompactString,
        timeout_ms: u64,
    },

    // ────────────────────────────────────────────────────────────
    // Scheduling
    // ────────────────────────────────────────────────────────────
    #[error("Preview request {generation} superseded")]
    Superseded { generation: u64 },

    // ────────────────────────────────────────────────────────────
    // File-system
    // ────────────────────────────────────────────────────────────
    #[error("FS operation failed: {kind:?}")]
    FileSystem {
        kind: ErrorKind,
        #[source]
        source: Box<io::Error>,
    },

    // ────────────────────────────────────────────────────────────
    // Configuration
    // ────────────────────────────────────────────────────────────
    #[error("Invalid config: {field} - {message}")]
    Config {
        field: CompactString,
        message: CompactString,
    },

    /// Caching layer error.
    #[error("Cache error: {0}")]
    Cache(CompactString),

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(CompactString),
}

// ────────────────────────────────────────────────────────────────────────────
// Fast classification helpers
// ────────────────────────────────────────────────────────────────────────────
impl CoreError {
    /// Errors that map onto a placeholder instead of a failure notification
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DetectionFailed { .. }
                | Self::NoMimeRule { .. }
                | Self::Archive { .. }
                | Self::Decode { .. }
                | Self::ExternalTool { .. }
                | Self::ToolTimeout { .. }
                | Self::FileSystem { .. }
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }

    #[inline]
    #[must_use]
    pub const fn operation_type(&self) -> &'static str {
        match self {
            Self::DetectionFailed { .. } | Self::NoMimeRule { .. } => "type_resolution",

            Self::Archive { .. } => "archive_listing",

            Self::Decode { .. } => "decode",

            Self::ExternalTool { .. } | Self::ToolTimeout { .. } => "external_tool",

            Self::Superseded { .. } => "supersession",

            Self::FileSystem { .. } => "file_system",

            Self::Config { .. } => "config",

            Self::Cache(_) => "cache",

            Self::Other(_) => "unknown_error",
        }
    }

    /// Emit one structured error event and hand the error back
    #[must_use]
    pub fn trace(self) -> Self {
        event!(
            Level::ERROR,
            marker = self.error_marker(),
            operation_type = self.operation_type(),
            error = %self,
            recoverable = self.is_recoverable(),
        );

        self
    }

    // ────────────────────────────────────────────────────────────
    // Smart constructors
    // ────────────────────────────────────────────────────────────
    #[inline]
    #[must_use]
    pub fn detection_failed(path: &Path, reason: &str) -> Self {
        Self::DetectionFailed {
            path: path.display().to_compact_string(),
            reason: CompactString::new(reason),
        }
    }

    #[inline]
    #[must_use]
    pub fn no_mime_rule(mime: &str) -> Self {
        Self::NoMimeRule {
            mime: CompactString::new(mime),
        }
    }

    #[inline]
    #[must_use]
    pub fn archive(path: &Path, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.display().to_compact_string(),
            reason: reason.to_string().into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn decode(path: &Path, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.display().to_compact_string(),
            reason: reason.to_string().into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn external_tool(command: &str, reason: impl ToString) -> Self {
        Self::ExternalTool {
            command: CompactString::new(command),
            reason: reason.to_string().into(),
        }
    }

    #[inline]
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "Timeouts are far below u64::MAX ms")]
    pub fn tool_timeout(command: &str, timeout: Duration) -> Self {
        Self::ToolTimeout {
            command: CompactString::new(command),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    #[inline]
    #[must_use]
    pub fn config(field: &str, message: impl ToString) -> Self {
        Self::Config {
            field: CompactString::new(field),
            message: message.to_string().into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn other(message: impl ToString) -> Self {
        Self::Other(message.to_string().into())
    }

    #[inline]
    #[must_use]
    const fn error_marker(&self) -> &'static str {
        match self {
            Self::DetectionFailed { .. } => "ERROR_DETECTION_FAILED",

            Self::NoMimeRule { .. } => "ERROR_NO_MIME_RULE",

            Self::Archive { .. } => "ERROR_ARCHIVE",

            Self::Decode { .. } => "ERROR_DECODE",

            Self::ExternalTool { .. } => "ERROR_EXTERNAL_TOOL",

            Self::ToolTimeout { .. } => "ERROR_TOOL_TIMEOUT",

            Self::Superseded { .. } => "PREVIEW_SUPERSEDED",

            Self::FileSystem { .. } => "ERROR_FILE_SYSTEM",

            Self::Config { .. } => "ERROR_CONFIG",

            Self::Cache(_) => "ERROR_MOKA_CACHE",

            Self::Other(_) => "ERROR_UNKNOWN",
        }
    }
}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        Self::FileSystem {
            kind: err.kind(),
            source: Box::new(err),
        }
    }
}

impl From<globset::Error> for CoreError {
    fn from(err: globset::Error) -> Self {
        Self::config("plugins.file_one.mime_rules", err)
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::other(format!("background task aborted: {err}"))
    }
}
