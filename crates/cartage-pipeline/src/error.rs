//! Error types for the pipeline engine.
//!
//! # Design
//! - Constant messages; paths and operation identifiers carried as fields.
//! - External tool failures wrap `ToolError` without re-logging at call sites;
//!   the orchestrator logs once at the stage boundary.

use std::io;
use std::path::PathBuf;

use cartage_toolchain::ToolError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors produced by the selection-and-pipeline engine.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// IO failures while interacting with the filesystem.
    #[error("pipeline io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Walkdir traversal failures.
    #[error("pipeline walkdir failure")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Path involved in the walkdir failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// The persisted cursor record could not be understood.
    #[error("pipeline cursor record invalid")]
    CursorInvalid {
        /// Path of the cursor record.
        path: PathBuf,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// A path could not be rendered for persistence.
    #[error("pipeline path is not valid UTF-8")]
    PathNotUtf8 {
        /// Field the path belongs to.
        field: &'static str,
        /// Offending path.
        path: PathBuf,
    },
    /// Cryptographic packaging failures.
    #[error("pipeline crypto failure")]
    Crypto {
        /// Operation that triggered the crypto failure.
        operation: &'static str,
        /// Path involved in the crypto failure.
        path: PathBuf,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// External tool failures surfaced through the toolchain boundary.
    #[error("pipeline tool failure")]
    Tool {
        /// Operation that invoked the tool.
        operation: &'static str,
        /// Underlying tool error.
        source: ToolError,
    },
    /// Required state was missing from the pipeline.
    #[error("pipeline missing state")]
    MissingState {
        /// State field that was missing.
        field: &'static str,
    },
}

impl PipelineError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn crypto(
        operation: &'static str,
        path: impl Into<PathBuf>,
        reason: &'static str,
    ) -> Self {
        Self::Crypto {
            operation,
            path: path.into(),
            reason,
        }
    }

    pub(crate) const fn tool(operation: &'static str, source: ToolError) -> Self {
        Self::Tool { operation, source }
    }
}
