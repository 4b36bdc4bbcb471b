//! Error types for external tool invocation.
//!
//! # Design
//! - Constant messages with the spawned program and captured output as context.
//! - A non-zero exit is a distinct condition from a failure to spawn; the
//!   orchestrator treats both as stage failures but operators debug them
//!   differently.

use std::io;

use thiserror::Error;

/// Result alias for tool invocations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors raised while driving an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool process could not be spawned or awaited.
    #[error("failed to run external tool")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The tool exited with a non-zero status.
    #[error("external tool exited unsuccessfully")]
    NonZeroExit {
        /// Program that failed.
        program: String,
        /// Exit code when the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard error, when the invocation captured output.
        stderr: Option<String>,
    },
    /// The tool succeeded but produced output the pipeline cannot use.
    #[error("external tool produced unexpected output")]
    UnexpectedOutput {
        /// Program whose output failed parsing.
        program: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Raw output retained for debugging.
        output: String,
    },
}

impl ToolError {
    pub(crate) fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    pub(crate) fn non_zero(
        program: impl Into<String>,
        code: Option<i32>,
        stderr: Option<String>,
    ) -> Self {
        Self::NonZeroExit {
            program: program.into(),
            code,
            stderr,
        }
    }

    pub(crate) fn unexpected(
        program: impl Into<String>,
        reason: &'static str,
        output: impl Into<String>,
    ) -> Self {
        Self::UnexpectedOutput {
            program: program.into(),
            reason,
            output: output.into(),
        }
    }
}
