#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Capability boundary for the external tools the pipeline drives.
//!
//! The orchestrator only depends on the traits defined here; the process-backed
//! implementations in `process.rs` spawn the real binaries. Tests substitute
//! deterministic fakes so no stage of the state machine requires an installed
//! toolchain.

use std::path::Path;

use async_trait::async_trait;

pub mod error;
pub mod process;

pub use error::{ToolError, ToolResult};
pub use process::{BoostxCli, CarCli, ShellSubmitter};

/// Piece commitment attributes computed over a container file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    /// Piece commitment CID.
    pub commp_cid: String,
    /// Padded piece size, as reported by the tool.
    pub piece_size: String,
    /// Size of the container file itself, as reported by the tool.
    pub container_size: String,
}

/// Wraps an encrypted archive into a content-addressed container.
#[async_trait]
pub trait Containerizer: Send + Sync {
    /// Create `container` from `source`, blocking until the tool exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool cannot be spawned or exits non-zero.
    async fn create(&self, container: &Path, source: &Path) -> ToolResult<()>;

    /// Resolve the container's root as the payload identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails or reports an empty identifier.
    async fn root_identifier(&self, container: &Path) -> ToolResult<String>;
}

/// Computes piece commitments over container files.
#[async_trait]
pub trait CommitmentProver: Send + Sync {
    /// Compute the commitment, piece size, and container size for `container`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails or its output cannot be parsed.
    async fn commitment(&self, container: &Path) -> ToolResult<Commitment>;
}

/// Executes fully rendered deal submission commands.
#[async_trait]
pub trait DealSubmitter: Send + Sync {
    /// Run one submission command to completion; zero exit status is success.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    async fn submit(&self, command: &str) -> ToolResult<()>;
}
