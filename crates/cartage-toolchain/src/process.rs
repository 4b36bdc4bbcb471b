//! Process-backed implementations of the toolchain capabilities.
//!
//! # Design
//! - Each invocation is awaited to completion before returning; the pipeline is
//!   strictly sequential and applies no timeout of its own.
//! - Commands are logged at INFO before they run so operators can replay them.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::error::{ToolError, ToolResult};
use crate::{Commitment, Containerizer, DealSubmitter};

/// Default binary name for the piece-commitment tool.
const DEFAULT_BOOSTX_BIN: &str = "boostx";

/// Content-addressing tool driven through its CLI.
#[derive(Debug, Clone)]
pub struct CarCli {
    binary: PathBuf,
}

impl CarCli {
    /// Wrap the content-addressing binary at `binary`.
    #[must_use]
    pub const fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn program(&self) -> String {
        self.binary.display().to_string()
    }
}

#[async_trait]
impl Containerizer for CarCli {
    async fn create(&self, container: &Path, source: &Path) -> ToolResult<()> {
        info!(
            program = %self.program(),
            container = %container.display(),
            source = %source.display(),
            "creating container"
        );
        let output = Command::new(&self.binary)
            .arg("create")
            .arg("-f")
            .arg(container)
            .arg("--version")
            .arg("1")
            .arg(source)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| ToolError::spawn(self.program(), err))?;
        if !output.status.success() {
            return Err(ToolError::non_zero(
                self.program(),
                output.status.code(),
                Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            ));
        }
        Ok(())
    }

    async fn root_identifier(&self, container: &Path) -> ToolResult<String> {
        info!(program = %self.program(), container = %container.display(), "resolving container root");
        let output = Command::new(&self.binary)
            .arg("root")
            .arg(container)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| ToolError::spawn(self.program(), err))?;
        if !output.status.success() {
            return Err(ToolError::non_zero(
                self.program(),
                output.status.code(),
                Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            ));
        }
        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if root.is_empty() {
            return Err(ToolError::unexpected(
                self.program(),
                "empty root identifier",
                String::from_utf8_lossy(&output.stdout).into_owned(),
            ));
        }
        Ok(root)
    }
}

/// Piece-commitment tool driven through its CLI.
#[derive(Debug, Clone)]
pub struct BoostxCli {
    binary: PathBuf,
}

impl BoostxCli {
    /// Wrap the piece-commitment binary at `binary`.
    #[must_use]
    pub const fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn program(&self) -> String {
        self.binary.display().to_string()
    }
}

impl Default for BoostxCli {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_BOOSTX_BIN))
    }
}

#[async_trait]
impl crate::CommitmentProver for BoostxCli {
    async fn commitment(&self, container: &Path) -> ToolResult<Commitment> {
        info!(program = %self.program(), container = %container.display(), "computing piece commitment");
        let output = Command::new(&self.binary)
            .arg("commp")
            .arg(container)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| ToolError::spawn(self.program(), err))?;
        if !output.status.success() {
            return Err(ToolError::non_zero(
                self.program(),
                output.status.code(),
                Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            ));
        }
        parse_commp_output(&self.program(), &String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the three colon-delimited lines the commitment tool prints, in order:
/// commitment CID, piece size, container file size.
fn parse_commp_output(program: &str, output: &str) -> ToolResult<Commitment> {
    let mut values = output.lines().filter_map(|line| {
        line.split_once(':')
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    });

    let mut next = |reason: &'static str| {
        values
            .next()
            .map(str::to_string)
            .ok_or_else(|| ToolError::unexpected(program, reason, output))
    };

    Ok(Commitment {
        commp_cid: next("missing commitment line")?,
        piece_size: next("missing piece size line")?,
        container_size: next("missing container size line")?,
    })
}

/// Executes submission commands through the system shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellSubmitter;

#[async_trait]
impl DealSubmitter for ShellSubmitter {
    async fn submit(&self, command: &str) -> ToolResult<()> {
        info!(command = %command, "executing submission command");
        // Inherit stdio so the downstream tool's progress reaches the run log.
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .await
            .map_err(|err| ToolError::spawn("sh", err))?;
        if !status.success() {
            return Err(ToolError::non_zero("sh", status.code(), None));
        }
        Ok(())
    }
}
