//! Domain models for the pipeline engine.
//!
//! # Design
//! - Pure data carriers; persistence and traversal live in their own modules.
//! - `ArchiveSlot` owns every artifact name derived from one allocated
//!   sequence number so naming stays consistent across stages.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

const BYTES_PER_GIB: f64 = 1_073_741_824.0;

/// Durable pointer to the last successfully included (user, file) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// User directory the file belongs to.
    pub user_id: String,
    /// Full path of the last included file.
    pub file_path: PathBuf,
}

/// A file observed during scanning, with the attributes selection needs.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// Base name used as the archive entry name.
    pub name: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Modification time.
    pub mtime: DateTime<Utc>,
    /// Whether the file is older than the configured age threshold.
    pub is_aged: bool,
}

/// Outcome of one eligibility scan.
#[derive(Debug, Default)]
pub struct Selection {
    /// Files chosen for the current archive, in traversal order.
    pub batch: Vec<CandidateFile>,
    /// Cumulative size of the batch in bytes.
    pub total_bytes: u64,
    /// Pointer to persist when the run finalizes (last file added wins).
    pub next_cursor: Option<Cursor>,
}

/// Artifact naming for one allocated archive sequence number.
#[derive(Debug, Clone)]
pub struct ArchiveSlot {
    stem: String,
    number: u32,
}

impl ArchiveSlot {
    /// Combine the day/server prefix with a 5-digit zero-padded number.
    #[must_use]
    pub fn new(prefix: &str, number: u32) -> Self {
        Self {
            stem: format!("{prefix}{number:05}"),
            number,
        }
    }

    /// Common stem shared by every artifact of this slot.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Last five digits of the sequence, driving provider sharding.
    #[must_use]
    pub const fn shard(&self) -> u32 {
        self.number % 100_000
    }

    /// Raw archive file name.
    #[must_use]
    pub fn tar_name(&self) -> String {
        format!("{}.tar", self.stem)
    }

    /// Encrypted archive file name.
    #[must_use]
    pub fn encrypted_name(&self) -> String {
        format!("{}.tar.aes", self.stem)
    }

    /// Content-addressed container file name.
    #[must_use]
    pub fn container_name(&self) -> String {
        format!("{}.tar.aes.car", self.stem)
    }

    /// Deal record file name.
    #[must_use]
    pub fn deal_name(&self) -> String {
        format!("{}.deal", self.stem)
    }

    /// Finalized deal record file name.
    #[must_use]
    pub fn done_name(&self) -> String {
        format!("{}.done", self.stem)
    }
}

/// Stages of the pipeline state machine, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    /// Cursor load and eligibility scan.
    Scan,
    /// Sequence allocation and retention for the committed batch.
    Batch,
    /// Tar packaging and encryption.
    Archive,
    /// Container creation from the encrypted archive.
    Containerize,
    /// Initial commitment and payload identifier computation.
    Commit,
    /// Deal record writing.
    WriteDeal,
    /// Post-write commitment verification.
    Verify,
    /// Submission command execution.
    Submit,
    /// Deal record rename and cursor advancement.
    Finalize,
}

impl StageKind {
    /// Stable identifier used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Batch => "batch",
            Self::Archive => "archive",
            Self::Containerize => "containerize",
            Self::Commit => "commit",
            Self::WriteDeal => "write_deal",
            Self::Verify => "verify",
            Self::Submit => "submit",
            Self::Finalize => "finalize",
        }
    }
}

/// Terminal outcome of one pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage succeeded; the cursor advanced.
    Finalized,
    /// The batch was empty or below the minimum size; nothing was mutated.
    SelectionInsufficient,
    /// A stage before verification failed; artifacts may remain for inspection.
    Aborted {
        /// Stage whose failure ended the run.
        stage: StageKind,
    },
    /// Verification disagreed with the recorded commitment; the deal record and
    /// container were deleted.
    RolledBack,
    /// A submission command failed; the deal record keeps its name for retry.
    SubmissionHalted {
        /// Number of commands that completed before the failure.
        submitted: usize,
    },
}

impl RunOutcome {
    /// Stable identifier used in log fields.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Finalized => "finalized",
            Self::SelectionInsufficient => "selection_insufficient",
            Self::Aborted { .. } => "aborted",
            Self::RolledBack => "rolled_back",
            Self::SubmissionHalted { .. } => "submission_halted",
        }
    }
}

/// Render a byte count in GiB for log lines.
#[must_use]
pub const fn bytes_to_gib(bytes: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let value = bytes as f64;
    value / BYTES_PER_GIB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_slot_derives_artifact_names() {
        let slot = ArchiveSlot::new("20240521sv01-", 11);
        assert_eq!(slot.stem(), "20240521sv01-00011");
        assert_eq!(slot.tar_name(), "20240521sv01-00011.tar");
        assert_eq!(slot.encrypted_name(), "20240521sv01-00011.tar.aes");
        assert_eq!(slot.container_name(), "20240521sv01-00011.tar.aes.car");
        assert_eq!(slot.deal_name(), "20240521sv01-00011.deal");
        assert_eq!(slot.done_name(), "20240521sv01-00011.done");
    }

    #[test]
    fn shard_keeps_last_five_digits() {
        assert_eq!(ArchiveSlot::new("p-", 6).shard(), 6);
        assert_eq!(ArchiveSlot::new("p-", 100_005).shard(), 5);
    }

    #[test]
    fn bytes_render_as_gib() {
        let four_gib = 4 * 1024 * 1024 * 1024;
        assert!((bytes_to_gib(four_gib) - 4.0).abs() < f64::EPSILON);
    }
}
