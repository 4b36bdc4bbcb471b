//! Typed configuration model for the pipeline.
//!
//! # Design
//! - Pure data carrier; loading and validation live in `loader.rs`/`validate.rs`.
//! - Size thresholds are configured in GiB and exposed in bytes, matching the
//!   units the scanner works in.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

/// Number of storage providers the deal generator shards across.
pub const PROVIDER_COUNT: usize = 6;

const BYTES_PER_GIB: f64 = 1_073_741_824.0;

/// Runtime settings for one pipeline invocation, sourced from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Server identity embedded in archive names.
    pub server_id: String,
    /// Root directory holding one subdirectory per user.
    pub source_dir: PathBuf,
    /// Directory receiving archives, containers, and deal records.
    pub target_dir: PathBuf,
    /// Directory holding durable job state (the resume cursor).
    pub state_dir: PathBuf,
    /// Minimum file age, in hours, before a file becomes a candidate.
    pub age_threshold_hours: f64,
    /// Minimum cumulative selection size, in GiB, required to proceed.
    pub min_size_gib: f64,
    /// Maximum cumulative selection size, in GiB, per archive.
    pub max_size_gib: f64,
    /// Password for the archive encryption step.
    pub archive_password: String,
    /// Host serving containers over HTTP for deal retrieval.
    pub web_server_host: String,
    /// Funding identity passed to every submission command.
    pub wallet_address: String,
    /// The six provider identifiers both sharding sets draw from.
    pub providers: [String; PROVIDER_COUNT],
    /// Path to the content-addressing tool binary.
    pub car_binary: PathBuf,
    /// Courtesy pause between successive deal-record command writes.
    pub deal_write_pause: Duration,
    /// Artifact suffixes removed when a sequence group is retired.
    pub retention_suffixes: Vec<String>,
}

impl Settings {
    /// Age threshold as a signed duration usable in mtime arithmetic.
    #[must_use]
    pub fn age_threshold(&self) -> ChronoDuration {
        let millis = self.age_threshold_hours * 3_600_000.0;
        ChronoDuration::milliseconds(clamp_to_i64(millis))
    }

    /// Minimum cumulative selection size in bytes.
    #[must_use]
    pub fn min_bytes(&self) -> u64 {
        gib_to_bytes(self.min_size_gib)
    }

    /// Maximum cumulative selection size in bytes.
    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        gib_to_bytes(self.max_size_gib)
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
const fn gib_to_bytes(gib: f64) -> u64 {
    let bytes = gib * BYTES_PER_GIB;
    if bytes <= 0.0 {
        0
    } else if bytes >= u64::MAX as f64 {
        u64::MAX
    } else {
        bytes as u64
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
const fn clamp_to_i64(value: f64) -> i64 {
    if value >= i64::MAX as f64 {
        i64::MAX
    } else if value <= i64::MIN as f64 {
        i64::MIN
    } else {
        value as i64
    }
}
