//! Archive sequence allocation and retention of superseded artifacts.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};

/// Allocate the next archive number for `prefix` inside `dir`.
///
/// Existing archives are recognized by a `.tar` segment in the name; the
/// highest numeric segment found plus one wins. An empty or missing directory
/// starts the sequence at one.
///
/// # Errors
///
/// Returns an error if the target directory cannot be listed.
pub fn next_number(dir: &Path, prefix: &str) -> PipelineResult<u32> {
    if !dir.is_dir() {
        return Ok(1);
    }
    let entries =
        fs::read_dir(dir).map_err(|err| PipelineError::io("sequence.list", dir, err))?;
    let mut highest = 0u32;
    for entry in entries {
        let entry = entry.map_err(|err| PipelineError::io("sequence.list", dir, err))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        if !rest.contains(".tar") {
            continue;
        }
        let Some((digits, _)) = rest.split_once('.') else {
            continue;
        };
        if let Ok(number) = digits.parse::<u32>() {
            highest = highest.max(number);
        }
    }
    Ok(highest + 1)
}

/// Sequence number whose artifacts are superseded when `number` is allocated.
///
/// One in every ten allocations retires an old slot: allocating number `N`
/// with `N % 10 == 1` retires `(N - 10) / 10`. Numbers at or below ten have
/// nothing old enough to retire.
#[must_use]
pub const fn retirement_target(number: u32) -> Option<u32> {
    if number % 10 == 1 && number > 10 {
        Some((number - 10) / 10)
    } else {
        None
    }
}

/// Delete every artifact of the retired `target` slot under `dir`.
///
/// Matches names starting with the 5-digit padded target stem and ending with
/// one of the configured suffixes. Deletion failures are logged and skipped so
/// retention never blocks the run; the count of removed files is returned.
#[must_use]
pub fn retire(dir: &Path, prefix: &str, target: u32, suffixes: &[String]) -> usize {
    let stem = format!("{prefix}{target:05}");
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(&stem) {
            continue;
        }
        if !suffixes.iter().any(|suffix| name.ends_with(suffix)) {
            continue;
        }
        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "retired superseded artifact");
                removed += 1;
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "failed to retire artifact");
            }
        }
    }
    removed
}
