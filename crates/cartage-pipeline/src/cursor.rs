//! Durable single-record store for the resume cursor.
//!
//! The record is one line of two tab-separated fields (user id, file path).
//! It is read once at the start of a run and overwritten, atomically, only
//! after the run reaches its finalized state. Single-writer operation is
//! assumed; callers needing concurrent runs must serialize them externally.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};
use crate::model::Cursor;

const CURSOR_FILE_NAME: &str = "job.cur";
const TEMP_SUFFIX: &str = ".tmp";

/// File-backed store holding at most one [`Cursor`] record.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    /// Store rooted in the given state directory.
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(CURSOR_FILE_NAME),
        }
    }

    /// Path of the backing record, for diagnostics.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted cursor. Absent or empty records yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or parsed.
    pub fn load(&self) -> PipelineResult<Option<Cursor>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|err| PipelineError::io("cursor.read", &self.path, err))?;
        let Some(line) = raw.lines().next().map(str::trim).filter(|line| !line.is_empty()) else {
            return Ok(None);
        };
        let (user_id, file_path) =
            line.split_once('\t')
                .ok_or_else(|| PipelineError::CursorInvalid {
                    path: self.path.clone(),
                    reason: "expected two tab-separated fields",
                })?;
        if user_id.is_empty() || file_path.is_empty() {
            return Err(PipelineError::CursorInvalid {
                path: self.path.clone(),
                reason: "cursor fields must not be empty",
            });
        }
        Ok(Some(Cursor {
            user_id: user_id.to_string(),
            file_path: PathBuf::from(file_path),
        }))
    }

    /// Overwrite the single record atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be prepared, the cursor
    /// path is not representable, or the replace-write fails.
    pub fn save(&self, cursor: &Cursor) -> PipelineResult<()> {
        let file_path = cursor
            .file_path
            .to_str()
            .ok_or_else(|| PipelineError::PathNotUtf8 {
                field: "cursor.file_path",
                path: cursor.file_path.clone(),
            })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| PipelineError::io("cursor.prepare_dir", parent, err))?;
        }
        let temp_path = self.path.with_file_name(format!("{CURSOR_FILE_NAME}{TEMP_SUFFIX}"));
        let record = format!("{}\t{file_path}\n", cursor.user_id);
        fs::write(&temp_path, record)
            .map_err(|err| PipelineError::io("cursor.write_temp", &temp_path, err))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|err| PipelineError::io("cursor.replace", &self.path, err))?;
        Ok(())
    }
}
