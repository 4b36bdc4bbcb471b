//! Tar packaging of a selected batch.

use std::fs::File;
use std::path::Path;

use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::model::CandidateFile;

/// Package the batch into a tar archive at `tar_path`.
///
/// Entries carry the candidate's base name only, so extraction yields a flat
/// directory regardless of where the sources lived.
///
/// # Errors
///
/// Returns an error if the archive cannot be created or an entry cannot be
/// appended; a partial archive may remain for inspection.
pub fn build_tar(batch: &[CandidateFile], tar_path: &Path) -> PipelineResult<()> {
    let file =
        File::create(tar_path).map_err(|err| PipelineError::io("archive.create", tar_path, err))?;
    let mut builder = tar::Builder::new(file);
    for candidate in batch {
        builder
            .append_path_with_name(&candidate.path, &candidate.name)
            .map_err(|err| PipelineError::io("archive.append", &candidate.path, err))?;
    }
    builder
        .finish()
        .map_err(|err| PipelineError::io("archive.finish", tar_path, err))?;
    info!(
        path = %tar_path.display(),
        entry_count = batch.len(),
        "packaged batch into archive"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::Utc;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn candidate(path: PathBuf, name: &str, size: u64) -> CandidateFile {
        CandidateFile {
            path,
            name: name.to_string(),
            size_bytes: size,
            mtime: Utc::now(),
            is_aged: true,
        }
    }

    #[test]
    fn archive_entries_use_base_names() -> Result<()> {
        let temp = TempDir::new()?;
        let nested = temp.path().join("users/alice/files");
        fs::create_dir_all(&nested)?;
        let first = nested.join("a.bin");
        let second = nested.join("b.bin");
        fs::write(&first, b"alpha")?;
        fs::write(&second, b"beta")?;

        let tar_path = temp.path().join("out.tar");
        build_tar(
            &[candidate(first, "a.bin", 5), candidate(second, "b.bin", 4)],
            &tar_path,
        )?;

        let mut archive = tar::Archive::new(File::open(&tar_path)?);
        let names: Vec<String> = archive
            .entries()?
            .map(|entry| {
                let entry = entry?;
                Ok(entry.path()?.to_string_lossy().into_owned())
            })
            .collect::<Result<_>>()?;
        assert_eq!(names, vec!["a.bin", "b.bin"]);
        Ok(())
    }

    #[test]
    fn empty_batch_still_produces_a_valid_archive() -> Result<()> {
        let temp = TempDir::new()?;
        let tar_path = temp.path().join("empty.tar");
        build_tar(&[], &tar_path)?;

        let mut archive = tar::Archive::new(File::open(&tar_path)?);
        assert_eq!(archive.entries()?.count(), 0);
        Ok(())
    }

    #[test]
    fn missing_source_file_is_an_error() -> Result<()> {
        let temp = TempDir::new()?;
        let tar_path = temp.path().join("out.tar");
        let err = build_tar(
            &[candidate(temp.path().join("gone.bin"), "gone.bin", 1)],
            &tar_path,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        Ok(())
    }
}
