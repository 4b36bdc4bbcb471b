//! Eligibility scanner: resumable, size/age-bounded candidate selection.
//!
//! Traversal order is a deliberate contract: user directories are sorted
//! case-insensitively ascending, and each user's file tree is walked with
//! entries sorted by file name at every level. Resume correctness depends on
//! this order staying deterministic between runs over an unchanged tree.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{PipelineError, PipelineResult};
use crate::model::{CandidateFile, Cursor, Selection, bytes_to_gib};

/// Name of the nested file-bearing subdirectory inside each user directory.
const FILES_SUBDIR: &str = "files";

/// Walks user directories and builds the selection batch for one run.
#[derive(Debug, Clone)]
pub struct Scanner {
    source_root: PathBuf,
    age_threshold: ChronoDuration,
    min_bytes: u64,
    max_bytes: u64,
}

impl Scanner {
    /// Scanner over `source_root` with the given age and size bounds.
    #[must_use]
    pub const fn new(
        source_root: PathBuf,
        age_threshold: ChronoDuration,
        min_bytes: u64,
        max_bytes: u64,
    ) -> Self {
        Self {
            source_root,
            age_threshold,
            min_bytes,
            max_bytes,
        }
    }

    /// Run one scan, resuming from `cursor` when present.
    ///
    /// With no cursor, the scan is seeded at the first user's first file; the
    /// seed file marks the starting edge and is never itself selected. Files
    /// are only candidates once the cursor file has been observed in traversal
    /// order, and only while the cumulative total stays under the maximum.
    /// Scanning stops early once the total reaches the minimum.
    ///
    /// # Errors
    ///
    /// Returns an error if directory listing or metadata reads fail. Empty
    /// roots and empty batches are normal results, not errors.
    pub fn scan(&self, cursor: Option<&Cursor>, now: DateTime<Utc>) -> PipelineResult<Selection> {
        let users = self.sorted_users()?;
        info!(
            source = %self.source_root.display(),
            user_count = users.len(),
            users = ?users,
            "scanning user directories"
        );

        let (cursor, start, mut encountered) = match cursor {
            Some(cursor) => match Self::resume_position(&users, cursor) {
                Some(position) => (cursor.clone(), position.index, position.cursor_vanished),
                None => return Ok(Selection::default()),
            },
            None => match self.seed_cursor(&users)? {
                Some(seed) => {
                    info!(user = %seed.user_id, file = %seed.file_path.display(), "seeded scan cursor");
                    (seed, 0, false)
                }
                None => return Ok(Selection::default()),
            },
        };

        let threshold = now - self.age_threshold;
        let mut selection = Selection::default();

        'users: for user in &users[start..] {
            if selection.total_bytes >= self.min_bytes {
                break;
            }
            let files_dir = self.source_root.join(user).join(FILES_SUBDIR);
            if !files_dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&files_dir).sort_by_file_name() {
                let entry =
                    entry.map_err(|err| PipelineError::walkdir("scan.walk", &files_dir, err))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if selection.total_bytes >= self.min_bytes {
                    break 'users;
                }

                if encountered {
                    let metadata = entry
                        .metadata()
                        .map_err(|err| PipelineError::walkdir("scan.metadata", entry.path(), err))?;
                    let mtime: DateTime<Utc> = metadata
                        .modified()
                        .map_err(|err| PipelineError::io("scan.mtime", entry.path(), err))?
                        .into();
                    let candidate = CandidateFile {
                        path: entry.path().to_path_buf(),
                        name: entry.file_name().to_string_lossy().into_owned(),
                        size_bytes: metadata.len(),
                        mtime,
                        is_aged: mtime < threshold,
                    };
                    if candidate.is_aged {
                        if selection.total_bytes + candidate.size_bytes <= self.max_bytes {
                            selection.total_bytes += candidate.size_bytes;
                            selection.next_cursor = Some(Cursor {
                                user_id: user.clone(),
                                file_path: candidate.path.clone(),
                            });
                            info!(
                                user = %user,
                                file = %candidate.path.display(),
                                size_bytes = candidate.size_bytes,
                                total_bytes = selection.total_bytes,
                                "appending file to batch"
                            );
                            selection.batch.push(candidate);
                        } else {
                            info!(
                                file = %candidate.path.display(),
                                size_bytes = candidate.size_bytes,
                                "skipping file, maximum batch size would be exceeded"
                            );
                        }
                    }
                }

                if entry.path() == cursor.file_path {
                    encountered = true;
                }
            }
        }

        info!(
            file_count = selection.batch.len(),
            total_bytes = selection.total_bytes,
            total_gib = bytes_to_gib(selection.total_bytes),
            "scan complete"
        );
        Ok(selection)
    }

    /// List user directories sorted case-insensitively ascending.
    fn sorted_users(&self) -> PipelineResult<Vec<String>> {
        if !self.source_root.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.source_root)
            .map_err(|err| PipelineError::io("scan.list_users", &self.source_root, err))?;
        let mut users = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|err| PipelineError::io("scan.list_users", &self.source_root, err))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(name = ?name, "skipping user directory with non-UTF-8 name");
                continue;
            };
            users.push(name.to_string());
        }
        users.sort_by_key(|name| name.to_lowercase());
        Ok(users)
    }

    /// Seed a cursor at the first user's first file in traversal order.
    ///
    /// Returns `None` when the root has no users or the first user has no
    /// files; a seedless scan selects nothing this run.
    fn seed_cursor(&self, users: &[String]) -> PipelineResult<Option<Cursor>> {
        let Some(user) = users.first() else {
            return Ok(None);
        };
        let files_dir = self.source_root.join(user).join(FILES_SUBDIR);
        if !files_dir.is_dir() {
            return Ok(None);
        }
        for entry in WalkDir::new(&files_dir).sort_by_file_name() {
            let entry = entry.map_err(|err| PipelineError::walkdir("scan.seed", &files_dir, err))?;
            if entry.file_type().is_file() {
                return Ok(Some(Cursor {
                    user_id: user.clone(),
                    file_path: entry.path().to_path_buf(),
                }));
            }
        }
        Ok(None)
    }

    /// Locate the user the cursor names, or the first user sorting after it.
    ///
    /// When the recorded user has vanished, its cursor file can never be
    /// observed again, so the vanished file counts as already encountered;
    /// otherwise the pipeline would stall forever on a deleted account.
    fn resume_position(users: &[String], cursor: &Cursor) -> Option<ResumePosition> {
        let key = cursor.user_id.to_lowercase();
        if let Some(index) = users.iter().position(|user| *user == cursor.user_id) {
            return Some(ResumePosition {
                index,
                cursor_vanished: false,
            });
        }
        users
            .iter()
            .position(|user| user.to_lowercase() >= key)
            .map(|index| ResumePosition {
                index,
                cursor_vanished: true,
            })
    }
}

struct ResumePosition {
    index: usize,
    cursor_vanished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Threshold that treats every freshly written file as aged.
    fn all_aged() -> ChronoDuration {
        ChronoDuration::hours(-1)
    }

    fn write_user_file(root: &Path, user: &str, name: &str, size: usize) -> Result<PathBuf> {
        let dir = root.join(user).join(FILES_SUBDIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        fs::write(&path, vec![0u8; size])?;
        Ok(path)
    }

    fn batch_names(selection: &Selection) -> Vec<&str> {
        selection
            .batch
            .iter()
            .map(|candidate| candidate.name.as_str())
            .collect()
    }

    #[test]
    fn seeds_at_first_file_and_selects_the_tail() -> Result<()> {
        let temp = TempDir::new()?;
        write_user_file(temp.path(), "alice", "a1.bin", 2_000)?;
        write_user_file(temp.path(), "alice", "a2.bin", 2_000)?;
        let a3 = write_user_file(temp.path(), "alice", "a3.bin", 2_000)?;
        write_user_file(temp.path(), "bob", "b1.bin", 1_000)?;

        let scanner = Scanner::new(temp.path().to_path_buf(), all_aged(), 3_000, 5_000);
        let selection = scanner.scan(None, Utc::now())?;

        assert_eq!(batch_names(&selection), vec!["a2.bin", "a3.bin"]);
        assert_eq!(selection.total_bytes, 4_000);
        let next = selection.next_cursor.unwrap();
        assert_eq!(next.user_id, "alice");
        assert_eq!(next.file_path, a3);
        Ok(())
    }

    #[test]
    fn maximum_bound_skips_without_stopping_traversal() -> Result<()> {
        let temp = TempDir::new()?;
        write_user_file(temp.path(), "alice", "a1.bin", 2_000)?;
        write_user_file(temp.path(), "alice", "a2.bin", 2_000)?;
        write_user_file(temp.path(), "alice", "a3.bin", 2_000)?;

        let scanner = Scanner::new(temp.path().to_path_buf(), all_aged(), 3_000, 3_000);
        let selection = scanner.scan(None, Utc::now())?;

        // a1 is the seed, a2 fits, a3 would exceed the maximum.
        assert_eq!(batch_names(&selection), vec!["a2.bin"]);
        assert_eq!(selection.total_bytes, 2_000);
        Ok(())
    }

    #[test]
    fn stops_early_once_minimum_is_reached() -> Result<()> {
        let temp = TempDir::new()?;
        write_user_file(temp.path(), "alice", "a1.bin", 2_000)?;
        let a2 = write_user_file(temp.path(), "alice", "a2.bin", 2_000)?;
        write_user_file(temp.path(), "alice", "a3.bin", 2_000)?;
        write_user_file(temp.path(), "bob", "b1.bin", 2_000)?;

        let scanner = Scanner::new(temp.path().to_path_buf(), all_aged(), 1_000, 10_000);
        let selection = scanner.scan(None, Utc::now())?;

        assert_eq!(batch_names(&selection), vec!["a2.bin"]);
        assert_eq!(selection.next_cursor.unwrap().file_path, a2);
        Ok(())
    }

    #[test]
    fn resume_reproduces_the_tail_of_the_original_scan() -> Result<()> {
        let temp = TempDir::new()?;
        write_user_file(temp.path(), "alice", "a1.bin", 100)?;
        write_user_file(temp.path(), "alice", "a2.bin", 100)?;
        write_user_file(temp.path(), "alice", "a3.bin", 100)?;
        write_user_file(temp.path(), "bob", "b1.bin", 100)?;
        write_user_file(temp.path(), "bob", "b2.bin", 100)?;

        let scanner = Scanner::new(temp.path().to_path_buf(), all_aged(), 10_000, 10_000);
        let full = scanner.scan(None, Utc::now())?;
        assert_eq!(
            batch_names(&full),
            vec!["a2.bin", "a3.bin", "b1.bin", "b2.bin"]
        );

        let midpoint = Cursor {
            user_id: "alice".to_string(),
            file_path: full.batch[1].path.clone(),
        };
        let resumed = scanner.scan(Some(&midpoint), Utc::now())?;
        assert_eq!(batch_names(&resumed), vec!["b1.bin", "b2.bin"]);
        Ok(())
    }

    #[test]
    fn empty_root_yields_an_empty_batch() -> Result<()> {
        let temp = TempDir::new()?;
        let scanner = Scanner::new(temp.path().to_path_buf(), all_aged(), 1_000, 5_000);
        let selection = scanner.scan(None, Utc::now())?;
        assert!(selection.batch.is_empty());
        assert!(selection.next_cursor.is_none());
        Ok(())
    }

    #[test]
    fn user_without_files_subdirectory_contributes_nothing() -> Result<()> {
        let temp = TempDir::new()?;
        write_user_file(temp.path(), "alice", "a1.bin", 100)?;
        write_user_file(temp.path(), "alice", "a2.bin", 100)?;
        fs::create_dir_all(temp.path().join("bob"))?;
        write_user_file(temp.path(), "carol", "c1.bin", 100)?;

        let scanner = Scanner::new(temp.path().to_path_buf(), all_aged(), 10_000, 10_000);
        let selection = scanner.scan(None, Utc::now())?;
        assert_eq!(batch_names(&selection), vec!["a2.bin", "c1.bin"]);
        Ok(())
    }

    #[test]
    fn fresh_files_are_not_candidates() -> Result<()> {
        let temp = TempDir::new()?;
        write_user_file(temp.path(), "alice", "a1.bin", 100)?;
        write_user_file(temp.path(), "alice", "a2.bin", 100)?;

        let scanner = Scanner::new(
            temp.path().to_path_buf(),
            ChronoDuration::hours(1),
            100,
            5_000,
        );
        let selection = scanner.scan(None, Utc::now())?;
        assert!(selection.batch.is_empty());
        Ok(())
    }

    #[test]
    fn vanished_cursor_user_resumes_at_the_next_user() -> Result<()> {
        let temp = TempDir::new()?;
        write_user_file(temp.path(), "alice", "a1.bin", 100)?;
        write_user_file(temp.path(), "carol", "c1.bin", 100)?;

        let cursor = Cursor {
            user_id: "bob".to_string(),
            file_path: temp.path().join("bob/files/gone.bin"),
        };
        let scanner = Scanner::new(temp.path().to_path_buf(), all_aged(), 10_000, 10_000);
        let selection = scanner.scan(Some(&cursor), Utc::now())?;
        assert_eq!(batch_names(&selection), vec!["c1.bin"]);
        Ok(())
    }

    #[test]
    fn cursor_after_every_user_selects_nothing() -> Result<()> {
        let temp = TempDir::new()?;
        write_user_file(temp.path(), "alice", "a1.bin", 100)?;

        let cursor = Cursor {
            user_id: "zed".to_string(),
            file_path: temp.path().join("zed/files/z.bin"),
        };
        let scanner = Scanner::new(temp.path().to_path_buf(), all_aged(), 10_000, 10_000);
        let selection = scanner.scan(Some(&cursor), Utc::now())?;
        assert!(selection.batch.is_empty());
        Ok(())
    }
}
