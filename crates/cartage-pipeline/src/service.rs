//! The orchestrating state machine for one pipeline run.
//!
//! # Design
//! - `run` is infallible: every stage failure is logged once at the stage
//!   boundary and mapped to a terminal [`RunOutcome`], never a process exit.
//! - Mutation ordering backs the resume guarantee: the cursor is persisted
//!   only after the deal record is renamed, so a crash at any earlier point
//!   replays the same batch on the next run.
//! - External tools are reached only through the toolchain traits, which keeps
//!   the whole machine testable with in-process fakes.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cartage_config::Settings;
use cartage_toolchain::{Commitment, CommitmentProver, Containerizer, DealSubmitter};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::archive::build_tar;
use crate::crypt::{DEFAULT_CHUNK_BYTES, encrypt_file};
use crate::cursor::CursorStore;
use crate::deal::{render_command, select_providers};
use crate::error::{PipelineError, PipelineResult};
use crate::model::{ArchiveSlot, RunOutcome, Selection, StageKind, bytes_to_gib};
use crate::scanner::Scanner;
use crate::sequence::{next_number, retire, retirement_target};

type StageFailure = (StageKind, PipelineError);

fn staged<T>(stage: StageKind, result: PipelineResult<T>) -> Result<T, StageFailure> {
    result.map_err(|error| (stage, error))
}

/// Drives one scan-package-submit cycle end to end.
pub struct PipelineService {
    settings: Settings,
    cursor_store: CursorStore,
    containerizer: Arc<dyn Containerizer>,
    prover: Arc<dyn CommitmentProver>,
    submitter: Arc<dyn DealSubmitter>,
}

impl PipelineService {
    /// Assemble the service from settings and toolchain implementations.
    #[must_use]
    pub fn new(
        settings: Settings,
        containerizer: Arc<dyn Containerizer>,
        prover: Arc<dyn CommitmentProver>,
        submitter: Arc<dyn DealSubmitter>,
    ) -> Self {
        let cursor_store = CursorStore::new(&settings.state_dir);
        Self {
            settings,
            cursor_store,
            containerizer,
            prover,
            submitter,
        }
    }

    /// Execute one run of the state machine and report its terminal outcome.
    pub async fn run(&self) -> RunOutcome {
        self.execute().await.unwrap_or_else(|(stage, error)| {
            error!(stage = stage.as_str(), error = ?error, "pipeline stage failed");
            RunOutcome::Aborted { stage }
        })
    }

    async fn execute(&self) -> Result<RunOutcome, StageFailure> {
        let selection = self.scan()?;
        if selection.batch.is_empty() || selection.total_bytes < self.settings.min_bytes() {
            warn!(
                file_count = selection.batch.len(),
                total_gib = bytes_to_gib(selection.total_bytes),
                min_gib = self.settings.min_size_gib,
                "selection below minimum, nothing to package"
            );
            return Ok(RunOutcome::SelectionInsufficient);
        }

        let slot = self.allocate_slot()?;
        let container = self.package(&selection, &slot).await?;
        let (payload_cid, commitment) = self.commit(&container).await?;
        let deal_path = self
            .write_deal_record(&slot, &commitment, &payload_cid)
            .await?;

        if !self.verify(&container, &commitment).await? {
            staged(
                StageKind::Verify,
                remove_artifact("rollback.remove_record", &deal_path),
            )?;
            staged(
                StageKind::Verify,
                remove_artifact("rollback.remove_container", &container),
            )?;
            return Ok(RunOutcome::RolledBack);
        }

        if let Some(halted) = self.submit_all(&deal_path).await? {
            return Ok(halted);
        }

        self.finalize(&slot, &deal_path, &selection)?;
        Ok(RunOutcome::Finalized)
    }

    /// Load the cursor and scan for the next batch.
    fn scan(&self) -> Result<Selection, StageFailure> {
        let cursor = staged(StageKind::Scan, self.cursor_store.load())?;
        let scanner = Scanner::new(
            self.settings.source_dir.clone(),
            self.settings.age_threshold(),
            self.settings.min_bytes(),
            self.settings.max_bytes(),
        );
        staged(StageKind::Scan, scanner.scan(cursor.as_ref(), Utc::now()))
    }

    /// Allocate the archive slot for this run and retire superseded artifacts.
    fn allocate_slot(&self) -> Result<ArchiveSlot, StageFailure> {
        let target = &self.settings.target_dir;
        staged(
            StageKind::Batch,
            fs::create_dir_all(target)
                .map_err(|err| PipelineError::io("batch.prepare_target", target, err)),
        )?;
        let prefix = format!(
            "{}{}-",
            Utc::now().format("%Y%m%d"),
            self.settings.server_id
        );
        let number = staged(StageKind::Batch, next_number(target, &prefix))?;
        if let Some(retired) = retirement_target(number) {
            let removed = retire(target, &prefix, retired, &self.settings.retention_suffixes);
            info!(number, retired, removed, "retired superseded sequence group");
        }
        let slot = ArchiveSlot::new(&prefix, number);
        info!(stem = slot.stem(), "allocated archive slot");
        Ok(slot)
    }

    /// Package the batch: tar, encrypt, containerize, dropping intermediates.
    ///
    /// Intermediates are only removed after their successor exists, so a
    /// failure always leaves the most recent artifact behind for inspection.
    async fn package(
        &self,
        selection: &Selection,
        slot: &ArchiveSlot,
    ) -> Result<PathBuf, StageFailure> {
        let target = &self.settings.target_dir;
        let tar_path = target.join(slot.tar_name());
        staged(StageKind::Archive, build_tar(&selection.batch, &tar_path))?;

        let encrypted = target.join(slot.encrypted_name());
        staged(
            StageKind::Archive,
            encrypt_file(
                &tar_path,
                &encrypted,
                &self.settings.archive_password,
                DEFAULT_CHUNK_BYTES,
            ),
        )?;
        staged(
            StageKind::Archive,
            remove_artifact("package.remove_tar", &tar_path),
        )?;

        let container = target.join(slot.container_name());
        staged(
            StageKind::Containerize,
            self.containerizer
                .create(&container, &encrypted)
                .await
                .map_err(|err| PipelineError::tool("containerize.create", err)),
        )?;
        staged(
            StageKind::Containerize,
            remove_artifact("package.remove_encrypted", &encrypted),
        )?;
        info!(container = %container.display(), "container created");
        Ok(container)
    }

    /// Resolve the payload identifier and the initial commitment.
    async fn commit(&self, container: &Path) -> Result<(String, Commitment), StageFailure> {
        let payload_cid = staged(
            StageKind::Commit,
            self.containerizer
                .root_identifier(container)
                .await
                .map_err(|err| PipelineError::tool("commit.root_identifier", err)),
        )?;
        let commitment = staged(
            StageKind::Commit,
            self.prover
                .commitment(container)
                .await
                .map_err(|err| PipelineError::tool("commit.commitment", err)),
        )?;
        info!(
            payload_cid = %payload_cid,
            commp = %commitment.commp_cid,
            piece_size = %commitment.piece_size,
            "commitment computed"
        );
        Ok((payload_cid, commitment))
    }

    /// Write one submission command per selected provider to the deal record.
    async fn write_deal_record(
        &self,
        slot: &ArchiveSlot,
        commitment: &Commitment,
        payload_cid: &str,
    ) -> Result<PathBuf, StageFailure> {
        let deal_path = self.settings.target_dir.join(slot.deal_name());
        let mut record = staged(
            StageKind::WriteDeal,
            File::create(&deal_path)
                .map_err(|err| PipelineError::io("write_deal.create", &deal_path, err)),
        )?;
        let container_name = slot.container_name();
        for provider in select_providers(slot.shard(), &self.settings.providers) {
            tokio::time::sleep(self.settings.deal_write_pause).await;
            let command = render_command(
                provider,
                &self.settings.web_server_host,
                &container_name,
                commitment,
                payload_cid,
                &self.settings.wallet_address,
            );
            staged(
                StageKind::WriteDeal,
                writeln!(record, "{command}")
                    .map_err(|err| PipelineError::io("write_deal.append", &deal_path, err)),
            )?;
            info!(provider, "recorded deal command");
        }
        Ok(deal_path)
    }

    /// Recompute the piece commitment and compare its CID against the
    /// recorded one. Only the CID gates the run; the size fields are tool
    /// reporting, not part of the integrity contract.
    async fn verify(
        &self,
        container: &Path,
        recorded: &Commitment,
    ) -> Result<bool, StageFailure> {
        let fresh = staged(
            StageKind::Verify,
            self.prover
                .commitment(container)
                .await
                .map_err(|err| PipelineError::tool("verify.commitment", err)),
        )?;
        if fresh.commp_cid == recorded.commp_cid {
            return Ok(true);
        }
        error!(
            container = %container.display(),
            recorded = %recorded.commp_cid,
            fresh = %fresh.commp_cid,
            "commitment verification mismatch, rolling back"
        );
        Ok(false)
    }

    /// Run every recorded command in order; the first failure halts the run.
    async fn submit_all(&self, deal_path: &Path) -> Result<Option<RunOutcome>, StageFailure> {
        let raw = staged(
            StageKind::Submit,
            fs::read_to_string(deal_path)
                .map_err(|err| PipelineError::io("submit.read_record", deal_path, err)),
        )?;
        let commands: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        for (index, command) in commands.iter().enumerate() {
            if let Err(err) = self.submitter.submit(command).await {
                error!(
                    submitted = index,
                    error = ?err,
                    "submission command failed, keeping record for retry"
                );
                return Ok(Some(RunOutcome::SubmissionHalted { submitted: index }));
            }
            info!(index, command_count = commands.len(), "submission command completed");
        }
        Ok(None)
    }

    /// Rename the deal record and persist the advanced cursor.
    fn finalize(
        &self,
        slot: &ArchiveSlot,
        deal_path: &Path,
        selection: &Selection,
    ) -> Result<(), StageFailure> {
        let done_path = self.settings.target_dir.join(slot.done_name());
        staged(
            StageKind::Finalize,
            fs::rename(deal_path, &done_path)
                .map_err(|err| PipelineError::io("finalize.rename", deal_path, err)),
        )?;
        let cursor = selection.next_cursor.as_ref().ok_or((
            StageKind::Finalize,
            PipelineError::MissingState {
                field: "next_cursor",
            },
        ))?;
        staged(StageKind::Finalize, self.cursor_store.save(cursor))?;
        info!(
            record = %done_path.display(),
            cursor_user = %cursor.user_id,
            "run finalized"
        );
        Ok(())
    }
}

fn remove_artifact(operation: &'static str, path: &Path) -> PipelineResult<()> {
    fs::remove_file(path).map_err(|err| PipelineError::io(operation, path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use cartage_toolchain::{ToolError, ToolResult};
    use sha2::{Digest, Sha256};
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const GIB: f64 = 1_073_741_824.0;

    fn settings(root: &Path) -> Settings {
        Settings {
            server_id: "sv01".to_string(),
            source_dir: root.join("users"),
            target_dir: root.join("archives"),
            state_dir: root.join("state"),
            age_threshold_hours: -1.0,
            min_size_gib: 300.0 / GIB,
            max_size_gib: 4_096.0 / GIB,
            archive_password: "secret".to_string(),
            web_server_host: "198.51.100.7".to_string(),
            wallet_address: "f1wallet".to_string(),
            providers: std::array::from_fn(|index| format!("f0100{}", index + 1)),
            car_binary: PathBuf::from("car"),
            deal_write_pause: Duration::ZERO,
            retention_suffixes: vec![".tar".to_string(), ".done".to_string()],
        }
    }

    fn seed_source(root: &Path) -> Result<()> {
        let files = root.join("users/alice/files");
        fs::create_dir_all(&files)?;
        fs::write(files.join("a1.bin"), vec![1u8; 200])?;
        fs::write(files.join("a2.bin"), vec![2u8; 200])?;
        fs::write(files.join("a3.bin"), vec![3u8; 200])?;
        Ok(())
    }

    fn find_by_suffix(dir: &Path, suffix: &str) -> Vec<String> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(suffix))
            .collect();
        names.sort();
        names
    }

    struct CopyContainerizer;

    #[async_trait]
    impl Containerizer for CopyContainerizer {
        async fn create(&self, container: &Path, source: &Path) -> ToolResult<()> {
            fs::copy(source, container).map(|_| ()).map_err(|err| {
                ToolError::Spawn {
                    program: "car".to_string(),
                    source: err,
                }
            })
        }

        async fn root_identifier(&self, _container: &Path) -> ToolResult<String> {
            Ok("bafyroot".to_string())
        }
    }

    struct FailingContainerizer;

    #[async_trait]
    impl Containerizer for FailingContainerizer {
        async fn create(&self, _container: &Path, _source: &Path) -> ToolResult<()> {
            Err(ToolError::Spawn {
                program: "car".to_string(),
                source: io::Error::other("boom"),
            })
        }

        async fn root_identifier(&self, _container: &Path) -> ToolResult<String> {
            Ok("bafyroot".to_string())
        }
    }

    /// Content-sensitive prover: the commitment is a digest of the file.
    struct HashingProver;

    #[async_trait]
    impl CommitmentProver for HashingProver {
        async fn commitment(&self, container: &Path) -> ToolResult<Commitment> {
            let bytes = fs::read(container).map_err(|err| ToolError::Spawn {
                program: "boostx".to_string(),
                source: err,
            })?;
            let digest = Sha256::digest(&bytes);
            let commp_cid: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
            Ok(Commitment {
                commp_cid,
                piece_size: "1024".to_string(),
                container_size: bytes.len().to_string(),
            })
        }
    }

    /// Prover whose second answer never matches its first.
    #[derive(Default)]
    struct FlippingProver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommitmentProver for FlippingProver {
        async fn commitment(&self, _container: &Path) -> ToolResult<Commitment> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Commitment {
                commp_cid: format!("commp-{call}"),
                piece_size: "1024".to_string(),
                container_size: "512".to_string(),
            })
        }
    }

    /// Prover with a stable commitment CID but drifting size reporting.
    #[derive(Default)]
    struct DriftingSizeProver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommitmentProver for DriftingSizeProver {
        async fn commitment(&self, _container: &Path) -> ToolResult<Commitment> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Commitment {
                commp_cid: "commp-stable".to_string(),
                piece_size: "1024".to_string(),
                container_size: (512 + call).to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSubmitter {
        commands: Mutex<Vec<String>>,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl DealSubmitter for RecordingSubmitter {
        async fn submit(&self, command: &str) -> ToolResult<()> {
            let mut commands = self.commands.lock().unwrap();
            if self.fail_at == Some(commands.len()) {
                return Err(ToolError::NonZeroExit {
                    program: "sh".to_string(),
                    code: Some(1),
                    stderr: None,
                });
            }
            commands.push(command.to_string());
            Ok(())
        }
    }

    fn service_with(
        settings: Settings,
        containerizer: Arc<dyn Containerizer>,
        prover: Arc<dyn CommitmentProver>,
        submitter: Arc<dyn DealSubmitter>,
    ) -> PipelineService {
        PipelineService::new(settings, containerizer, prover, submitter)
    }

    #[tokio::test]
    async fn finalized_run_leaves_container_record_and_cursor() -> Result<()> {
        let temp = TempDir::new()?;
        seed_source(temp.path())?;
        let settings = settings(temp.path());
        let target = settings.target_dir.clone();
        let state_dir = settings.state_dir.clone();
        let submitter = Arc::new(RecordingSubmitter::default());
        let service = service_with(
            settings,
            Arc::new(CopyContainerizer),
            Arc::new(HashingProver),
            submitter.clone(),
        );

        let outcome = service.run().await;
        assert_eq!(outcome, RunOutcome::Finalized);

        assert_eq!(find_by_suffix(&target, ".done").len(), 1);
        assert_eq!(find_by_suffix(&target, ".tar.aes.car").len(), 1);
        assert!(find_by_suffix(&target, ".tar").is_empty());
        assert!(find_by_suffix(&target, ".tar.aes").is_empty());
        assert!(find_by_suffix(&target, ".deal").is_empty());

        // Sequence number 1 is odd, so the edge replica set is used.
        let commands = submitter.commands.lock().unwrap();
        assert_eq!(commands.len(), 4);
        assert!(commands[0].contains("--provider=f01001"));
        assert!(commands[1].contains("--provider=f01002"));
        assert!(commands[2].contains("--provider=f01005"));
        assert!(commands[3].contains("--provider=f01006"));
        assert!(commands[0].contains("--payload-cid=bafyroot"));
        assert!(commands[0].contains("--duration=1555200"));

        let cursor = CursorStore::new(&state_dir).load()?.unwrap();
        assert_eq!(cursor.user_id, "alice");
        assert!(cursor.file_path.ends_with("a3.bin"));
        Ok(())
    }

    #[tokio::test]
    async fn insufficient_selection_mutates_nothing() -> Result<()> {
        let temp = TempDir::new()?;
        seed_source(temp.path())?;
        let mut settings = settings(temp.path());
        settings.min_size_gib = 1.0;
        let target = settings.target_dir.clone();
        let state_dir = settings.state_dir.clone();
        let submitter = Arc::new(RecordingSubmitter::default());
        let service = service_with(
            settings,
            Arc::new(CopyContainerizer),
            Arc::new(HashingProver),
            submitter.clone(),
        );

        let outcome = service.run().await;
        assert_eq!(outcome, RunOutcome::SelectionInsufficient);
        assert!(!target.exists());
        assert!(CursorStore::new(&state_dir).load()?.is_none());
        assert!(submitter.commands.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn verification_mismatch_rolls_back_artifacts() -> Result<()> {
        let temp = TempDir::new()?;
        seed_source(temp.path())?;
        let settings = settings(temp.path());
        let target = settings.target_dir.clone();
        let state_dir = settings.state_dir.clone();
        let submitter = Arc::new(RecordingSubmitter::default());
        let service = service_with(
            settings,
            Arc::new(CopyContainerizer),
            Arc::new(FlippingProver::default()),
            submitter.clone(),
        );

        let outcome = service.run().await;
        assert_eq!(outcome, RunOutcome::RolledBack);
        assert!(find_by_suffix(&target, ".deal").is_empty());
        assert!(find_by_suffix(&target, ".tar.aes.car").is_empty());
        assert!(submitter.commands.lock().unwrap().is_empty());
        assert!(CursorStore::new(&state_dir).load()?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn verification_gates_on_the_commitment_cid_only() -> Result<()> {
        let temp = TempDir::new()?;
        seed_source(temp.path())?;
        let settings = settings(temp.path());
        let target = settings.target_dir.clone();
        let submitter = Arc::new(RecordingSubmitter::default());
        let service = service_with(
            settings,
            Arc::new(CopyContainerizer),
            Arc::new(DriftingSizeProver::default()),
            submitter.clone(),
        );

        let outcome = service.run().await;
        assert_eq!(outcome, RunOutcome::Finalized);
        assert_eq!(find_by_suffix(&target, ".done").len(), 1);
        assert_eq!(submitter.commands.lock().unwrap().len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn submission_failure_halts_and_keeps_the_record() -> Result<()> {
        let temp = TempDir::new()?;
        seed_source(temp.path())?;
        let settings = settings(temp.path());
        let target = settings.target_dir.clone();
        let state_dir = settings.state_dir.clone();
        let submitter = Arc::new(RecordingSubmitter {
            commands: Mutex::new(Vec::new()),
            fail_at: Some(2),
        });
        let service = service_with(
            settings,
            Arc::new(CopyContainerizer),
            Arc::new(HashingProver),
            submitter.clone(),
        );

        let outcome = service.run().await;
        assert_eq!(outcome, RunOutcome::SubmissionHalted { submitted: 2 });
        assert_eq!(find_by_suffix(&target, ".deal").len(), 1);
        assert!(find_by_suffix(&target, ".done").is_empty());
        assert_eq!(submitter.commands.lock().unwrap().len(), 2);
        assert!(CursorStore::new(&state_dir).load()?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn container_tool_failure_aborts_at_its_stage() -> Result<()> {
        let temp = TempDir::new()?;
        seed_source(temp.path())?;
        let settings = settings(temp.path());
        let target = settings.target_dir.clone();
        let service = service_with(
            settings,
            Arc::new(FailingContainerizer),
            Arc::new(HashingProver),
            Arc::new(RecordingSubmitter::default()),
        );

        let outcome = service.run().await;
        assert_eq!(
            outcome,
            RunOutcome::Aborted {
                stage: StageKind::Containerize
            }
        );
        // The encrypted archive survives for inspection, the raw tar does not.
        assert_eq!(find_by_suffix(&target, ".tar.aes").len(), 1);
        assert!(find_by_suffix(&target, ".tar").is_empty());
        Ok(())
    }
}
