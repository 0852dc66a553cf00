/// Backup and restore management
///
/// Drives a whole backup or restore run:
///
/// Backup: Start -> DumpingShared -> DumpingBatches -> Packaging -> Done
/// Restore: Start -> Extracting -> Validating -> RestoringShared -> RestoringBatches -> Done
///
/// Any error moves the run to Failed. A failed backup never leaves an archive
/// at the output path. Scratch directories live under the system temp dir (or
/// the configured scratch root) and are removed whatever the outcome, unless
/// the process itself is killed.
///
/// A failed restore does not undo the invocations that already succeeded,
/// restoring is expected to target an empty database under supervision.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::core::archive;
use crate::core::catalog::{PgCatalog, TablePatterns, UserTableSource};
use crate::core::connection::{ConnectionParams, PgTools};
use crate::core::dump::{BatchDumpStats, DumpDriver};
use crate::core::error::{BackupError, Result};
use crate::core::restore::RestoreDriver;
use crate::core::runner::{CommandRunner, SystemRunner};
use crate::utils::{default_backup_file_name, DEFAULT_BATCH_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPhase {
    Start,
    DumpingShared,
    DumpingBatches,
    Packaging,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    Start,
    Extracting,
    Validating,
    RestoringShared,
    RestoringBatches,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BackupRequest {
    /// Output archive, `backup_<db>_<timestamp>.tar.gz` in the working dir when unset
    pub archive_path: Option<PathBuf>,
    pub batch_size: usize,
    /// Passed to every pg_dump run
    pub extra_args: Vec<String>,
}

impl Default for BackupRequest {
    fn default() -> Self {
        Self {
            archive_path: None,
            batch_size: DEFAULT_BATCH_SIZE,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub archive_path: PathBuf,
    /// Passed to every pg_restore run
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    pub archive: PathBuf,
    pub user_tables: usize,
    pub batches: usize,
    pub size_bytes: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSummary {
    pub archive: PathBuf,
    pub batches_restored: usize,
    pub elapsed: Duration,
}

pub struct BackupManager<R = SystemRunner, S = PgCatalog> {
    params: ConnectionParams,
    tools: PgTools,
    patterns: TablePatterns,
    scratch_root: Option<PathBuf>,
    runner: R,
    source: S,
}

impl BackupManager {
    /// Manager running the real PostgreSQL client tools
    pub fn new(params: ConnectionParams, tools: PgTools, patterns: TablePatterns) -> Self {
        let source = PgCatalog::new(params.clone(), patterns.clone());
        Self::with_parts(params, tools, patterns, SystemRunner, source)
    }
}

impl<R: CommandRunner, S: UserTableSource> BackupManager<R, S> {
    pub fn with_parts(params: ConnectionParams, tools: PgTools, patterns: TablePatterns, runner: R, source: S) -> Self {
        Self {
            params,
            tools,
            patterns,
            scratch_root: None,
            runner,
            source,
        }
    }

    /// Create scratch directories under `root` instead of the system temp dir
    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("tenant-backup-");

        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        tracing::debug!(scratch = %dir.path().display(), "created scratch directory");
        Ok(dir)
    }

    /// Back up the whole database into a single archive
    pub async fn backup(&self, request: &BackupRequest) -> Result<BackupSummary> {
        let started = Instant::now();
        let archive_path = request
            .archive_path
            .clone()
            .unwrap_or_else(|| default_backup_file_name(&self.params.database, Utc::now()));

        tracing::info!(phase = ?BackupPhase::Start, database = %self.params, archive = %archive_path.display(), "backup");

        // Nothing at the output path has been touched yet
        if request.batch_size == 0 {
            tracing::error!(phase = ?BackupPhase::Failed, "batch size must be at least 1");
            return Err(BackupError::InvalidBatchSize);
        }

        match self.run_backup(&archive_path, request).await {
            Ok((stats, size_bytes)) => {
                tracing::info!(phase = ?BackupPhase::Done, tables = stats.tables, batches = stats.batches, "backup");
                Ok(BackupSummary {
                    archive: archive_path,
                    user_tables: stats.tables,
                    batches: stats.batches,
                    size_bytes,
                    elapsed: started.elapsed(),
                })
            }
            Err(err) => {
                tracing::error!(phase = ?BackupPhase::Failed, error = %err, "backup");
                remove_partial_archive(&archive_path);
                Err(err)
            }
        }
    }

    async fn run_backup(&self, archive_path: &Path, request: &BackupRequest) -> Result<(BatchDumpStats, u64)> {
        let scratch = self.scratch_dir()?;
        let dump = DumpDriver::new(&self.params, &self.tools.pg_dump, &self.patterns, &self.runner);

        tracing::info!(phase = ?BackupPhase::DumpingShared, "backup");
        dump.dump_everything_except_user_tables(scratch.path(), &request.extra_args)?;

        tracing::info!(phase = ?BackupPhase::DumpingBatches, batch_size = request.batch_size, "backup");
        let stats = dump
            .dump_user_tables_in_batches(&self.source, request.batch_size, scratch.path(), &request.extra_args)
            .await?;

        tracing::info!(phase = ?BackupPhase::Packaging, "backup");
        let size_bytes = archive::pack(scratch.path(), archive_path)?;

        scratch.close()?;
        Ok((stats, size_bytes))
    }

    /// Restore a database from an archive created by [`BackupManager::backup`]
    pub fn restore(&self, request: &RestoreRequest) -> Result<RestoreSummary> {
        let started = Instant::now();
        tracing::info!(phase = ?RestorePhase::Start, database = %self.params, archive = %request.archive_path.display(), "restore");

        match self.run_restore(request) {
            Ok(batches_restored) => {
                tracing::info!(phase = ?RestorePhase::Done, batches = batches_restored, "restore");
                Ok(RestoreSummary {
                    archive: request.archive_path.clone(),
                    batches_restored,
                    elapsed: started.elapsed(),
                })
            }
            Err(err) => {
                tracing::error!(phase = ?RestorePhase::Failed, error = %err, "restore");
                Err(err)
            }
        }
    }

    fn run_restore(&self, request: &RestoreRequest) -> Result<usize> {
        let scratch = self.scratch_dir()?;
        let restore = RestoreDriver::new(&self.params, &self.tools.pg_restore, &self.runner);

        tracing::info!(phase = ?RestorePhase::Extracting, "restore");
        archive::extract(&request.archive_path, scratch.path())?;

        tracing::info!(phase = ?RestorePhase::Validating, "restore");
        let root = archive::locate_root(&request.archive_path, scratch.path())?;

        tracing::info!(phase = ?RestorePhase::RestoringShared, "restore");
        restore.restore_everything_except_user_tables(&root, &request.extra_args)?;

        tracing::info!(phase = ?RestorePhase::RestoringBatches, "restore");
        let restored = restore.restore_user_table_batches(&root, &request.extra_args)?;

        scratch.close()?;
        Ok(restored)
    }
}

/// Delete whatever was written at the archive path by a failed run
fn remove_partial_archive(archive_path: &Path) {
    if !archive_path.is_file() {
        return;
    }

    match fs::remove_file(archive_path) {
        Ok(()) => tracing::warn!(archive = %archive_path.display(), "removed partial archive"),
        Err(e) => tracing::warn!(archive = %archive_path.display(), error = %e, "failed to remove partial archive"),
    }
}
