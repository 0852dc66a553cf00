/// pg_restore invocations
///
/// The dump of everything but the user tables is restored first since it
/// recreates the schemas, sequences and shared rows the user tables rely on.
/// Batches are disjoint and independent of each other, so their order does
/// not matter; they are restored in batch number order for readable logs.
///
/// Restores are not transactional across invocations. If batch k fails,
/// batches before it stay restored in the target database.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::connection::ConnectionParams;
use crate::core::error::{BackupError, Result};
use crate::core::runner::{CommandRunner, ToolCommand};
use crate::utils::{parse_batch_folder_name, NO_USER_TABLES_BACKUP_SUB_FOLDER};

pub struct RestoreDriver<'a, R> {
    params: &'a ConnectionParams,
    program: &'a str,
    runner: &'a R,
}

impl<'a, R: CommandRunner> RestoreDriver<'a, R> {
    pub fn new(params: &'a ConnectionParams, program: &'a str, runner: &'a R) -> Self {
        Self {
            params,
            program,
            runner,
        }
    }

    fn pg_restore(&self, dump_dir: String, extra_args: &[String]) -> ToolCommand {
        ToolCommand::new(self.program)
            .args(self.params.tool_args())
            .arg(dump_dir)
            .args(extra_args.iter().cloned())
    }

    pub fn restore_everything_except_user_tables(&self, archive_root: &Path, extra_args: &[String]) -> Result<()> {
        let shared = archive_root.join(NO_USER_TABLES_BACKUP_SUB_FOLDER);
        if !shared.is_dir() {
            return Err(BackupError::MissingSharedDump { path: shared });
        }

        let command = self.pg_restore(
            format!("{}/{}/", archive_root.display(), NO_USER_TABLES_BACKUP_SUB_FOLDER),
            extra_args,
        );
        self.runner.run(&command)
    }

    /// Restore every batch folder, stopping at the first failure
    pub fn restore_user_table_batches(&self, archive_root: &Path, extra_args: &[String]) -> Result<usize> {
        let batch_dirs = list_batch_dirs(archive_root)?;

        for (restored, dir) in batch_dirs.iter().enumerate() {
            tracing::debug!(batch = %dir.display(), restored, "restoring batch");
            let command = self.pg_restore(dir.display().to_string(), extra_args);
            self.runner.run(&command)?;
        }

        Ok(batch_dirs.len())
    }
}

/// Every sub-directory other than the shared dump, in batch order
pub fn list_batch_dirs(archive_root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(archive_root)? {
        let entry = entry?;
        if entry.file_name() == NO_USER_TABLES_BACKUP_SUB_FOLDER || !entry.file_type()?.is_dir() {
            continue;
        }
        dirs.push(entry.path());
    }

    dirs.sort_by(|a, b| compare_batch_names(&folder_name(a), &folder_name(b)));
    Ok(dirs)
}

fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Batch folders by number, any other folder after them by name
pub fn compare_batch_names(a: &str, b: &str) -> Ordering {
    match (parse_batch_folder_name(a), parse_batch_folder_name(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
