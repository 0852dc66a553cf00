/// pg_dump invocations
///
/// A backup is made of one dump of everything except the user tables,
/// followed by the user tables dumped in fixed size batches. Each invocation
/// writes its own directory format dump into a sub-folder of the output dir.

use std::path::Path;

use crate::core::catalog::{TablePatterns, TableRef, UserTableSource};
use crate::core::connection::ConnectionParams;
use crate::core::error::{BackupError, Result};
use crate::core::runner::{CommandRunner, ToolCommand};
use crate::utils::{batch_folder_name, NO_USER_TABLES_BACKUP_SUB_FOLDER};

/// A contiguous slice of the sorted user table list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<'a> {
    pub index: usize,
    pub tables: &'a [TableRef],
}

impl Batch<'_> {
    pub fn folder_name(&self) -> String {
        batch_folder_name(self.index)
    }
}

/// Split tables into contiguous batches of at most `batch_size`.
///
/// Produces ceil(len / batch_size) batches, never an empty one.
pub fn partition_into_batches(tables: &[TableRef], batch_size: usize) -> Result<Vec<Batch<'_>>> {
    if batch_size == 0 {
        return Err(BackupError::InvalidBatchSize);
    }

    Ok(tables
        .chunks(batch_size)
        .enumerate()
        .map(|(index, tables)| Batch { index, tables })
        .collect())
}

/// Counts from a batched user table dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDumpStats {
    pub tables: usize,
    pub batches: usize,
}

pub struct DumpDriver<'a, R> {
    params: &'a ConnectionParams,
    program: &'a str,
    patterns: &'a TablePatterns,
    runner: &'a R,
}

impl<'a, R: CommandRunner> DumpDriver<'a, R> {
    pub fn new(params: &'a ConnectionParams, program: &'a str, patterns: &'a TablePatterns, runner: &'a R) -> Self {
        Self {
            params,
            program,
            patterns,
            runner,
        }
    }

    fn pg_dump(&self) -> ToolCommand {
        ToolCommand::new(self.program).args(self.params.tool_args())
    }

    /// Dump schema and data of everything but the user tables
    pub fn dump_everything_except_user_tables(&self, output_dir: &Path, extra_args: &[String]) -> Result<()> {
        let command = self
            .pg_dump()
            .args(self.patterns.exclude_args())
            .arg(format!(
                "--file={}/{}/",
                output_dir.display(),
                NO_USER_TABLES_BACKUP_SUB_FOLDER
            ))
            .args(extra_args.iter().cloned());

        self.runner.run(&command)
    }

    /// Dump every user table, `batch_size` tables per pg_dump run
    pub async fn dump_user_tables_in_batches<S: UserTableSource>(
        &self,
        source: &S,
        batch_size: usize,
        output_dir: &Path,
        extra_args: &[String],
    ) -> Result<BatchDumpStats> {
        let tables = source.list_user_tables().await?;
        let batches = partition_into_batches(&tables, batch_size)?;
        tracing::info!(tables = tables.len(), batches = batches.len(), "dumping user tables");

        for batch in &batches {
            self.dump_batch(batch, output_dir, extra_args)?;
        }

        Ok(BatchDumpStats {
            tables: tables.len(),
            batches: batches.len(),
        })
    }

    fn dump_batch(&self, batch: &Batch<'_>, output_dir: &Path, extra_args: &[String]) -> Result<()> {
        tracing::debug!(batch = batch.index, tables = batch.tables.len(), "dumping batch");

        let command = self
            .pg_dump()
            .args(batch.tables.iter().map(|t| format!("--table={}", t.qualified_name())))
            .arg(format!("--file={}/{}/", output_dir.display(), batch.folder_name()))
            .args(extra_args.iter().cloned());

        self.runner.run(&command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runner::MockCommandRunner;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    struct FixedTables(Vec<TableRef>);

    impl UserTableSource for FixedTables {
        async fn list_user_tables(&self) -> Result<Vec<TableRef>> {
            Ok(self.0.clone())
        }
    }

    fn user_tables(count: usize) -> Vec<TableRef> {
        let patterns = TablePatterns::default();
        (1..=count)
            .filter_map(|i| patterns.table_ref("public", format!("database_table_{}", i)))
            .collect()
    }

    fn recording_runner() -> (MockCommandRunner, Arc<Mutex<Vec<ToolCommand>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |cmd| {
            recorded.lock().unwrap().push(cmd.clone());
            Ok(())
        });
        (runner, calls)
    }

    #[test]
    fn test_batch_counts() {
        for (count, expected) in [(0, 0), (1, 1), (60, 1), (61, 2), (119, 2), (120, 2), (121, 3)] {
            let tables = user_tables(count);
            let batches = partition_into_batches(&tables, 60).unwrap();
            assert_eq!(batches.len(), expected, "{} tables", count);
            assert!(batches.iter().all(|b| !b.tables.is_empty() && b.tables.len() <= 60));
        }
    }

    #[test]
    fn test_batches_cover_every_table_once_in_order() {
        let tables = user_tables(137);
        for batch_size in [1, 7, 60, 137, 500] {
            let batches = partition_into_batches(&tables, batch_size).unwrap();
            let rejoined: Vec<TableRef> = batches.iter().flat_map(|b| b.tables.iter().cloned()).collect();
            assert_eq!(rejoined, tables, "batch size {}", batch_size);
            let indexes: Vec<usize> = batches.iter().map(|b| b.index).collect();
            assert_eq!(indexes, (0..batches.len()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let tables = user_tables(3);
        assert!(matches!(
            partition_into_batches(&tables, 0),
            Err(BackupError::InvalidBatchSize)
        ));
    }

    #[test]
    fn test_dump_everything_except_user_tables_command() {
        let params = ConnectionParams::new("localhost", "app", "backup");
        let patterns = TablePatterns::default();
        let (runner, calls) = recording_runner();
        let driver = DumpDriver::new(&params, "pg_dump", &patterns, &runner);

        driver
            .dump_everything_except_user_tables(Path::new("/scratch"), &["--no-owner".to_string()])
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].to_string(),
            "pg_dump --host=localhost --dbname=app --port=5432 --username=backup -Fd --jobs=1 -w \
             --exclude-table=database_table_* --exclude-table=database_relation_* \
             --exclude-table=database_multipleselect_* \
             --file=/scratch/everything_but_user_tables/ --no-owner"
        );
    }

    #[tokio::test]
    async fn test_dump_user_tables_in_batches_commands() {
        let params = ConnectionParams::new("localhost", "app", "backup").with_jobs(2);
        let patterns = TablePatterns::default();
        let (runner, calls) = recording_runner();
        let driver = DumpDriver::new(&params, "pg_dump", &patterns, &runner);
        let source = FixedTables(user_tables(5));

        let stats = driver
            .dump_user_tables_in_batches(&source, 2, Path::new("/scratch"), &[])
            .await
            .unwrap();

        assert_eq!(stats, BatchDumpStats { tables: 5, batches: 3 });

        let calls = calls.lock().unwrap();
        let outputs: Vec<&str> = calls.iter().filter_map(|c| c.output_file()).collect();
        assert_eq!(
            outputs,
            vec![
                "/scratch/user_tables_batch_0/",
                "/scratch/user_tables_batch_1/",
                "/scratch/user_tables_batch_2/",
            ]
        );

        let included: Vec<Vec<&str>> = calls
            .iter()
            .map(|c| c.args.iter().filter_map(|a| a.strip_prefix("--table=")).collect())
            .collect();
        assert_eq!(
            included,
            vec![
                vec!["public.database_table_1", "public.database_table_2"],
                vec!["public.database_table_3", "public.database_table_4"],
                vec!["public.database_table_5"],
            ]
        );
        assert!(calls.iter().all(|c| c.args.contains(&"--jobs=2".to_string())));
    }

    #[tokio::test]
    async fn test_no_user_tables_runs_nothing() {
        let params = ConnectionParams::new("localhost", "app", "backup");
        let patterns = TablePatterns::default();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();
        let driver = DumpDriver::new(&params, "pg_dump", &patterns, &runner);

        let stats = driver
            .dump_user_tables_in_batches(&FixedTables(Vec::new()), 60, &PathBuf::from("/scratch"), &[])
            .await
            .unwrap();
        assert_eq!(stats, BatchDumpStats { tables: 0, batches: 0 });
    }

    #[tokio::test]
    async fn test_batch_failure_stops_later_batches() {
        let params = ConnectionParams::new("localhost", "app", "backup");
        let patterns = TablePatterns::default();
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |cmd| {
            *counter.lock().unwrap() += 1;
            if cmd.output_file() == Some("/scratch/user_tables_batch_1/") {
                return Err(BackupError::ToolFailed {
                    command: cmd.to_string(),
                    code: Some(1),
                });
            }
            Ok(())
        });
        let driver = DumpDriver::new(&params, "pg_dump", &patterns, &runner);

        let result = driver
            .dump_user_tables_in_batches(&FixedTables(user_tables(10)), 3, Path::new("/scratch"), &[])
            .await;

        assert!(matches!(result, Err(BackupError::ToolFailed { code: Some(1), .. })));
        assert_eq!(*calls.lock().unwrap(), 2);
    }
}
