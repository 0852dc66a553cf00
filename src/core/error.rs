//! Error types for backup and restore runs.

use std::path::PathBuf;

use thiserror::Error;

/// Result type used throughout the backup engine.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Backup engine error types.
#[derive(Error, Debug)]
pub enum BackupError {
    /// The extracted archive does not contain the self-named root folder.
    #[error(
        "expected to find a folder inside {} called {expected} but it wasn't there. \
         Is the file you provided a valid backup generated by `tenant-backup backup`?",
        .archive.display()
    )]
    InvalidArchive { expected: String, archive: PathBuf },

    /// The archive root has no dump of the non user tables.
    #[error("no shared dump found at {}, refusing to restore user table batches", .path.display())]
    MissingSharedDump { path: PathBuf },

    /// An external tool exited unsuccessfully.
    #[error("command `{command}` failed with {}", describe_exit(.code))]
    ToolFailed { command: String, code: Option<i32> },

    /// An external tool could not be launched.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Batch size must be positive.
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    /// Metadata query error.
    #[error("database metadata query failed: {0}")]
    Metadata(#[from] sqlx::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
