pub mod error;
pub mod connection;
pub mod catalog;
pub mod runner;
pub mod dump;
pub mod restore;
pub mod archive;
pub mod backup;

pub use backup::{BackupManager, BackupRequest, BackupSummary, RestoreRequest, RestoreSummary};
pub use catalog::{PgCatalog, TablePatterns, TableRef, UserTableSource};
pub use connection::{ConnectionParams, PgTools};
pub use error::{BackupError, Result};
pub use runner::{CommandRunner, SystemRunner, ToolCommand};
