/// Database connection parameters shared by every pg_dump / pg_restore run

use std::fmt;

use crate::utils::{DEFAULT_JOBS, DEFAULT_PG_DUMP, DEFAULT_PG_RESTORE, DEFAULT_PORT};

/// Connection settings for one backup or restore run.
///
/// Built once per run and passed by reference to every driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub database: String,
    pub username: String,
    pub port: u16,
    /// Parallel jobs per pg_dump / pg_restore invocation
    pub jobs: u32,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, database: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            username: username.into(),
            port: DEFAULT_PORT,
            jobs: DEFAULT_JOBS,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_jobs(mut self, jobs: u32) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Arguments common to every pg_dump and pg_restore invocation
    pub fn tool_args(&self) -> Vec<String> {
        vec![
            format!("--host={}", self.host),
            format!("--dbname={}", self.database),
            format!("--port={}", self.port),
            format!("--username={}", self.username),
            // Directory format is required for --jobs to parallelise
            "-Fd".to_string(),
            format!("--jobs={}", self.jobs),
            // Many separate invocations run per backup, never prompt for a password
            "-w".to_string(),
        ]
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.username, self.host, self.port, self.database)
    }
}

/// Programs used for dumping and restoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgTools {
    pub pg_dump: String,
    pub pg_restore: String,
}

impl Default for PgTools {
    fn default() -> Self {
        Self {
            pg_dump: DEFAULT_PG_DUMP.to_string(),
            pg_restore: DEFAULT_PG_RESTORE.to_string(),
        }
    }
}
