/// CLI argument parsing and command handling

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use tenant_backup::core::ConnectionParams;
use tenant_backup::utils::AppConfig;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "tenant-backup")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/tenant-backup/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection flags shared by backup and restore
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Host name of the machine on which the database is running
    #[arg(short = 'H', long, env = "PGHOST")]
    pub host: Option<String>,

    /// Name of the database to connect to
    #[arg(short, long, env = "PGDATABASE")]
    pub database: Option<String>,

    /// User name to connect as
    #[arg(short = 'U', long, env = "PGUSER")]
    pub username: Option<String>,

    /// TCP port the server is listening on [default: 5432]
    #[arg(short, long, env = "PGPORT")]
    pub port: Option<u16>,

    /// Parallel jobs for each pg_dump / pg_restore run [default: 1]
    #[arg(short, long)]
    pub jobs: Option<u32>,
}

impl ConnectionArgs {
    /// Combine flags with config file defaults
    pub fn resolve(&self, config: &AppConfig) -> Result<ConnectionParams> {
        let host = self
            .host
            .clone()
            .or_else(|| config.connection.host.clone())
            .ok_or_else(|| missing("host", "--host", "PGHOST"))?;
        let database = self
            .database
            .clone()
            .or_else(|| config.connection.database.clone())
            .ok_or_else(|| missing("database", "--database", "PGDATABASE"))?;
        let username = self
            .username
            .clone()
            .or_else(|| config.connection.username.clone())
            .ok_or_else(|| missing("username", "--username", "PGUSER"))?;

        Ok(ConnectionParams::new(host, database, username)
            .with_port(self.port.unwrap_or_else(|| config.port()))
            .with_jobs(self.jobs.unwrap_or_else(|| config.jobs())))
    }
}

fn missing(field: &str, flag: &str, env: &str) -> anyhow::Error {
    anyhow!(
        "No database {} given. Use {}, set {} or add `{}` to the [connection] section of the config file",
        field,
        flag,
        env,
        field
    )
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up the whole database into a .tar.gz archive
    Backup {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Archive to write [default: ./backup_<database>_<timestamp>.tar.gz]
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// User tables dumped per pg_dump run [default: 60]
        #[arg(long)]
        batch_size: Option<usize>,

        /// Extra arguments passed to every pg_dump run
        #[arg(last = true)]
        pg_dump_args: Vec<String>,
    },

    /// Restore a database from an archive made by `backup`
    Restore {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Archive to restore from
        #[arg(short, long)]
        file: PathBuf,

        /// Extra arguments passed to every pg_restore run
        #[arg(last = true)]
        pg_restore_args: Vec<String>,
    },

    /// Check an archive and list its contents without restoring it
    Inspect {
        /// Archive to inspect
        #[arg(short, long)]
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup() {
        let cli = Cli::try_parse_from([
            "tenant-backup",
            "backup",
            "-H",
            "db.internal",
            "-d",
            "app",
            "-U",
            "backup",
            "-j",
            "4",
            "-f",
            "/backups/app.tar.gz",
            "--batch-size",
            "100",
            "--",
            "--no-owner",
            "--verbose",
        ])
        .unwrap();

        match cli.command {
            Commands::Backup {
                connection,
                file,
                batch_size,
                pg_dump_args,
            } => {
                assert_eq!(connection.host.as_deref(), Some("db.internal"));
                assert_eq!(connection.jobs, Some(4));
                assert_eq!(file, Some(PathBuf::from("/backups/app.tar.gz")));
                assert_eq!(batch_size, Some(100));
                assert_eq!(pg_dump_args, vec!["--no-owner", "--verbose"]);
            }
            _ => panic!("expected backup command"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn test_restore_requires_file() {
        assert!(Cli::try_parse_from(["tenant-backup", "restore", "-d", "app"]).is_err());
    }

    #[test]
    fn test_resolve_prefers_flags_over_config() {
        let mut config = AppConfig::default();
        config.connection.host = Some("config-host".to_string());
        config.connection.database = Some("config-db".to_string());
        config.connection.username = Some("config-user".to_string());
        config.connection.port = Some(6432);
        config.connection.jobs = Some(8);

        let args = ConnectionArgs {
            host: Some("flag-host".to_string()),
            jobs: Some(2),
            ..ConnectionArgs::default()
        };

        let params = args.resolve(&config).unwrap();
        assert_eq!(params.host, "flag-host");
        assert_eq!(params.database, "config-db");
        assert_eq!(params.username, "config-user");
        assert_eq!(params.port, 6432);
        assert_eq!(params.jobs, 2);
    }

    #[test]
    fn test_resolve_requires_database() {
        let args = ConnectionArgs {
            host: Some("localhost".to_string()),
            username: Some("postgres".to_string()),
            ..ConnectionArgs::default()
        };

        let err = args.resolve(&AppConfig::default()).unwrap_err();
        assert!(err.to_string().contains("PGDATABASE"));
    }
}
