mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};

use cli::{Cli, Commands, ConfigCommands, ConnectionArgs};
use tenant_backup::core::archive::read_manifest;
use tenant_backup::core::{BackupManager, BackupRequest, RestoreRequest};
use tenant_backup::utils::{format_bytes, format_duration, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before parsing so PG* variables in it act as flag defaults
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match cli.command {
        Commands::Backup {
            connection,
            file,
            batch_size,
            pg_dump_args,
        } => {
            handle_backup(&config, connection, file, batch_size, pg_dump_args).await?;
        }
        Commands::Restore {
            connection,
            file,
            pg_restore_args,
        } => {
            handle_restore(&config, connection, file, pg_restore_args)?;
        }
        Commands::Inspect { file, json } => {
            handle_inspect(&file, json)?;
        }
        Commands::Config { command } => {
            handle_config(&config, cli.config.as_deref(), command)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "tenant_backup=debug" } else { "tenant_backup=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn manager(config: &AppConfig, connection: &ConnectionArgs) -> Result<BackupManager> {
    let params = connection.resolve(config)?;
    Ok(BackupManager::new(params, config.pg_tools(), config.tables.clone())
        .with_scratch_root(config.backup.scratch_dir.clone()))
}

async fn handle_backup(
    config: &AppConfig,
    connection: ConnectionArgs,
    file: Option<PathBuf>,
    batch_size: Option<usize>,
    pg_dump_args: Vec<String>,
) -> Result<()> {
    let manager = manager(config, &connection)?;
    println!("Backing up {}\n", manager.params());

    let request = BackupRequest {
        archive_path: file,
        batch_size: batch_size.unwrap_or_else(|| config.batch_size()),
        extra_args: pg_dump_args,
    };

    let summary = manager.backup(&request).await.context("Backup failed")?;

    println!();
    println!("{} Backup written to {}", "✓".green(), summary.archive.display());
    println!(
        "  User tables: {} in {} batch{}",
        summary.user_tables,
        summary.batches,
        if summary.batches == 1 { "" } else { "es" }
    );
    println!("  Size:        {}", format_bytes(summary.size_bytes));
    println!("  Took:        {}", format_duration(summary.elapsed.as_secs()));

    Ok(())
}

fn handle_restore(
    config: &AppConfig,
    connection: ConnectionArgs,
    file: PathBuf,
    pg_restore_args: Vec<String>,
) -> Result<()> {
    let manager = manager(config, &connection)?;
    println!("Restoring {} into {}\n", file.display(), manager.params());

    let request = RestoreRequest {
        archive_path: file,
        extra_args: pg_restore_args,
    };

    let summary = manager.restore(&request).context(
        "Restore failed. Invocations that completed before the failure are not rolled back",
    )?;

    println!();
    println!("{} Restored {}", "✓".green(), summary.archive.display());
    println!("  User table batches: {}", summary.batches_restored);
    println!("  Took:               {}", format_duration(summary.elapsed.as_secs()));

    Ok(())
}

fn handle_inspect(file: &Path, json: bool) -> Result<()> {
    let manifest = read_manifest(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!("Archive:     {}", file.display());
    println!("Size:        {}", format_bytes(manifest.size_bytes));
    println!("Entries:     {}", manifest.entries);
    if manifest.has_shared_dump {
        println!("Shared dump: {}", "present".green());
    } else {
        println!("Shared dump: {}", "missing".red());
    }
    println!("Batches:     {}", manifest.batches.len());
    for batch in &manifest.batches {
        println!("  {}", batch);
    }

    Ok(())
}

fn handle_config(config: &AppConfig, explicit_path: Option<&Path>, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Path => {
            let path = match explicit_path {
                Some(path) => path.to_path_buf(),
                None => AppConfig::config_path()?,
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}
